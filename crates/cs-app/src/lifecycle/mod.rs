//! Lifecycle supervision: resumable initialization, the login subflow, the
//! push consumer and the periodic wake.
//!
//! ```text
//! Uninitialized ──→ Initializing ──→ Ready
//!                        │
//!                        └─ session? ──→ LoggingIn ──→ LoggedIn
//!                                        (device → subscribe → reconcile → flush)
//! ```

mod push;
mod supervisor;

pub use supervisor::{FlushReport, InitOutcome, InitResult, LifecycleSupervisor};
