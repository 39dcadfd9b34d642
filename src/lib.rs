//! ClipSync
//!
//! Process-level assembly of the sync engine: configuration, tracing,
//! dependency wiring and the local line-oriented runtime.

pub mod bootstrap;
