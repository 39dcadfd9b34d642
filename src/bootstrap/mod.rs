//! Process bootstrap: tracing, configuration, dependency wiring and the
//! line-oriented local runtime.

pub mod config;
pub mod run;
pub mod tracing;
pub mod wiring;

pub use config::{load_config, resolve_config};
pub use run::{parse_command, run, Command};
pub use wiring::{wire, wire_with_clock, Wired};
