//! Logging utilities
//!
//! The crate only talks to the `log` facade. Binaries pick the sink; this
//! helper wires up `env_logger` with an info default so session diagnostics
//! reach the console without extra setup.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system.
///
/// Per-module directives from `RUST_LOG` are honoured; the global level is
/// pinned to `Info`.
pub fn init() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
