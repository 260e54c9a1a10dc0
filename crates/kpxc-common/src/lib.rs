//! Shared infrastructure for kpxc: wire protocol types, logging setup,
//! default path discovery.

#![forbid(unsafe_code)]

pub mod helpers;
pub mod protocol;

pub use helpers::{default_socket_path, default_store_path};

/// How chatty a session should be.
///
/// Passed explicitly into the session configuration rather than read from
/// process-global state, so tests can run sessions with independent settings.
/// `Debug` additionally enables raw wire-message dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Debug,
}

impl Verbosity {
    /// Default tracing filter directive for this verbosity.
    pub fn filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Initialize tracing with the given default level.
///
/// `RUST_LOG` overrides the default when set. Logs go to stderr so stdout
/// stays clean for JSON output.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
