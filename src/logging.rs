//! Tracing setup for binaries.

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `level` applies to this crate and
/// everything else logs warnings only. Returns `false` if a global subscriber
/// was already installed.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("warn,labserial={}", level)))
        .unwrap_or_else(|_| EnvFilter::new("warn,labserial=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
