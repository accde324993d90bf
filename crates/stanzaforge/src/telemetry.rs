//! Tracing setup for binaries and tests built on Stanzaforge.
//!
//! Library crates only emit events; installing a subscriber is the
//! embedding application's call.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with("info")
}

/// Like [`init_tracing`] with a caller-chosen default directive, used when
/// `RUST_LOG` is unset or invalid.
pub fn init_tracing_with(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_second_call_reports_existing_subscriber() {
        init_tracing_with("debug");
        assert!(!init_tracing());
    }
}
