//! Tracing subscriber setup for hosts embedding the dispatcher.
//!
//! The crate itself only emits `tracing` events; installing a subscriber is
//! the host's call. This module is available with the optional
//! `tracing-subscriber` dependency enabled.

use std::sync::Once;

use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output, `dapp_core=debug`.
    Development,
    /// JSON output, `dapp_core=info`.
    Production,
    /// No output; a bare registry so spans still work.
    Test,
}

static INIT_ONCE: Once = Once::new();

/// Installs the global subscriber for `profile`. `RUST_LOG` overrides the
/// default filter. Only the first call has any effect.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        // try_init: a host may already have installed its own subscriber.
        let installed = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(filter_or("dapp_core=debug"))
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter_or("dapp_core=info"))
                .finish()
                .try_init(),
            Profile::Test => tracing_subscriber::registry().try_init(),
        };
        if installed.is_err() {
            tracing::debug!("Global tracing subscriber already set, keeping it");
        }
    });
}

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(Profile::Test);
        init(Profile::Test);
        init(Profile::Development);
    }
}
