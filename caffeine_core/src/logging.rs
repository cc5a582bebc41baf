//! Tracing setup for the caftrak binary.
//!
//! Log lines go to stderr; stdout carries command output only.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Targets that get the default level; everything else stays at `warn`
const OWN_TARGETS: [&str; 2] = ["caffeine_core", "caftrak"];

/// Install the subscriber at INFO unless RUST_LOG says otherwise
pub fn init() {
    init_with_level("info")
}

/// Install the subscriber with `default_level` for this workspace's crates.
///
/// RUST_LOG, when set, replaces the whole filter. Calling this twice keeps the
/// first subscriber.
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(default_level)));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn default_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|target| format!("{}={}", target, level)));
    directives.join(",")
}

/// Route logs through the test harness's captured output
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new(default_directives("debug")))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_own_crates() {
        assert_eq!(
            default_directives("debug"),
            "warn,caffeine_core=debug,caftrak=debug"
        );
        assert!(EnvFilter::try_new(default_directives("info")).is_ok());
    }
}
