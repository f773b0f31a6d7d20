//! Process-wide tracing subscriber.
//!
//! On Android, stderr goes nowhere, so events and panics are sent to logcat
//! under the `solus` tag. Everywhere else they are written to stderr.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter directive
pub const LOG_FILTER_ENV: &str = "SOLUS_LOG";

/// Logcat tag on Android
pub const LOG_TAG: &str = "solus";

const DEFAULT_FILTER: &str = "info";

/// Build the filter from `SOLUS_LOG`, falling back to `info`.
///
/// `verbose` forces `debug` regardless of the environment.
pub fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// Returns `false` when a global subscriber was already installed (the host
/// may load the library more than once, or tests may race).
#[cfg(not(target_os = "android"))]
pub fn init(verbose: bool) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Install the global subscriber.
///
/// Returns `false` when a global subscriber was already installed (the host
/// may load the library more than once).
#[cfg(target_os = "android")]
pub fn init(verbose: bool) -> bool {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let installed = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(paranoid_android::layer(LOG_TAG).with_target(false))
        .try_init()
        .is_ok();
    if installed {
        // Panic messages go through `log`, which the subscriber forwards
        log_panics::init();
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        let _ = init(false);
        // Second install is refused, not a panic
        assert!(!init(true));
    }

    #[test]
    fn test_verbose_filter() {
        assert_eq!(env_filter(true).to_string(), "debug");
    }
}
