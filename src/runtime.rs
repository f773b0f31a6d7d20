//! Process-wide bridge singleton.
//!
//! The host loads the library once and then calls `startRustServer` from any
//! thread, so the bridge lives in a `OnceLock` for the lifetime of the
//! process:
//!
//! ```ignore
//! // At library load (JNI_OnLoad):
//! runtime::init_from_env()?;
//!
//! // On every start request:
//! let ok = runtime::start_rust_server(&replicate_key, &gemini_key);
//! ```
//!
//! Tests and the standalone binary can `install` a bridge of their own
//! before the first start.

use std::sync::OnceLock;

use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::credentials::CredentialPair;
use crate::server::EmbeddedServer;
use crate::startup::{BootstrapError, Bridge};

/// Global bridge singleton.
static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Install a specific bridge as the process-wide one.
///
/// Only the first install wins; later calls keep the existing bridge and
/// report `AlreadyInstalled`.
pub fn install(bridge: Bridge) -> Result<&'static Bridge, BootstrapError> {
    if BRIDGE.set(bridge).is_err() {
        warn!("Attempting to install a bridge when one is already configured. Keeping existing.");
        return Err(BootstrapError::AlreadyInstalled);
    }
    BRIDGE.get().ok_or(BootstrapError::AlreadyInstalled)
}

/// Get the installed bridge, if any.
pub fn bridge() -> Option<&'static Bridge> {
    BRIDGE.get()
}

/// Install the default bridge (embedded server configured from the
/// environment) unless one is already present.
///
/// Configuration errors surface here, at load time, not from a start call.
pub fn init_from_env() -> Result<&'static Bridge, BootstrapError> {
    if let Some(existing) = BRIDGE.get() {
        return Ok(existing);
    }

    let config = ServerConfig::from_env()?;
    debug!(
        "Embedded server socket {}, startup timeout {:?}",
        config.socket, config.startup_timeout
    );
    let timeout = config.startup_timeout;
    Ok(BRIDGE.get_or_init(|| Bridge::new(EmbeddedServer::new(config), timeout)))
}

/// Start the embedded server with the two provider keys.
///
/// Returns `true` once the server is ready (or already running). Every
/// failure, including a bridge that cannot be configured, is logged and
/// reported as `false`.
pub fn start_rust_server(replicate_api_key: &str, gemini_api_key: &str) -> bool {
    let bridge = match init_from_env() {
        Ok(bridge) => bridge,
        Err(e) => {
            error!("❌ Embedded server bridge unavailable: {}", e);
            return false;
        }
    };

    bridge.start(CredentialPair::new(replicate_api_key, gemini_api_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::{readiness, Readiness, ServerState, ServerSubsystem};
    use std::time::Duration;

    struct AlwaysReady;

    impl ServerSubsystem for AlwaysReady {
        fn initialize(&self, _credentials: CredentialPair) -> anyhow::Result<Readiness> {
            let (tx, rx) = readiness::channel();
            tx.ready();
            Ok(rx)
        }
    }

    // The singleton is process-global, so the whole lifecycle lives in one test.
    #[test]
    fn test_global_bridge_lifecycle() {
        let installed = install(Bridge::new(AlwaysReady, Duration::from_secs(1))).unwrap();
        assert_eq!(installed.state(), ServerState::NotStarted);
        assert!(bridge().is_some());

        // Second install keeps the first bridge
        let again = install(Bridge::new(AlwaysReady, Duration::from_secs(1)));
        assert!(matches!(again, Err(BootstrapError::AlreadyInstalled)));

        // init_from_env reuses the installed bridge instead of reading config
        assert!(std::ptr::eq(init_from_env().unwrap(), installed));

        assert!(!start_rust_server("", "AIza_key"));
        assert_eq!(installed.state(), ServerState::Failed);

        assert!(start_rust_server("r8_key", "AIza_key"));
        assert_eq!(installed.state(), ServerState::Running);
        assert!(start_rust_server("r8_key", "AIza_key"));
    }
}
