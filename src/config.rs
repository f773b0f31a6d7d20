//! Server configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Filesystem socket path; takes priority over the abstract name.
pub const SOCKET_PATH_ENV: &str = "SOLUS_SOCKET_PATH";
/// Abstract-namespace socket name.
pub const SOCKET_NAME_ENV: &str = "SOLUS_SOCKET_NAME";
pub const STARTUP_TIMEOUT_ENV: &str = "SOLUS_STARTUP_TIMEOUT_SECS";
pub const REQUEST_TIMEOUT_ENV: &str = "SOLUS_REQUEST_TIMEOUT_SECS";
pub const GEMINI_MODEL_ENV: &str = "SOLUS_GEMINI_MODEL";

/// Socket name the Android client connects to
pub const DEFAULT_SOCKET_NAME: &str = "com.rmanky.solus.socket";

/// Upper bound on waiting for the embedded server to become ready
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Timeout for upstream provider requests (image generation can be slow)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid number of seconds")]
    InvalidSeconds { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    ZeroTimeout { var: &'static str },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Where the embedded server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    /// Linux abstract namespace (no file on disk)
    Abstract(String),
    /// Socket file
    Path(PathBuf),
}

impl std::fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketAddress::Abstract(name) => write!(f, "@{}", name),
            SocketAddress::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub socket: SocketAddress,
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub gemini_model: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket: SocketAddress::Abstract(DEFAULT_SOCKET_NAME.to_string()),
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup(SOCKET_PATH_ENV) {
            let path = non_empty(SOCKET_PATH_ENV, path)?;
            config.socket = SocketAddress::Path(PathBuf::from(path));
        } else if let Some(name) = lookup(SOCKET_NAME_ENV) {
            config.socket = SocketAddress::Abstract(non_empty(SOCKET_NAME_ENV, name)?);
        }

        if let Some(value) = lookup(STARTUP_TIMEOUT_ENV) {
            config.startup_timeout = parse_seconds(STARTUP_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(REQUEST_TIMEOUT_ENV) {
            config.request_timeout = parse_seconds(REQUEST_TIMEOUT_ENV, &value)?;
        }

        if let Some(model) = lookup(GEMINI_MODEL_ENV) {
            config.gemini_model = non_empty(GEMINI_MODEL_ENV, model)?.trim().to_string();
        }

        Ok(config)
    }

    pub fn with_socket(mut self, socket: SocketAddress) -> Self {
        self.socket = socket;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

fn non_empty(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Empty { var });
    }
    Ok(value)
}

fn parse_seconds(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidSeconds {
            var,
            value: value.to_string(),
        })?;
    if secs == 0 {
        return Err(ConfigError::ZeroTimeout { var });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(
            config.socket,
            SocketAddress::Abstract(DEFAULT_SOCKET_NAME.to_string())
        );
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_socket_path_takes_priority() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            (SOCKET_PATH_ENV, "/tmp/solus.sock"),
            (SOCKET_NAME_ENV, "other"),
        ]))
        .unwrap();
        assert_eq!(
            config.socket,
            SocketAddress::Path(PathBuf::from("/tmp/solus.sock"))
        );
    }

    #[test]
    fn test_abstract_name_override() {
        let config =
            ServerConfig::from_lookup(lookup_from(&[(SOCKET_NAME_ENV, "dev.solus")])).unwrap();
        assert_eq!(config.socket, SocketAddress::Abstract("dev.solus".into()));
        assert_eq!(config.socket.to_string(), "@dev.solus");
    }

    #[test]
    fn test_timeouts() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            (STARTUP_TIMEOUT_ENV, " 3 "),
            (REQUEST_TIMEOUT_ENV, "45"),
        ]))
        .unwrap();
        assert_eq!(config.startup_timeout, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_invalid_values() {
        let err = ServerConfig::from_lookup(lookup_from(&[(STARTUP_TIMEOUT_ENV, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSeconds { .. }));

        // An unbounded wait is never allowed
        let err =
            ServerConfig::from_lookup(lookup_from(&[(STARTUP_TIMEOUT_ENV, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroTimeout {
                var: STARTUP_TIMEOUT_ENV
            }
        );

        let err = ServerConfig::from_lookup(lookup_from(&[(SOCKET_NAME_ENV, "")])).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));

        let err =
            ServerConfig::from_lookup(lookup_from(&[(GEMINI_MODEL_ENV, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { .. }));
    }

    #[test]
    fn test_empty_socket_settings_rejected_alike() {
        for var in [SOCKET_PATH_ENV, SOCKET_NAME_ENV] {
            let err = ServerConfig::from_lookup(lookup_from(&[(var, "")])).unwrap_err();
            assert_eq!(err, ConfigError::Empty { var });
        }

        // An empty path is an error even when a name is also set
        let err = ServerConfig::from_lookup(lookup_from(&[
            (SOCKET_PATH_ENV, " "),
            (SOCKET_NAME_ENV, "dev.solus"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Empty {
                var: SOCKET_PATH_ENV
            }
        );
    }
}
