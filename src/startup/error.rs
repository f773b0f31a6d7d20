use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::Provider;

/// Why a start attempt did not reach RUNNING.
///
/// Only ever surfaced to the host as `false`; the detail is kept for logs
/// and `Bridge::last_error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartError {
    /// A credential was empty; the embedded server was never contacted
    #[error("missing {0} API key")]
    InvalidCredentials(Provider),
    /// The embedded server reported an error while coming up
    #[error("embedded server failed to initialize: {0}")]
    SubsystemInit(String),
    /// No readiness signal within the startup bound
    #[error("embedded server was not ready within {0:?}")]
    Timeout(Duration),
}

/// Classification of a `StartError`, for log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidCredentials,
    SubsystemInit,
    Timeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidCredentials => "invalid_credentials",
            FailureKind::SubsystemInit => "subsystem_init",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl StartError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StartError::InvalidCredentials(_) => FailureKind::InvalidCredentials,
            StartError::SubsystemInit(_) => FailureKind::SubsystemInit,
            StartError::Timeout(_) => FailureKind::Timeout,
        }
    }
}

/// Failure to bring the library itself up (before any start call).
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("a bridge is already installed for this process")]
    AlreadyInstalled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_error_display() {
        let err = StartError::InvalidCredentials(Provider::Gemini);
        assert_eq!(err.to_string(), "missing gemini API key");
        assert_eq!(err.kind(), FailureKind::InvalidCredentials);

        let err = StartError::SubsystemInit("Address in use".to_string());
        assert!(err.to_string().contains("Address in use"));
        assert_eq!(err.kind().as_str(), "subsystem_init");

        let err = StartError::Timeout(Duration::from_secs(10));
        assert!(err.to_string().contains("10s"));
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_bootstrap_error_from_config() {
        let err: BootstrapError = ConfigError::ZeroTimeout { var: "X" }.into();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
