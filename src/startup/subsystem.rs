use std::sync::Arc;

use anyhow::Result;

use super::readiness::Readiness;
use crate::credentials::CredentialPair;

/// Capability the bridge needs from the embedded server.
///
/// `initialize` takes ownership of the credentials and must return quickly:
/// the actual bring-up happens elsewhere (a thread, a runtime) and is reported
/// through the returned `Readiness`. An `Err` means the attempt failed before
/// anything was started.
pub trait ServerSubsystem: Send + Sync {
    fn initialize(&self, credentials: CredentialPair) -> Result<Readiness>;
}

impl<T: ServerSubsystem + ?Sized> ServerSubsystem for Arc<T> {
    fn initialize(&self, credentials: CredentialPair) -> Result<Readiness> {
        (**self).initialize(credentials)
    }
}
