//! Upstream provider credentials.
//!
//! The two API keys handed over by the host application. Values are opaque:
//! the only structural check is that neither one is empty, the providers
//! themselves decide whether a key is actually valid.

use std::fmt;

/// Upstream generative-AI provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Replicate,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Replicate => "replicate",
            Provider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret string whose `Debug` output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value. Only call this where the secret leaves the process
    /// (HTTP headers).
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// The Replicate and Gemini keys for one start attempt.
#[derive(Clone)]
pub struct CredentialPair {
    replicate: Secret,
    gemini: Secret,
}

impl CredentialPair {
    pub fn new(replicate: impl Into<String>, gemini: impl Into<String>) -> Self {
        Self {
            replicate: Secret::new(replicate),
            gemini: Secret::new(gemini),
        }
    }

    /// Get the secret for a provider.
    pub fn secret(&self, provider: Provider) -> &Secret {
        match provider {
            Provider::Replicate => &self.replicate,
            Provider::Gemini => &self.gemini,
        }
    }

    /// First provider whose secret is empty, if any.
    ///
    /// Replicate is checked before Gemini, matching argument order.
    pub fn first_missing(&self) -> Option<Provider> {
        [Provider::Replicate, Provider::Gemini]
            .into_iter()
            .find(|p| self.secret(*p).is_empty())
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("replicate", &self.replicate)
            .field("gemini", &self.gemini)
            .finish()
    }
}
