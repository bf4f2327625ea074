//! Error types for the DDNS daemon
//!
//! The variants follow the operational taxonomy of the reconciliation loop:
//! transient failures (`Network`, `Provider`) are retried on the next cycle,
//! misconfiguration (`NotFound`, `Ambiguous`, `Config`) is fatal at startup,
//! everything else is unexpected.

use thiserror::Error;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS daemon
#[derive(Error, Debug)]
pub enum Error {
    /// Resolver or provider unreachable, timed out, or answered garbage
    #[error("Network error: {0}")]
    Network(String),

    /// The provider API explicitly rejected the request
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Operator-facing message, possibly multi-line
        message: String,
    },

    /// The record target maps to no provider resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record target maps to more than one provider resource
    #[error("Ambiguous result: {0}")]
    Ambiguous(String),

    /// Missing or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Preferences document could not be read or written
    #[error("State store error: {0}")]
    StateStore(String),

    /// Credential sealing/unsealing failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an "ambiguous result" error
    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::Ambiguous(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a crypto error
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    /// Whether the next reconciliation cycle may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Provider { .. })
    }

    /// Whether the error means the configured target can never work as-is
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Ambiguous(_) | Self::Config(_))
    }
}
