//! Error types for the sipduet library

use thiserror::Error;

/// Result type for sipduet operations
pub type DuetResult<T> = Result<T, DuetError>;

/// Errors that can occur while wiring up or running the demo
#[derive(Debug, Error)]
pub enum DuetError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Token store could not be read or written
    #[error("Token store error: {message}")]
    TokenStore { message: String },

    /// A persisted token record could not be parsed
    #[error("Malformed token record: {record}")]
    MalformedRecord { record: String },

    /// Not every user agent could register
    #[error("Registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// A call could not be set up
    #[error("Call setup to {target} failed: {reason}")]
    CallSetup { target: String, reason: String },

    /// Operation not allowed in the current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DuetError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a token store error
    pub fn token_store(message: impl Into<String>) -> Self {
        Self::TokenStore {
            message: message.into(),
        }
    }

    /// Create a registration failure
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            reason: reason.into(),
        }
    }

    /// Create a call setup error
    pub fn call_setup(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CallSetup {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error ends the demo for good
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RegistrationFailed { .. } | Self::Configuration { .. } | Self::Toml(_)
        )
    }
}
