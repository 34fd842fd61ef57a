//! Error types shared by the rolescope modules.

use thiserror::Error;

/// A specialized Result type for rolescope operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for rolescope.
///
/// `Api` preserves the status and error code the service answered with, so
/// callers can tell a permission refusal apart from an empty result set.
#[derive(Debug, Error)]
pub enum Error {
    /// Token acquisition failed for a resource.
    #[error("could not acquire token for {resource}: {reason}")]
    Token { resource: String, reason: String },

    /// A request failed before producing a usable response.
    #[error("{operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// A service answered with a non-success status.
    #[error("{operation}: {code} (HTTP {status}): {message}")]
    Api {
        operation: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    /// The subscription is not among those visible to the credential.
    #[error("subscription {subscription_id} not found")]
    SubscriptionNotFound { subscription_id: String },
}

impl Error {
    /// Create a token acquisition error.
    pub(crate) fn token(resource: &str, reason: impl Into<String>) -> Self {
        Self::Token {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a transport error for a failed request.
    pub(crate) fn transport(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Create an error from a non-success service response.
    pub(crate) fn api(operation: &'static str, status: u16, code: String, message: String) -> Self {
        Self::Api {
            operation,
            status,
            code,
            message,
        }
    }
}
