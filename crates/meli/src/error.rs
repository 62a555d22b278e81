//! Error types for Mercado Libre client operations

/// Errors from token exchange and request dispatch.
///
/// Only the token endpoint turns a non-2xx status into an error. Resource
/// responses come back as [`crate::ApiResponse`] whatever their status.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection-level failure: DNS, TLS handshake, reset, timeout.
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// Token endpoint answered with a non-2xx status.
    #[error("token endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Operation not possible with the tokens currently stored.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid token response: {0}")]
    TokenResponse(String),

    #[error("invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] common::Error),
}

impl Error {
    /// HTTP status carried by a token endpoint rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
