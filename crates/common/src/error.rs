//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating [`crate::SdkConfig`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
