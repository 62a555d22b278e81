//! Shared configuration and secret types for the Mercado Libre SDK
//!
//! `SdkConfig` holds the process-wide constants (SDK version, API root,
//! authorization and token URLs). It is loaded once by the hosting
//! application before any client is constructed and never mutated after.

mod config;
mod error;
mod secret;

pub use config::SdkConfig;
pub use error::{Error, Result};
pub use secret::Secret;
