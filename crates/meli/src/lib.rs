//! Mercado Libre REST API client
//!
//! OAuth2 authorization-code and refresh-token exchange, plus thin verb
//! wrappers that prefix the configured API root and send JSON.
//!
//! Flow:
//! 1. Build an [`SdkConfig`] once (defaults, or `SdkConfig::load`)
//! 2. `MeliClient::new(config, Credentials::new(app_id, secret))`
//! 3. Redirect the user to `client.auth_url(redirect_uri)`
//! 4. `client.authorize(code, redirect_uri)` stores the token pair
//! 5. Call resources with `client.get/post/put/delete/options`
//! 6. `client.refresh()` when the access token expires
//!
//! Tokens only live in memory. Read them back with
//! `MeliClient::access_token`/`refresh_token` after each exchange to persist
//! them elsewhere.

pub mod client;
pub mod constants;
pub mod error;
pub mod pkce;
pub mod query;
pub mod token;

#[cfg(test)]
mod test_support;

pub use client::{ApiResponse, Credentials, MeliClient};
pub use common::{SdkConfig, Secret};
pub use error::{Error, Result};
pub use pkce::{compute_challenge, generate_verifier};
pub use query::to_url_params;
pub use token::{GrantType, TokenResult};
