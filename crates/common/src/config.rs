//! SDK configuration types and loading
//!
//! The TOML file carries a single `[config]` table. Every key is optional and
//! falls back to the production Mercado Libre endpoints. Credentials are never
//! read from this file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

const DEFAULT_API_ROOT_URL: &str = "https://api.mercadolibre.com";
const DEFAULT_AUTH_URL: &str = "https://auth.mercadolivre.com.br/authorization";
const DEFAULT_OAUTH_URL: &str = "/oauth/token";
const DEFAULT_CONFIG_FILE: &str = "meli.toml";

/// Process-wide SDK constants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SdkConfig {
    /// Sent verbatim as the `User-Agent` header
    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,
    /// Root of every resource request
    #[serde(default = "default_api_root_url")]
    pub api_root_url: String,
    /// Human-facing authorization page the end user is redirected to
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Token endpoint. A path (`/oauth/token`) is resolved against
    /// `api_root_url`; an absolute URL must share its scheme, host and port.
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: Option<SdkConfig>,
}

fn default_sdk_version() -> String {
    format!("MELI-RUST-SDK-{}", env!("CARGO_PKG_VERSION"))
}

fn default_api_root_url() -> String {
    DEFAULT_API_ROOT_URL.to_owned()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_owned()
}

fn default_oauth_url() -> String {
    DEFAULT_OAUTH_URL.to_owned()
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            sdk_version: default_sdk_version(),
            api_root_url: default_api_root_url(),
            auth_url: default_auth_url(),
            oauth_url: default_oauth_url(),
        }
    }
}

impl SdkConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// A file without a `[config]` table yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), api_root_url = %config.api_root_url, "loaded sdk config");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents)?;
        let config = file.config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Check that every URL is https and the version string is usable as a
    /// header value. An absolute `oauth_url` must share the API root's origin.
    pub fn validate(&self) -> Result<()> {
        if self.sdk_version.trim().is_empty() {
            return Err(Error::Config("sdk_version must not be empty".into()));
        }
        if self.sdk_version.chars().any(|c| c.is_control()) {
            return Err(Error::Config(
                "sdk_version must not contain control characters".into(),
            ));
        }

        require_https("api_root_url", &self.api_root_url)?;
        require_https("auth_url", &self.auth_url)?;

        if !self.oauth_url.starts_with('/') {
            require_https("oauth_url", &self.oauth_url)?;
            let root = Url::parse(&self.api_root_url).map_err(|source| Error::InvalidUrl {
                url: self.api_root_url.clone(),
                source,
            })?;
            let token = Url::parse(&self.oauth_url).map_err(|source| Error::InvalidUrl {
                url: self.oauth_url.clone(),
                source,
            })?;
            if token.origin() != root.origin() {
                return Err(Error::Config(format!(
                    "oauth_url must be on the api_root_url host, got: {}",
                    self.oauth_url
                )));
            }
        }
        Ok(())
    }

    /// API root without a trailing slash, ready for `"{root}{path}"` joins.
    pub fn api_root(&self) -> &str {
        self.api_root_url.trim_end_matches('/')
    }

    /// Absolute token endpoint URL.
    pub fn token_endpoint(&self) -> String {
        if self.oauth_url.starts_with('/') {
            format!("{}{}", self.api_root(), self.oauth_url)
        } else {
            self.oauth_url.clone()
        }
    }

    /// Resolve config file path from CLI arg or MELI_CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("MELI_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }
}

fn require_https(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|source| Error::InvalidUrl {
        url: value.to_owned(),
        source,
    })?;
    if url.scheme() != "https" {
        return Err(Error::Config(format!(
            "{field} must use https, got: {value}"
        )));
    }
    if url.host_str().is_none() {
        return Err(Error::Config(format!("{field} has no host: {value}")));
    }
    Ok(())
}
