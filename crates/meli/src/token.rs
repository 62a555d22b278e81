//! OAuth authorization URL and token exchange
//!
//! Both grants POST a form to the token endpoint with the app credentials
//! merged in. On success the client's token pair is updated in place; the
//! refresh token is only replaced when the response carries a new one.

use std::fmt;

use common::Secret;
use reqwest::header::{ACCEPT, CONTENT_TYPE, DATE, USER_AGENT};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::client::MeliClient;
use crate::constants::{
    CODE_CHALLENGE_METHOD, FORM_CONTENT_TYPE, JSON_CONTENT_TYPE, OFFLINE_ACCESS_NOT_ALLOWED,
    RESPONSE_TYPE_CODE,
};
use crate::error::{Error, Result};
use crate::query::to_url_params;

/// OAuth2 grant used for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// Body of a 2xx token endpoint response.
///
/// Only `access_token` is required. `refresh_token` is `Some` whenever the
/// key is present, so an explicit `null` clears the stored token. The
/// remaining fields are informational and fall back to `None` when their
/// type is unexpected.
#[derive(Debug)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<Option<String>>,
    expires_in: Option<u64>,
    id: Option<Value>,
    user_id: Option<u64>,
    scope: Option<String>,
    token_type: Option<String>,
}

impl TokenResponse {
    fn from_map(mut map: Map<String, Value>) -> Result<Self> {
        let access_token = match map.remove("access_token") {
            Some(Value::String(token)) => token,
            Some(other) => {
                return Err(Error::TokenResponse(format!(
                    "access_token is not a string: {other}"
                )));
            }
            None => return Err(Error::TokenResponse("response has no access_token".into())),
        };
        let refresh_token = map
            .remove("refresh_token")
            .map(|v| v.as_str().map(String::from));

        Ok(Self {
            access_token,
            refresh_token,
            expires_in: map.get("expires_in").and_then(lenient_u64),
            id: map.remove("id").filter(|v| !v.is_null()),
            user_id: map.get("user_id").and_then(lenient_u64),
            scope: map.get("scope").and_then(Value::as_str).map(String::from),
            token_type: map
                .get("token_type")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }
}

/// Number, or a string holding one.
fn lenient_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Outcome of a successful exchange.
///
/// `refresh_token` is the token stored on the client after the exchange,
/// which is the previous one when the response did not include a new one.
#[derive(Clone, PartialEq)]
pub struct TokenResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    pub expires_in: Option<u64>,
    /// `Date` header of the token response
    pub date: Option<String>,
    pub id: Option<Value>,
    pub user_id: Option<u64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("date", &self.date)
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl MeliClient {
    /// URL of the human authorization page for this app.
    ///
    /// Pure: no network call, `redirect_uri` is not validated.
    pub fn auth_url(&self, redirect_uri: &str) -> String {
        let params = [
            ("client_id", self.app_id.as_deref().unwrap_or_default()),
            ("response_type", RESPONSE_TYPE_CODE),
            ("redirect_uri", redirect_uri),
        ];
        format!("{}?{}", self.config.auth_url, to_url_params(&params))
    }

    /// Authorization URL carrying a PKCE S256 challenge.
    ///
    /// Pair with [`MeliClient::authorize_with_verifier`] using the verifier
    /// the challenge was computed from.
    pub fn auth_url_with_challenge(&self, redirect_uri: &str, challenge: &str) -> String {
        let params = [
            ("client_id", self.app_id.as_deref().unwrap_or_default()),
            ("response_type", RESPONSE_TYPE_CODE),
            ("redirect_uri", redirect_uri),
            ("code_challenge", challenge),
            ("code_challenge_method", CODE_CHALLENGE_METHOD),
        ];
        format!("{}?{}", self.config.auth_url, to_url_params(&params))
    }

    /// Exchange an authorization code for a token pair.
    pub async fn authorize(&self, code: &str, redirect_uri: &str) -> Result<TokenResult> {
        self.exchange(
            GrantType::AuthorizationCode,
            &[("code", code), ("redirect_uri", redirect_uri)],
        )
        .await
    }

    /// Exchange an authorization code obtained through a PKCE authorization URL.
    pub async fn authorize_with_verifier(
        &self,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<TokenResult> {
        self.exchange(
            GrantType::AuthorizationCode,
            &[
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", verifier),
            ],
        )
        .await
    }

    /// Trade the stored refresh token for a new access token.
    ///
    /// Fails with [`Error::InvalidState`] without touching the network when
    /// no refresh token is stored or it is empty.
    pub async fn refresh(&self) -> Result<TokenResult> {
        let refresh = {
            let tokens = self.tokens.read().await;
            tokens
                .refresh
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|t| t.expose().clone())
        };
        let Some(refresh) = refresh else {
            return Err(Error::InvalidState(OFFLINE_ACCESS_NOT_ALLOWED.into()));
        };

        self.exchange(GrantType::RefreshToken, &[("refresh_token", refresh.as_str())])
            .await
    }

    async fn exchange(&self, grant_type: GrantType, extra: &[(&str, &str)]) -> Result<TokenResult> {
        let mut form: Vec<(&str, &str)> = extra.to_vec();
        form.push(("grant_type", grant_type.as_str()));
        if let Some(app_id) = self.app_id.as_deref() {
            form.push(("client_id", app_id));
        }
        if let Some(secret) = self.secret.as_ref() {
            form.push(("client_secret", secret.expose().as_str()));
        }

        debug!(grant_type = grant_type.as_str(), "requesting token");

        let response = self
            .http
            .post(&self.token_endpoint)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .header(USER_AGENT, self.user_agent.clone())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                record_exchange(grant_type, "transport_error");
                Error::Transport(format!("token request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            record_exchange(grant_type, "rejected");
            warn!(
                grant_type = grant_type.as_str(),
                status = status.as_u16(),
                "token endpoint rejected exchange"
            );
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        let date = response
            .headers()
            .get(DATE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let parsed = response
            .json::<Map<String, Value>>()
            .await
            .map_err(|e| Error::TokenResponse(e.to_string()))
            .and_then(TokenResponse::from_map)
            .inspect_err(|_| record_exchange(grant_type, "invalid_response"))?;

        let refresh_token = {
            let mut tokens = self.tokens.write().await;
            tokens.access = Some(Secret::new(parsed.access_token.clone()));
            if let Some(refresh) = parsed.refresh_token {
                tokens.refresh = refresh.map(Secret::new);
            }
            tokens.refresh.as_ref().map(|t| t.expose().clone())
        };

        record_exchange(grant_type, "success");
        info!(
            grant_type = grant_type.as_str(),
            user_id = parsed.user_id,
            expires_in = parsed.expires_in,
            "token exchange succeeded"
        );

        Ok(TokenResult {
            access_token: parsed.access_token,
            refresh_token,
            expires_in: parsed.expires_in,
            date,
            id: parsed.id,
            user_id: parsed.user_id,
            scope: parsed.scope,
            token_type: parsed.token_type,
        })
    }
}

fn record_exchange(grant_type: GrantType, outcome: &'static str) {
    metrics::counter!(
        "meli_token_exchanges_total",
        "grant_type" => grant_type.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
