//! Mercado Libre API client
//!
//! `MeliClient` owns the app credentials, the current token pair and one
//! reqwest client reused for every call. Resource requests go through the
//! verb methods, which build `<api_root><path>?<query>`, attach the standard
//! JSON headers and hand back the raw response.
//!
//! The verb methods never attach the access token. Callers put it where the
//! endpoint expects it, usually the `access_token` query parameter.

use std::fmt;

use bytes::Bytes;
use common::{SdkConfig, Secret};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;
use url::Origin;

use crate::constants::JSON_CONTENT_TYPE;
use crate::error::{Error, Result};
use crate::query::make_path;

/// App credentials and an optional token pair captured from a previous
/// session.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub app_id: Option<String>,
    pub secret: Option<Secret<String>>,
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
}

impl Credentials {
    /// Credentials for a fresh session with no tokens yet.
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            secret: Some(Secret::new(secret.into())),
            ..Self::default()
        }
    }
}

/// Token pair mutated by exchanges. Guarded by the client's `RwLock`.
#[derive(Default)]
pub(crate) struct Tokens {
    pub(crate) access: Option<Secret<String>>,
    pub(crate) refresh: Option<Secret<String>>,
}

/// Response of a resource request: status, headers and the full body.
///
/// Never interpreted by the client; a 404 is returned like a 200.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("reading response body failed: {e}")))?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Client for the Mercado Libre REST API.
///
/// Token reads and writes are short critical sections on an `RwLock`; the
/// lock is never held across a network call, so concurrent exchanges are
/// last-writer-wins.
pub struct MeliClient {
    pub(crate) config: SdkConfig,
    pub(crate) app_id: Option<String>,
    pub(crate) secret: Option<Secret<String>>,
    pub(crate) tokens: RwLock<Tokens>,
    pub(crate) http: reqwest::Client,
    pub(crate) api_root: String,
    pub(crate) api_origin: Origin,
    pub(crate) token_endpoint: String,
    pub(crate) user_agent: HeaderValue,
}

impl MeliClient {
    /// Create a client with its own TLS-only transport.
    ///
    /// The config is validated first; plain-http URLs are rejected. Peer
    /// certificate verification stays enabled for every request.
    pub fn new(config: SdkConfig, credentials: Credentials) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .https_only(true)
            .build()
            .map_err(|e| Error::Transport(format!("building HTTP client failed: {e}")))?;
        Self::with_http_client(config, credentials, http)
    }

    /// Create a client on top of a caller-built reqwest client.
    ///
    /// The caller owns the TLS policy of `http`. The config is not
    /// validated beyond parsing the API root and the token endpoint.
    pub fn with_http_client(
        config: SdkConfig,
        credentials: Credentials,
        http: reqwest::Client,
    ) -> Result<Self> {
        let api_root = config.api_root().to_owned();
        let api_origin = parse_url(&api_root)?.origin();
        let token_endpoint = config.token_endpoint();
        if parse_url(&token_endpoint)?.origin() != api_origin {
            return Err(Error::InvalidUrl {
                url: token_endpoint,
                reason: format!("token endpoint must be served from {api_root}"),
            });
        }

        let user_agent = HeaderValue::from_str(&config.sdk_version).map_err(|e| {
            common::Error::Config(format!(
                "sdk_version is not a valid header value: {e}"
            ))
        })?;

        debug!(api_root = %api_root, "meli client created");

        Ok(Self {
            config,
            app_id: credentials.app_id,
            secret: credentials.secret,
            tokens: RwLock::new(Tokens {
                access: credentials.access_token,
                refresh: credentials.refresh_token,
            }),
            http,
            api_root,
            api_origin,
            token_endpoint,
            user_agent,
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.expose().as_str())
    }

    /// Current access token, if an exchange has succeeded or one was supplied.
    pub async fn access_token(&self) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens.access.as_ref().map(|t| t.expose().clone())
    }

    pub async fn set_access_token(&self, token: Option<String>) {
        let mut tokens = self.tokens.write().await;
        tokens.access = token.map(Secret::new);
    }

    pub async fn refresh_token(&self) -> Option<String> {
        let tokens = self.tokens.read().await;
        tokens.refresh.as_ref().map(|t| t.expose().clone())
    }

    pub async fn set_refresh_token(&self, token: Option<String>) {
        let mut tokens = self.tokens.write().await;
        tokens.refresh = token.map(Secret::new);
    }

    /// Attach the standard JSON headers to `request` and dispatch it.
    ///
    /// Existing values for `Accept`, `User-Agent` and `Content-Type` are
    /// replaced. The response is returned whatever its status. Requests
    /// whose URL is not on the API root's scheme, host and port are refused
    /// before anything is sent.
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<ApiResponse> {
        if request.url().origin() != self.api_origin {
            return Err(Error::InvalidUrl {
                url: request.url().to_string(),
                reason: format!("requests must target {}", self.api_root),
            });
        }

        let headers = request.headers_mut();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));

        let method = request.method().clone();
        debug!(method = %method, path = request.url().path(), "dispatching request");
        metrics::counter!("meli_requests_total", "method" => method.to_string()).increment(1);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| Error::Transport(format!("{method} request failed: {e}")))?;

        debug!(method = %method, status = response.status().as_u16(), "response received");
        ApiResponse::read(response).await
    }

    pub async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
        self.send(Method::GET, path, None, params).await
    }

    /// POST `body` as JSON. With `None` the request has an empty body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let body = body.map(|b| serde_json::to_vec(b)).transpose()?;
        self.send(Method::POST, path, body, params).await
    }

    /// PUT `body` as JSON. With `None` the request has an empty body.
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let body = body.map(|b| serde_json::to_vec(b)).transpose()?;
        self.send(Method::PUT, path, body, params).await
    }

    pub async fn delete(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
        self.send(Method::DELETE, path, None, params).await
    }

    pub async fn options(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
        self.send(Method::OPTIONS, path, None, params).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        params: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let url = parse_url(&make_path(&self.api_root, path, params))?;
        let mut request = reqwest::Request::new(method, url);
        if let Some(body) = body {
            *request.body_mut() = Some(body.into());
        }
        self.execute(request).await
    }
}

impl fmt::Debug for MeliClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeliClient")
            .field("api_root", &self.api_root)
            .field("app_id", &self.app_id)
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockServer, test_client, test_config};
    use serde_json::json;

    #[tokio::test]
    async fn get_builds_path_and_query() {
        let server = MockServer::start(200, json!({"results": []})).await;
        let client = test_client(&server.url, Credentials::default());

        let response = client.get("/items", &[("q", "phone")]).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/items");
        assert_eq!(requests[0].query.as_deref(), Some("q=phone"));
    }

    #[tokio::test]
    async fn get_without_slash_or_params() {
        let server = MockServer::start(200, json!({})).await;
        let client = test_client(&server.url, Credentials::default());

        client.get("items", &[]).await.unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].path, "/items");
        assert_eq!(requests[0].query, None, "no trailing '?' expected");
    }

    #[tokio::test]
    async fn standard_headers_attached() {
        let server = MockServer::start(200, json!({})).await;
        let client = test_client(&server.url, Credentials::default());

        client.get("/sites/MLA", &[]).await.unwrap();

        let request = &server.requests()[0];
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("user-agent"), Some("MELI-RUST-SDK-TEST"));
    }

    #[tokio::test]
    async fn post_transmits_json_body() {
        let server = MockServer::start(201, json!({"id": "MLA1"})).await;
        let client = test_client(&server.url, Credentials::default());

        let response = client
            .post("/items", Some(&json!({"title": "x"})), &[])
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CREATED);

        let request = &server.requests()[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.body, r#"{"title":"x"}"#);
    }

    #[tokio::test]
    async fn post_keeps_params_in_query_string() {
        let server = MockServer::start(200, json!({})).await;
        let client = test_client(&server.url, Credentials::default());

        client
            .post("/items", Some(&json!({"title": "x"})), &[("access_token", "APP_USR-1")])
            .await
            .unwrap();

        let request = &server.requests()[0];
        assert_eq!(request.query.as_deref(), Some("access_token=APP_USR-1"));
        assert_eq!(request.body, r#"{"title":"x"}"#);
    }

    #[tokio::test]
    async fn post_without_body_sends_empty_body() {
        let server = MockServer::start(200, json!({})).await;
        let client = test_client(&server.url, Credentials::default());

        client
            .post::<serde_json::Value>("/items/MLA1/relist", None, &[("a", "1")])
            .await
            .unwrap();

        let request = &server.requests()[0];
        assert_eq!(request.body, "");
        assert_eq!(request.query.as_deref(), Some("a=1"));
    }

    #[tokio::test]
    async fn put_serializes_typed_body() {
        #[derive(Serialize)]
        struct PriceUpdate {
            price: u32,
        }

        let server = MockServer::start(200, json!({})).await;
        let client = test_client(&server.url, Credentials::default());

        client
            .put("items/MLA1", Some(&PriceUpdate { price: 150 }), &[])
            .await
            .unwrap();

        let request = &server.requests()[0];
        assert_eq!(request.method, "PUT");
        assert_eq!(request.path, "/items/MLA1");
        assert_eq!(request.body, r#"{"price":150}"#);
    }

    #[tokio::test]
    async fn delete_and_options_use_their_verbs() {
        let server = MockServer::start(200, json!({})).await;
        let client = test_client(&server.url, Credentials::default());

        client.delete("/questions/1", &[]).await.unwrap();
        client.options("/items", &[]).await.unwrap();

        let methods: Vec<String> = server.requests().into_iter().map(|r| r.method).collect();
        assert_eq!(methods, vec!["DELETE", "OPTIONS"]);
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let server = MockServer::start(404, json!({"message": "item not found"})).await;
        let client = test_client(&server.url, Credentials::default());

        let response = client.get("/items/MLA0", &[]).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.is_success());
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["message"], "item not found");
    }

    #[tokio::test]
    async fn execute_overrides_caller_headers() {
        let server = MockServer::start(200, json!({})).await;
        let client = test_client(&server.url, Credentials::default());

        let url = Url::parse(&format!("{}/users/me", server.url)).unwrap();
        let mut request = reqwest::Request::new(Method::GET, url);
        request
            .headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("text/html"));
        request.headers_mut().insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer APP_USR-1"),
        );

        client.execute(request).await.unwrap();

        let recorded = &server.requests()[0];
        assert_eq!(recorded.header("accept"), Some("application/json"));
        assert_eq!(recorded.header("authorization"), Some("Bearer APP_USR-1"));
    }

    #[tokio::test]
    async fn execute_refuses_foreign_host() {
        let api = MockServer::start(200, json!({})).await;
        let other = MockServer::start(200, json!({})).await;
        let client = test_client(&api.url, Credentials::default());

        let url = Url::parse(&format!("{}/users/me", other.url)).unwrap();
        let result = client.execute(reqwest::Request::new(Method::GET, url)).await;

        assert!(matches!(result, Err(Error::InvalidUrl { .. })), "got: {result:?}");
        assert!(api.requests().is_empty());
        assert!(other.requests().is_empty(), "nothing may reach another host");
    }

    #[test]
    fn cross_origin_token_endpoint_rejected() {
        let config = SdkConfig {
            oauth_url: "https://auth.example.com/oauth/token".into(),
            ..test_config("http://127.0.0.1:9")
        };
        let result =
            MeliClient::with_http_client(config, Credentials::default(), reqwest::Client::new());
        assert!(matches!(result, Err(Error::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = test_client(&format!("http://{addr}"), Credentials::default());
        let result = client.get("/items", &[]).await;
        assert!(matches!(result, Err(Error::Transport(_))), "got: {result:?}");
    }

    #[tokio::test]
    async fn token_accessors_round_trip() {
        let client = test_client("http://127.0.0.1:9", Credentials::default());
        assert_eq!(client.access_token().await, None);

        client.set_access_token(Some("T9".into())).await;
        client.set_refresh_token(Some("R9".into())).await;
        assert_eq!(client.access_token().await.as_deref(), Some("T9"));
        assert_eq!(client.refresh_token().await.as_deref(), Some("R9"));

        client.set_refresh_token(None).await;
        assert_eq!(client.refresh_token().await, None);
    }

    #[test]
    fn new_rejects_plain_http_config() {
        let result = MeliClient::new(test_config("http://127.0.0.1:1"), Credentials::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn new_accepts_default_config() {
        let client = MeliClient::new(SdkConfig::default(), Credentials::new("123", "s3cr3t")).unwrap();
        assert_eq!(client.app_id(), Some("123"));
        assert_eq!(client.secret(), Some("s3cr3t"));
        assert_eq!(client.token_endpoint, "https://api.mercadolibre.com/oauth/token");
    }

    #[test]
    fn debug_output_redacts_secret() {
        let client = test_client("http://127.0.0.1:9", Credentials::new("123", "s3cr3t"));
        let debug = format!("{client:?}");
        assert!(debug.contains("123"));
        assert!(!debug.contains("s3cr3t"), "secret leaked: {debug}");
    }

    #[test]
    fn unparseable_root_rejected() {
        let config = SdkConfig {
            api_root_url: "not a url".into(),
            ..test_config("http://127.0.0.1:9")
        };
        let result =
            MeliClient::with_http_client(config, Credentials::default(), reqwest::Client::new());
        assert!(matches!(result, Err(Error::InvalidUrl { .. })));
    }
}
