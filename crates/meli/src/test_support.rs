//! Local HTTP server that records requests and answers with a canned JSON body.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::SdkConfig;
use tokio::net::TcpListener;

use crate::client::{Credentials, MeliClient};

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Body decoded as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .into_owned()
            .collect()
    }
}

pub(crate) struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Serve every request with `status` and `body` until the test ends.
    pub async fn start(status: u16, body: serde_json::Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let status = StatusCode::from_u16(status).unwrap();

        let app = axum::Router::new().fallback(move |request: Request<Body>| {
            let recorded = recorded.clone();
            let body = body.clone();
            async move {
                let headers = request
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.to_string(),
                            value.to_str().unwrap_or("").to_string(),
                        )
                    })
                    .collect();
                let method = request.method().to_string();
                let path = request.uri().path().to_string();
                let query = request.uri().query().map(String::from);
                let bytes = axum::body::to_bytes(request.into_body(), 1024 * 1024)
                    .await
                    .unwrap();

                recorded.lock().unwrap().push(RecordedRequest {
                    method,
                    path,
                    query,
                    headers,
                    body: String::from_utf8_lossy(&bytes).to_string(),
                });

                (status, axum::Json(body))
            }
        });

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            requests,
            _handle: handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Config pointing both resource and token requests at `api_root`.
pub(crate) fn test_config(api_root: &str) -> SdkConfig {
    SdkConfig {
        sdk_version: "MELI-RUST-SDK-TEST".into(),
        api_root_url: api_root.into(),
        auth_url: "https://auth.mercadolibre.com.ar/authorization".into(),
        oauth_url: "/oauth/token".into(),
    }
}

/// Client over a plain reqwest client so it can reach the http mock server.
pub(crate) fn test_client(api_root: &str, credentials: Credentials) -> MeliClient {
    MeliClient::with_http_client(test_config(api_root), credentials, reqwest::Client::new())
        .unwrap()
}
