//! Cloudflare v4 REST client.
//!
//! Every response is wrapped in the v4 envelope:
//!
//! ```text
//! { "success": bool, "errors": [{ "code": u32, "message": str }], "result": T, "result_info": {...} }
//! ```
//!
//! Failures are surfaced as [`ApiError`] and classified into the engine's
//! error taxonomy by `From<ApiError> for RemoteError`.

use std::time::Duration;

use cfsync_core::RemoteError;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_SIZE: u32 = 50;

/// API error codes that mean the addressed object does not exist.
const NOT_FOUND_CODES: &[u32] = &[
    81044, // DNS record
    10007, // worker script or route
    1001,  // zone
    7003,  // zone, invalid identifier
    10013, // KV namespace
];

/// One entry of the envelope's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    pub code: u32,
    #[serde(default)]
    pub message: String,
}

/// Pagination block of list responses.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

/// Errors from the Cloudflare API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        codes: Vec<u32>,
        message: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    fn from_envelope(status: StatusCode, errors: &[ApiMessage]) -> Self {
        let message = if errors.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ")
        };
        ApiError::Status {
            status: status.as_u16(),
            codes: errors.iter().map(|e| e.code).collect(),
            message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Status { status, codes, .. } => {
                *status == 404 || codes.iter().any(|c| NOT_FOUND_CODES.contains(c))
            }
            _ => false,
        }
    }
}

impl From<ApiError> for RemoteError {
    fn from(err: ApiError) -> Self {
        if err.is_not_found() {
            return RemoteError::not_found(err.to_string());
        }
        match &err {
            ApiError::Status { status, .. } => match *status {
                408 | 429 | 500..=599 => RemoteError::transient(err.to_string()),
                _ => RemoteError::permanent(err.to_string()),
            },
            ApiError::Transport(e) if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() => {
                RemoteError::transient(err.to_string())
            }
            ApiError::Transport(_) | ApiError::Decode(_) => RemoteError::permanent(err.to_string()),
        }
    }
}

/// Thin client over the v4 REST API. Cheap to clone.
#[derive(Clone)]
pub struct CloudflareClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CloudflareClient {
    pub fn new(token: &str, base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("cfsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(%method, path, "Cloudflare API request");
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> Result<(T, Option<ResultInfo>), ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(env) => env,
            Err(_) if !status.is_success() => return Err(ApiError::from_envelope(status, &[])),
            Err(e) => return Err(ApiError::Decode(e.to_string())),
        };

        if !status.is_success() || !envelope.success {
            return Err(ApiError::from_envelope(status, &envelope.errors));
        }

        let result = envelope
            .result
            .ok_or_else(|| ApiError::Decode("response has no result".to_string()))?;
        Ok((result, envelope.result_info))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(self.request(Method::GET, path))
            .await
            .map(|(r, _)| r)
    }

    /// GET every page of a list endpoint.
    pub async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let req = self
                .request(Method::GET, path)
                .query(&[("page", page), ("per_page", PAGE_SIZE)]);
            let (batch, info): (Vec<T>, _) = self.send(req).await?;
            let done = batch.is_empty()
                || info.is_none_or(|i| i.total_pages == 0 || page >= i.total_pages);
            items.extend(batch);
            if done {
                return Ok(items);
            }
            page += 1;
        }
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::POST, path).json(body))
            .await
            .map(|(r, _)| r)
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::PUT, path).json(body))
            .await
            .map(|(r, _)| r)
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(self.request(Method::PATCH, path).json(body))
            .await
            .map(|(r, _)| r)
    }

    /// PUT where only success matters.
    pub async fn put_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::PUT, path).json(body)).await
    }

    /// DELETE, discarding whatever the result holds.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_unit(self.request(Method::DELETE, path)).await
    }

    async fn send_unit(&self, req: RequestBuilder) -> Result<(), ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        // Some endpoints answer with `"result": null` or an empty body.
        match serde_json::from_slice::<Envelope<IgnoredAny>>(&body) {
            Ok(env) if status.is_success() && env.success => Ok(()),
            Ok(env) => Err(ApiError::from_envelope(status, &env.errors)),
            Err(_) if status.is_success() => Ok(()),
            Err(_) => Err(ApiError::from_envelope(status, &[])),
        }
    }
}

/// Map a delete result so a missing object counts as deleted.
pub fn ignore_not_found(res: Result<(), ApiError>) -> Result<(), ApiError> {
    match res {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfsync_core::ErrorKind;
    use serde_json::{Value, json};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn status_err(status: u16, codes: &[u32]) -> ApiError {
        ApiError::Status {
            status,
            codes: codes.to_vec(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_classification() {
        let cases = [
            (status_err(404, &[]), ErrorKind::NotFound),
            (status_err(400, &[81044]), ErrorKind::NotFound),
            (status_err(403, &[1001]), ErrorKind::NotFound),
            (status_err(400, &[10013]), ErrorKind::NotFound),
            (status_err(429, &[]), ErrorKind::Transient),
            (status_err(503, &[]), ErrorKind::Transient),
            (status_err(408, &[]), ErrorKind::Transient),
            (status_err(400, &[9000]), ErrorKind::Permanent),
            (status_err(401, &[]), ErrorKind::Permanent),
            (status_err(403, &[]), ErrorKind::Permanent),
            (ApiError::Decode("bad".into()), ErrorKind::Permanent),
        ];
        for (err, kind) in cases {
            let msg = err.to_string();
            assert_eq!(RemoteError::from(err).kind(), kind, "{}", msg);
        }
    }

    #[tokio::test]
    async fn test_get_unwraps_envelope_and_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/z1"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": { "id": "z1" }
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("secret", &server.uri()).unwrap();
        let zone: Value = client.get("/zones/z1").await.unwrap();
        assert_eq!(zone["id"], "z1");
    }

    #[tokio::test]
    async fn test_error_envelope_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/z1/dns_records/r1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "errors": [{ "code": 81044, "message": "Record does not exist." }],
                "result": null
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("secret", &server.uri()).unwrap();
        let err = client.get::<Value>("/zones/z1/dns_records/r1").await.unwrap_err();
        match &err {
            ApiError::Status { codes, .. } => assert_eq!(codes, &vec![81044]),
            other => panic!("Unexpected error: {:?}", other),
        }
        assert!(RemoteError::from(err).is_not_found());
    }

    #[tokio::test]
    async fn test_unparseable_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("secret", &server.uri()).unwrap();
        let err = client.get::<Value>("/zones").await.unwrap_err();
        assert!(RemoteError::from(err).is_transient());
    }

    #[tokio::test]
    async fn test_list_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [],
                "result": [{ "id": "a" }, { "id": "b" }],
                "result_info": { "page": 1, "total_pages": 2 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [],
                "result": [{ "id": "c" }],
                "result_info": { "page": 2, "total_pages": 2 }
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("secret", &server.uri()).unwrap();
        let items: Vec<Value> = client.list("/items").await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2]["id"], "c");
    }

    #[tokio::test]
    async fn test_delete_accepts_null_result() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/zones/z1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": null
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("secret", &server.uri()).unwrap();
        client.delete("/zones/z1").await.unwrap();
    }

    #[test]
    fn test_ignore_not_found() {
        assert!(ignore_not_found(Err(status_err(404, &[]))).is_ok());
        assert!(ignore_not_found(Err(status_err(500, &[]))).is_err());
    }
}
