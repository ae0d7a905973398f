//! HTTP boundary: the transport seam and its reqwest implementation.

use crate::auth::TokenStore;
use crate::base_url::resolve_base_url;
use crate::error::ClientError;
use async_trait::async_trait;
use meridian_core::{server_message, ApiConfig, FilterParams, SyncError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A request relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Append filters as query parameters. Absent filters were never stored.
    pub fn with_filters(mut self, filters: &FilterParams) -> Self {
        self.query.extend(filters.to_query_pairs());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, SyncError> {
        let value = serde_json::to_value(body)
            .map_err(|e| SyncError::unexpected(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// `path?k=v&k=v`, used for logging and request matching.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

/// A successful (2xx) response. `data` is `Null` for empty bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
}

impl ApiResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self { status, data }
    }

    pub fn ok(data: Value) -> Self {
        Self::new(200, data)
    }

    pub fn no_content() -> Self {
        Self::new(204, Value::Null)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        decode_value(&self.data)
    }

    /// Server-supplied `message`, if any.
    pub fn message(&self) -> Option<String> {
        server_message(&self.data)
    }
}

/// Decode a record, accepting either the bare record or `{data: record}`.
pub fn decode_value<T: DeserializeOwned>(value: &Value) -> Result<T, SyncError> {
    match serde_json::from_value::<T>(value.clone()) {
        Ok(decoded) => Ok(decoded),
        Err(err) => match value.get("data") {
            Some(inner) => serde_json::from_value(inner.clone())
                .map_err(|inner_err| SyncError::decode(inner_err.to_string())),
            None => Err(SyncError::decode(err.to_string())),
        },
    }
}

/// Anything that can carry an [`ApiRequest`] to the backend.
///
/// Implementations return `Err` for every non-2xx response, classified with
/// [`SyncError::from_response`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError>;
}

pub type SharedTransport = Arc<dyn Transport>;

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        (**self).send(request).await
    }
}

/// Send `request` and decode the response body.
pub async fn send_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    request: ApiRequest,
) -> Result<T, SyncError> {
    transport.send(request).await?.decode()
}

/// reqwest-backed [`Transport`] with bearer authentication.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        if reqwest::Url::parse(&base_url).is_err() {
            return Err(ClientError::InvalidBaseUrl(base_url));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub fn from_config(
        config: &ApiConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let base_url = resolve_base_url(config.client_host.as_deref(), config);
        tracing::info!(base_url = %base_url, "API base URL resolved");
        Self::new(base_url, config.request_timeout(), tokens)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn bearer_token(&self) -> Option<String> {
        match self.tokens.load() {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "Failed to read access token; sending unauthenticated"
                );
                None
            }
        }
    }
}

#[async_trait]
impl Transport for RestClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SyncError> {
        let mut builder = self
            .client
            .request(request.method.into(), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = self.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(map_reqwest_error)?;
        let data = parse_body(&text);
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status,
            "Request completed"
        );

        if (200..300).contains(&status) {
            Ok(ApiResponse::new(status, data))
        } else {
            Err(SyncError::from_response(status, &data))
        }
    }
}

/// Empty bodies (204) become `Null`; non-JSON bodies are kept as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else if err.is_decode() {
        SyncError::decode(err.to_string())
    } else {
        SyncError::transport(err.to_string())
    }
}
