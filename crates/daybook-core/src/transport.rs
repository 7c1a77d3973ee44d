//! HTTP transport seam.
//!
//! Everything above this module talks to the API through [`Transport`], so
//! tests can swap in an in-memory server. [`HttpTransport`] is the reqwest
//! implementation used by real sessions; it plays the part of a browser
//! cookie jar by persisting the session cookie through [`CredentialJar`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::models::DeviceClass;
use crate::store::SharedStore;
use crate::util::is_http_url;

/// Name of the signed session cookie issued by the API.
pub const SESSION_COOKIE_NAME: &str = "daybook_session";
pub const SESSION_CREDENTIAL_KEY: &str = "session_credential";
pub const CREATE_HISTORY_HEADER: &str = "X-Create-History";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Json(serde_json::Value),
}

/// One API call. `path` is relative to the server root, e.g. `/api/notes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Overrides the request manager's default timeout
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub last_modified: Option<String>,
}

impl ApiResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            last_modified: None,
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            last_modified: None,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Turn non-success statuses into the matching [`Error`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::from_status(self.status, &self.body))
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request. Non-success statuses are returned, not raised.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// Persists the session cookie value in the local store.
#[derive(Clone)]
pub struct CredentialJar {
    store: SharedStore,
}

impl CredentialJar {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Option<String> {
        match self.store.get(SESSION_CREDENTIAL_KEY) {
            Ok(value) => value.filter(|value| !value.is_empty()),
            Err(error) => {
                tracing::warn!("Failed to read session credential: {}", error);
                None
            }
        }
    }

    pub fn set(&self, token: &str) {
        if let Err(error) = self.store.set(SESSION_CREDENTIAL_KEY, token) {
            tracing::warn!("Failed to persist session credential: {}", error);
        }
    }

    pub fn clear(&self) {
        if let Err(error) = self.store.remove(SESSION_CREDENTIAL_KEY) {
            tracing::warn!("Failed to clear session credential: {}", error);
        }
    }

    /// Apply one `Set-Cookie` header value. Cookies for other names are ignored.
    pub fn apply_set_cookie(&self, header: &str) {
        match parse_session_cookie(header) {
            Some(CookieUpdate::Set(token)) => self.set(&token),
            Some(CookieUpdate::Clear) => self.clear(),
            None => {}
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CookieUpdate {
    Set(String),
    Clear,
}

fn parse_session_cookie(header: &str) -> Option<CookieUpdate> {
    let mut parts = header.split(';').map(str::trim);
    let (name, value) = parts.next()?.split_once('=')?;
    if name.trim() != SESSION_COOKIE_NAME {
        return None;
    }
    let expired = parts.any(|attribute| {
        attribute
            .split_once('=')
            .is_some_and(|(key, value)| key.eq_ignore_ascii_case("max-age") && value.trim() == "0")
    });
    let value = value.trim();
    if expired || value.is_empty() {
        Some(CookieUpdate::Clear)
    } else {
        Some(CookieUpdate::Set(value.to_string()))
    }
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    user_agent: String,
    credentials: CredentialJar,
}

impl HttpTransport {
    pub fn new(base_url: &str, device: DeviceClass, credentials: CredentialJar) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Network(format!("Failed to construct HTTP client: {error}")))?;
        Ok(Self {
            base_url,
            client,
            user_agent: device.user_agent_hint(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(&self, request: ApiRequest) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Delete => self.client.delete(url),
        };
        builder = builder.header(reqwest::header::USER_AGENT, &self.user_agent);
        if let Some(token) = self.credentials.get() {
            builder = builder.header(
                reqwest::header::COOKIE,
                format!("{SESSION_COOKIE_NAME}={token}"),
            );
        }
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        match request.body {
            Some(RequestBody::Text(text)) => builder
                .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(text),
            Some(RequestBody::Json(value)) => builder.json(&value),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.build(request).send().await?;

        for header in response.headers().get_all(reqwest::header::SET_COOKIE) {
            if let Ok(raw) = header.to_str() {
                self.credentials.apply_set_cookie(raw);
            }
        }

        let status = response.status().as_u16();
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let body = response.text().await?;
        tracing::debug!(method = method.as_str(), path, status, "API response");

        Ok(ApiResponse {
            status,
            body,
            last_modified,
        })
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err(Error::Validation("server URL must not be empty".to_string()));
    }
    if !is_http_url(&base) {
        return Err(Error::Validation(
            "server URL must include http:// or https://".to_string(),
        ));
    }
    Ok(base)
}
