//! Typed API endpoints.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::{HistorySnapshot, NotePath, NoteSummary};
use crate::request::RequestManager;
use crate::transport::{ApiRequest, CREATE_HISTORY_HEADER};

#[derive(Debug, Deserialize)]
struct SuccessBody {
    #[serde(default)]
    success: bool,
}

/// A note as loaded from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedNote {
    pub content: String,
    pub last_modified: Option<String>,
}

/// Thin typed wrapper over the request manager.
#[derive(Clone)]
pub struct NoteClient {
    requests: Arc<RequestManager>,
}

impl NoteClient {
    pub fn new(requests: Arc<RequestManager>) -> Self {
        Self { requests }
    }

    pub fn requests(&self) -> &Arc<RequestManager> {
        &self.requests
    }

    /// Exchange the password for a session cookie.
    pub async fn login(&self, password: &str) -> Result<()> {
        let response = self
            .requests
            .fetch(ApiRequest::post("/api/auth").json(json!({ "password": password })))
            .await?
            .error_for_status()?;
        let body: SuccessBody = response.json()?;
        if body.success {
            Ok(())
        } else {
            Err(Error::AuthInvalid)
        }
    }

    /// `Ok(false)` when the server rejects the session credential.
    pub async fn check_auth(&self) -> Result<bool> {
        self.check_auth_request(ApiRequest::get("/api/check-auth")).await
    }

    pub async fn check_auth_with_timeout(&self, timeout: Duration) -> Result<bool> {
        self.check_auth_request(ApiRequest::get("/api/check-auth").timeout(timeout))
            .await
    }

    async fn check_auth_request(&self, request: ApiRequest) -> Result<bool> {
        match self.requests.fetch(request).await?.error_for_status() {
            Ok(response) => Ok(response.json::<SuccessBody>()?.success),
            Err(Error::AuthInvalid) => Ok(false),
            Err(error) => Err(error),
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.requests
            .fetch(ApiRequest::post("/api/logout"))
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Load a note. A note that was never saved loads as empty content.
    pub async fn load_note(&self, path: &NotePath) -> Result<LoadedNote> {
        let response = self
            .requests
            .fetch(ApiRequest::get(note_url(path)))
            .await?
            .error_for_status()?;
        Ok(LoadedNote {
            content: response.body,
            last_modified: response.last_modified,
        })
    }

    pub async fn save_note(&self, path: &NotePath, content: &str, create_history: bool) -> Result<()> {
        let request = ApiRequest::post(note_url(path))
            .header(CREATE_HISTORY_HEADER, if create_history { "true" } else { "false" })
            .text(content);
        self.requests.fetch(request).await?.error_for_status()?;
        tracing::debug!(path = %path, create_history, bytes = content.len(), "Saved note");
        Ok(())
    }

    pub async fn delete_note(&self, path: &NotePath) -> Result<()> {
        self.requests
            .fetch(ApiRequest::delete(note_url(path)))
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn list_notes(&self) -> Result<Vec<NoteSummary>> {
        self.requests
            .fetch(ApiRequest::get("/api/notes"))
            .await?
            .error_for_status()?
            .json()
    }

    /// Snapshots of `path`, newest first.
    pub async fn list_history(&self, path: &NotePath) -> Result<Vec<HistorySnapshot>> {
        self.requests
            .fetch(ApiRequest::get(history_url(path)))
            .await?
            .error_for_status()?
            .json()
    }

    pub async fn get_history(&self, path: &NotePath, timestamp: i64) -> Result<String> {
        let response = self
            .requests
            .fetch(ApiRequest::get(format!("{}/{timestamp}", history_url(path))))
            .await?
            .error_for_status()?;
        Ok(response.body)
    }

    pub async fn delete_history(&self, path: &NotePath, timestamp: i64) -> Result<()> {
        self.requests
            .fetch(ApiRequest::delete(format!("{}/{timestamp}", history_url(path))))
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn delete_all_history(&self, path: &NotePath) -> Result<()> {
        self.requests
            .fetch(ApiRequest::delete(history_url(path)))
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Raw settings object for the device class the server infers.
    pub async fn get_settings(&self) -> Result<Map<String, Value>> {
        let response = self
            .requests
            .fetch(ApiRequest::get("/api/settings"))
            .await?
            .error_for_status()?;
        match response.json::<Value>()? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Parse(format!("expected settings object, got {other}"))),
        }
    }

    pub async fn put_settings(&self, settings: &Value) -> Result<()> {
        if !settings.is_object() {
            return Err(Error::Validation("settings must be a JSON object".to_string()));
        }
        self.requests
            .fetch(ApiRequest::post("/api/settings").json(settings.clone()))
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn note_url(path: &NotePath) -> String {
    format!("/api/note/{}", urlencoding::encode(path.as_str()))
}

fn history_url(path: &NotePath) -> String {
    format!("/api/history/{}", urlencoding::encode(path.as_str()))
}
