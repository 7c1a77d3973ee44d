use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use http::header::{self, HeaderMap, HeaderValue};
use http::Extensions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use daybook_core::transport::CREATE_HISTORY_HEADER;
use daybook_core::{DeviceClass, EditorSettings, HistorySnapshot, NotePath, NoteSummary};

use crate::auth::{extract_session_token, password_matches, SessionSigner};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{LoginRateLimiter, RateLimitMetricsSnapshot};
use crate::storage::NoteStore;

const NOTE_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<NoteStore>,
    signer: Arc<SessionSigner>,
    login_rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            store: Arc::new(NoteStore::new(
                config.data_dir.clone(),
                config.history_retention,
            )),
            signer: Arc::new(SessionSigner::from_config(&config)),
            login_rate_limiter: Arc::new(LoginRateLimiter::from_config(&config)),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/check-auth", get(check_auth))
        .route("/note/{path}", get(read_note).post(save_note).delete(delete_note))
        .route("/notes", get(list_notes))
        .route("/history/{path}", get(list_history).delete(delete_all_history))
        .route(
            "/history/{path}/{timestamp}",
            get(read_history).delete(delete_history),
        )
        .route("/settings", get(read_settings).post(save_settings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api_routes = Router::new()
        .route("/auth", post(login))
        .route("/logout", post(logout))
        .merge(protected_routes)
        .layer(middleware::from_fn(no_store));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.login_rate_limiter.metrics_snapshot(),
    })
}

#[derive(Debug, Serialize)]
struct SuccessResponse {
    success: bool,
}

const fn success() -> Json<SuccessResponse> {
    Json(SuccessResponse { success: true })
}

async fn no_store(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_session_token(request.headers())?;
    state.signer.verify(token)?;
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    password: String,
}

async fn login(
    State(state): State<AppState>,
    extensions: Extensions,
    body: String,
) -> Result<Response, AppError> {
    let client = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());
    state.login_rate_limiter.check(&client).await?;

    let request: LoginRequest = serde_json::from_str(&body)
        .map_err(|_| AppError::bad_request("Body must be a JSON object with a `password` field"))?;
    if !password_matches(&state.config.password, &request.password) {
        tracing::warn!(endpoint = "auth", "Rejected login attempt");
        return Err(AppError::unauthorized("Invalid password"));
    }

    let token = state.signer.issue()?;
    tracing::info!(endpoint = "auth", "Issued session");
    Ok((
        [(header::SET_COOKIE, state.signer.session_cookie(&token))],
        success(),
    )
        .into_response())
}

async fn check_auth() -> Json<SuccessResponse> {
    success()
}

async fn logout(State(state): State<AppState>) -> Response {
    (
        [(header::SET_COOKIE, state.signer.clearing_cookie())],
        success(),
    )
        .into_response()
}

async fn read_note(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
) -> Result<Response, AppError> {
    let path = NotePath::parse(&raw_path)?;
    let stored = state.store.read_note(&path).await?;

    let (content, modified) = match stored {
        Some(note) => (note.content, Some(note.modified)),
        None => (String::new(), None),
    };
    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static(NOTE_CONTENT_TYPE))],
        content,
    )
        .into_response();
    if let Some(value) = modified.and_then(|at| HeaderValue::from_str(&http_date(at)).ok()) {
        response.headers_mut().insert(header::LAST_MODIFIED, value);
    }
    Ok(response)
}

async fn save_note(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
    headers: HeaderMap,
    content: String,
) -> Result<Json<SuccessResponse>, AppError> {
    let path = NotePath::parse(&raw_path)?;
    let create_history = headers
        .get(CREATE_HISTORY_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));

    let snapshot = state
        .store
        .write_note(&path, &content, create_history)
        .await?;
    tracing::info!(
        endpoint = "note_save",
        path = %path,
        bytes = content.len(),
        snapshot = snapshot.unwrap_or_default(),
        "Saved note"
    );
    Ok(success())
}

async fn delete_note(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let path = NotePath::parse(&raw_path)?;
    if !state.store.delete_note(&path).await? {
        return Err(AppError::not_found("Note not found"));
    }
    tracing::info!(endpoint = "note_delete", path = %path, "Deleted note");
    Ok(success())
}

async fn list_notes(State(state): State<AppState>) -> Result<Json<Vec<NoteSummary>>, AppError> {
    Ok(Json(state.store.list_notes().await?))
}

async fn list_history(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
) -> Result<Json<Vec<HistorySnapshot>>, AppError> {
    let path = NotePath::parse(&raw_path)?;
    Ok(Json(state.store.list_history(&path).await?))
}

async fn read_history(
    State(state): State<AppState>,
    Path((raw_path, raw_timestamp)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let path = NotePath::parse(&raw_path)?;
    let timestamp = parse_timestamp(&raw_timestamp)?;
    let content = state
        .store
        .read_history(&path, timestamp)
        .await?
        .ok_or_else(|| AppError::not_found("History snapshot not found"))?;
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(NOTE_CONTENT_TYPE))],
        content,
    )
        .into_response())
}

async fn delete_history(
    State(state): State<AppState>,
    Path((raw_path, raw_timestamp)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    let path = NotePath::parse(&raw_path)?;
    let timestamp = parse_timestamp(&raw_timestamp)?;
    if !state.store.delete_history(&path, timestamp).await? {
        return Err(AppError::not_found("History snapshot not found"));
    }
    Ok(success())
}

async fn delete_all_history(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    let path = NotePath::parse(&raw_path)?;
    state.store.delete_all_history(&path).await?;
    tracing::info!(endpoint = "history_clear", path = %path, "Cleared note history");
    Ok(success())
}

async fn read_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let device = device_class(&headers);
    let settings = match state.store.read_settings(device).await? {
        Some(stored) => Value::Object(stored),
        None => serde_json::to_value(EditorSettings::defaults_for(device)).map_err(|error| {
            AppError::internal(format!("encode default settings: {error}"))
        })?,
    };
    Ok(Json(settings))
}

async fn save_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<SuccessResponse>, AppError> {
    let device = device_class(&headers);
    let Ok(Value::Object(settings)) = serde_json::from_str::<Value>(&body) else {
        return Err(AppError::bad_request("Settings must be a JSON object"));
    };
    state.store.write_settings(device, &settings).await?;
    tracing::info!(endpoint = "settings_save", device = %device, keys = settings.len(), "Saved settings");
    Ok(success())
}

fn device_class(headers: &HeaderMap) -> DeviceClass {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    DeviceClass::from_user_agent(user_agent)
}

fn parse_timestamp(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .ok()
        .filter(|timestamp| *timestamp >= 0)
        .ok_or_else(|| AppError::bad_request(format!("Invalid timestamp '{raw}'")))
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_date_uses_imf_fixdate() {
        let at = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        assert_eq!(http_date(at), "Mon, 01 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn timestamps_must_be_non_negative_integers() {
        assert_eq!(parse_timestamp("1704067200000").unwrap(), 1_704_067_200_000);
        assert!(parse_timestamp("-1").is_err());
        assert!(parse_timestamp("abc").is_err());
    }

    #[test]
    fn device_class_comes_from_user_agent() {
        let mut headers = HeaderMap::new();
        assert_eq!(device_class(&headers), DeviceClass::Desktop);
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (iPhone) Mobile/15E148"),
        );
        assert_eq!(device_class(&headers), DeviceClass::Mobile);
    }
}
