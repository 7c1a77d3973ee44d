//! In-memory API used by the unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::{DeviceClass, EditorSettings, HistorySnapshot, NoteSummary};
use crate::transport::{ApiRequest, ApiResponse, Method, RequestBody, Transport, CREATE_HISTORY_HEADER};
use crate::util::unix_millis_now;

#[derive(Default)]
struct State {
    password: String,
    authed: bool,
    offline: bool,
    delay: Option<Duration>,
    fail_saves: bool,
    notes: BTreeMap<String, String>,
    history: BTreeMap<String, Vec<HistorySnapshot>>,
    settings: Option<Map<String, Value>>,
    calls: Vec<(Method, String)>,
    saves: Vec<(String, String, bool)>,
    settings_writes: Vec<Value>,
}

pub struct FakeServer {
    state: Mutex<State>,
}

impl FakeServer {
    pub fn new(password: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                password: password.to_string(),
                ..State::default()
            }),
        })
    }

    /// Server with an already valid session.
    pub fn authed() -> Arc<Self> {
        let server = Self::new("password");
        server.state.lock().unwrap().authed = true;
        server
    }

    pub fn set_authed(&self, authed: bool) {
        self.state.lock().unwrap().authed = authed;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.state.lock().unwrap().fail_saves = fail;
    }

    pub fn put_note(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .notes
            .insert(path.to_string(), content.to_string());
    }

    pub fn note(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().notes.get(path).cloned()
    }

    pub fn put_settings(&self, settings: Value) {
        self.state.lock().unwrap().settings = settings.as_object().cloned();
    }

    pub fn stored_settings(&self) -> Option<Map<String, Value>> {
        self.state.lock().unwrap().settings.clone()
    }

    pub fn saves(&self) -> Vec<(String, String, bool)> {
        self.state.lock().unwrap().saves.clone()
    }

    pub fn settings_writes(&self) -> Vec<Value> {
        self.state.lock().unwrap().settings_writes.clone()
    }

    pub fn history_len(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .history
            .get(path)
            .map_or(0, Vec::len)
    }

    /// Number of calls whose method matches and whose URL starts with `prefix`.
    pub fn count(&self, method: Method, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(called, path)| *called == method && path.starts_with(prefix))
            .count()
    }

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let mut state = self.state.lock().unwrap();
        state.calls.push((request.method, request.path.clone()));

        let segments: Vec<String> = request
            .path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            })
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match (request.method, segments.as_slice()) {
            (Method::Post, ["api", "auth"]) => {
                let password = match &request.body {
                    Some(RequestBody::Json(body)) => body["password"].as_str().unwrap_or_default().to_string(),
                    _ => String::new(),
                };
                if password == state.password {
                    state.authed = true;
                    success()
                } else {
                    error(401, "Invalid password")
                }
            }
            (Method::Get, ["api", "check-auth"]) => {
                if state.authed {
                    success()
                } else {
                    error(401, "Not authenticated")
                }
            }
            (Method::Post, ["api", "logout"]) => {
                state.authed = false;
                success()
            }
            _ if !state.authed => error(401, "Not authenticated"),
            (Method::Get, ["api", "note", path]) => {
                let content = state.notes.get(*path).cloned().unwrap_or_default();
                ApiResponse::ok(content)
            }
            (Method::Post, ["api", "note", path]) => {
                if state.fail_saves {
                    return error(500, "disk full");
                }
                let content = match &request.body {
                    Some(RequestBody::Text(text)) => text.clone(),
                    _ => String::new(),
                };
                let create_history = request.header_value(CREATE_HISTORY_HEADER) == Some("true");
                state.notes.insert((*path).to_string(), content.clone());
                state
                    .saves
                    .push(((*path).to_string(), content.clone(), create_history));
                if create_history {
                    let snapshots = state.history.entry((*path).to_string()).or_default();
                    let last = snapshots.first().map_or(0, |snapshot| snapshot.timestamp);
                    snapshots.insert(
                        0,
                        HistorySnapshot {
                            timestamp: unix_millis_now().max(last + 1),
                            content,
                        },
                    );
                }
                success()
            }
            (Method::Delete, ["api", "note", path]) => {
                if state.notes.remove(*path).is_none() {
                    return error(404, "Note not found");
                }
                state.history.remove(*path);
                success()
            }
            (Method::Get, ["api", "notes"]) => {
                let summaries: Vec<NoteSummary> = state
                    .notes
                    .iter()
                    .map(|(path, content)| NoteSummary {
                        path: path.clone(),
                        last_modified: chrono::Utc::now(),
                        size: content.len() as u64,
                    })
                    .collect();
                json_response(&json!(summaries))
            }
            (Method::Get, ["api", "history", path]) => {
                let snapshots = state.history.get(*path).cloned().unwrap_or_default();
                json_response(&json!(snapshots))
            }
            (Method::Delete, ["api", "history", path]) => {
                state.history.remove(*path);
                success()
            }
            (method, ["api", "history", path, timestamp]) => {
                let Ok(timestamp) = timestamp.parse::<i64>() else {
                    return error(400, "Invalid timestamp");
                };
                let snapshots = state.history.entry((*path).to_string()).or_default();
                let position = snapshots
                    .iter()
                    .position(|snapshot| snapshot.timestamp == timestamp);
                match (method, position) {
                    (_, None) => error(404, "History not found"),
                    (Method::Get, Some(index)) => ApiResponse::ok(snapshots[index].content.clone()),
                    (Method::Delete, Some(index)) => {
                        snapshots.remove(index);
                        success()
                    }
                    _ => error(405, "Method not allowed"),
                }
            }
            (Method::Get, ["api", "settings"]) => {
                let settings = state.settings.clone().map_or_else(
                    || json!(EditorSettings::defaults_for(DeviceClass::Desktop)),
                    Value::Object,
                );
                json_response(&settings)
            }
            (Method::Post, ["api", "settings"]) => match &request.body {
                Some(RequestBody::Json(Value::Object(map))) => {
                    state.settings = Some(map.clone());
                    state.settings_writes.push(Value::Object(map.clone()));
                    success()
                }
                _ => error(400, "Settings must be an object"),
            },
            _ => error(404, "Not found"),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let (offline, delay) = {
            let state = self.state.lock().unwrap();
            (state.offline, state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if offline {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(self.handle(&request))
    }
}

fn success() -> ApiResponse {
    ApiResponse::ok(r#"{"success":true}"#)
}

fn error(status: u16, message: &str) -> ApiResponse {
    ApiResponse::with_status(status, json!({ "error": message }).to_string())
}

fn json_response(value: &Value) -> ApiResponse {
    ApiResponse::ok(value.to_string())
}
