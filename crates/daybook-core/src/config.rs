//! Client configuration from the environment.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::DeviceClass;
use crate::util::{is_http_url, non_blank};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3457";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings a client session needs to reach the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub request_timeout: Duration,
    /// Device class hinted to the server through the `User-Agent`
    pub device: DeviceClass,
    /// Local store file; front-ends pick a default when unset
    pub store_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            device: DeviceClass::Desktop,
            store_path: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_url = optional_trimmed(&lookup, "DAYBOOK_SERVER_URL")
            .map_or_else(|| DEFAULT_SERVER_URL.to_string(), |url| url.trim_end_matches('/').to_string());
        if !is_http_url(&server_url) {
            return Err(ConfigError::Invalid(
                "DAYBOOK_SERVER_URL must start with http:// or https://".to_string(),
            ));
        }

        let timeout_ms = match optional_trimmed(&lookup, "DAYBOOK_REQUEST_TIMEOUT_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(
                    "DAYBOOK_REQUEST_TIMEOUT_MS must be an integer in [100, 60000]".to_string(),
                )
            })?,
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };
        if !(100..=60_000).contains(&timeout_ms) {
            return Err(ConfigError::Invalid(
                "DAYBOOK_REQUEST_TIMEOUT_MS must be in [100, 60000]".to_string(),
            ));
        }

        let device = match optional_trimmed(&lookup, "DAYBOOK_DEVICE") {
            Some(raw) => raw.parse::<DeviceClass>().map_err(|_| {
                ConfigError::Invalid("DAYBOOK_DEVICE must be 'desktop' or 'mobile'".to_string())
            })?,
            None => DeviceClass::Desktop,
        };

        let store_path = optional_trimmed(&lookup, "DAYBOOK_STORE_PATH").map(PathBuf::from);

        Ok(Self {
            server_url,
            request_timeout: Duration::from_millis(timeout_ms),
            device,
            store_path,
        })
    }
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    non_blank(lookup(name))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        ClientConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(config(&[]).unwrap(), ClientConfig::default());
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let parsed = config(&[
            ("DAYBOOK_SERVER_URL", " https://notes.example.com/ "),
            ("DAYBOOK_REQUEST_TIMEOUT_MS", "1500"),
            ("DAYBOOK_DEVICE", "Mobile"),
            ("DAYBOOK_STORE_PATH", "/tmp/daybook.json"),
        ])
        .unwrap();
        assert_eq!(parsed.server_url, "https://notes.example.com");
        assert_eq!(parsed.request_timeout, Duration::from_millis(1500));
        assert_eq!(parsed.device, DeviceClass::Mobile);
        assert_eq!(parsed.store_path, Some(PathBuf::from("/tmp/daybook.json")));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config(&[("DAYBOOK_SERVER_URL", "notes.example.com")]).is_err());
        assert!(config(&[("DAYBOOK_REQUEST_TIMEOUT_MS", "soon")]).is_err());
        assert!(config(&[("DAYBOOK_REQUEST_TIMEOUT_MS", "5")]).is_err());
        assert!(config(&[("DAYBOOK_DEVICE", "tablet")]).is_err());
    }
}
