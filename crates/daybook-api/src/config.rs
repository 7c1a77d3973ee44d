use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const MIN_SESSION_SECRET_LEN: usize = 16;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub password: String,
    pub session_secret: String,
    pub data_dir: PathBuf,
    pub session_ttl: Duration,
    pub history_retention: Duration,
    pub secure_cookie: bool,
    pub rate_limit_window: Duration,
    pub login_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("password", &"[REDACTED]")
            .field("session_secret", &"[REDACTED]")
            .field("data_dir", &self.data_dir)
            .field("session_ttl", &self.session_ttl)
            .field("history_retention", &self.history_retention)
            .field("secure_cookie", &self.secure_cookie)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "login_rate_limit_per_window",
                &self.login_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "DAYBOOK_BIND_ADDR", "127.0.0.1:3457");

        let password = required_trimmed(&lookup, "DAYBOOK_PASSWORD")?;
        let session_secret = required_trimmed(&lookup, "DAYBOOK_SESSION_SECRET")?;
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "DAYBOOK_SESSION_SECRET must be at least {MIN_SESSION_SECRET_LEN} characters"
            )));
        }

        let data_dir = PathBuf::from(value_or_default(&lookup, "DAYBOOK_DATA_DIR", "data"));

        let session_ttl_days = value_or_default(&lookup, "DAYBOOK_SESSION_TTL_DAYS", "30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "DAYBOOK_SESSION_TTL_DAYS must be an integer in [1, 365]".to_string(),
                )
            })?;
        if !(1..=365).contains(&session_ttl_days) {
            return Err(ConfigError::Invalid(
                "DAYBOOK_SESSION_TTL_DAYS must be in [1, 365]".to_string(),
            ));
        }

        let retention_days = value_or_default(&lookup, "DAYBOOK_HISTORY_RETENTION_DAYS", "30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "DAYBOOK_HISTORY_RETENTION_DAYS must be an integer in [1, 3650]".to_string(),
                )
            })?;
        if !(1..=3_650).contains(&retention_days) {
            return Err(ConfigError::Invalid(
                "DAYBOOK_HISTORY_RETENTION_DAYS must be in [1, 3650]".to_string(),
            ));
        }

        let secure_cookie = match value_or_default(&lookup, "DAYBOOK_SECURE_COOKIE", "false")
            .to_ascii_lowercase()
            .as_str()
        {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(ConfigError::Invalid(
                    "DAYBOOK_SECURE_COOKIE must be a boolean".to_string(),
                ))
            }
        };

        let rate_limit_window_secs =
            value_or_default(&lookup, "DAYBOOK_RATE_LIMIT_WINDOW_SECS", "60")
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "DAYBOOK_RATE_LIMIT_WINDOW_SECS must be an integer in [10, 3600]"
                            .to_string(),
                    )
                })?;
        if !(10..=3_600).contains(&rate_limit_window_secs) {
            return Err(ConfigError::Invalid(
                "DAYBOOK_RATE_LIMIT_WINDOW_SECS must be in [10, 3600]".to_string(),
            ));
        }

        let login_rate_limit_per_window =
            value_or_default(&lookup, "DAYBOOK_LOGIN_RATE_LIMIT_PER_WINDOW", "10")
                .parse::<u32>()
                .map_err(|_| {
                    ConfigError::Invalid(
                        "DAYBOOK_LOGIN_RATE_LIMIT_PER_WINDOW must be an integer in [1, 1000]"
                            .to_string(),
                    )
                })?;
        if !(1..=1_000).contains(&login_rate_limit_per_window) {
            return Err(ConfigError::Invalid(
                "DAYBOOK_LOGIN_RATE_LIMIT_PER_WINDOW must be in [1, 1000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            password,
            session_secret,
            data_dir,
            session_ttl: Duration::from_secs(session_ttl_days * SECONDS_PER_DAY),
            history_retention: Duration::from_secs(retention_days * SECONDS_PER_DAY),
            secure_cookie,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            login_rate_limit_per_window,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
