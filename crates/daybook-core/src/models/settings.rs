//! Editor settings document

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

const DESKTOP_FONT_SIZE: u32 = 14;
const MOBILE_FONT_SIZE: u32 = 16;
const DEFAULT_LINE_HEIGHT: f64 = 1.6;
const FONT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 8..=72;
const LINE_HEIGHT_RANGE: std::ops::RangeInclusive<f64> = 1.0..=3.0;

/// Device class the server partitions settings by.
///
/// The server decides this from the request's `User-Agent`; clients only
/// send a hint and never store the class alongside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
}

impl DeviceClass {
    pub fn from_user_agent(user_agent: &str) -> Self {
        if user_agent.contains("Mobile") {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    /// `User-Agent` value that makes the server classify requests as `self`.
    pub fn user_agent_hint(self) -> String {
        let version = env!("CARGO_PKG_VERSION");
        match self {
            Self::Desktop => format!("daybook/{version}"),
            Self::Mobile => format!("daybook/{version} (Mobile)"),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }

    const fn default_font_size(self) -> u32 {
        match self {
            Self::Desktop => DESKTOP_FONT_SIZE,
            Self::Mobile => MOBILE_FONT_SIZE,
        }
    }
}

impl FromStr for DeviceClass {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            other => Err(Error::Validation(format!("unknown device class '{other}'"))),
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// Which panes are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Edit,
    Preview,
    #[default]
    Both,
}

/// Pane a typography option applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Editor,
    Preview,
}

/// Per-device editor configuration.
///
/// Missing fields deserialize to their defaults; options this version does
/// not know about are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorSettings {
    pub editor_font_size: u32,
    pub preview_font_size: u32,
    pub editor_line_height: f64,
    pub preview_line_height: f64,
    pub theme: Theme,
    pub code_theme: String,
    pub view_mode: ViewMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor_width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_width: Option<String>,
    pub default_code_language: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self::defaults_for(DeviceClass::Desktop)
    }
}

impl EditorSettings {
    pub fn defaults_for(device: DeviceClass) -> Self {
        Self {
            editor_font_size: device.default_font_size(),
            preview_font_size: device.default_font_size(),
            editor_line_height: DEFAULT_LINE_HEIGHT,
            preview_line_height: DEFAULT_LINE_HEIGHT,
            theme: Theme::Light,
            code_theme: "github".to_string(),
            view_mode: ViewMode::Both,
            editor_width: None,
            preview_width: None,
            default_code_language: "plaintext".to_string(),
            extra: Map::new(),
        }
    }

    /// Overlay a stored JSON object onto the defaults for `device`.
    pub fn from_stored(device: DeviceClass, stored: Map<String, Value>) -> Result<Self, Error> {
        let Value::Object(mut merged) = serde_json::to_value(Self::defaults_for(device))? else {
            return Err(Error::Parse("settings did not serialize to an object".to_string()));
        };
        for (key, value) in stored {
            if !value.is_null() {
                merged.insert(key, value);
            }
        }
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    pub fn set_font_size(&mut self, pane: Pane, size: u32) -> Result<(), Error> {
        if !FONT_SIZE_RANGE.contains(&size) {
            return Err(Error::Validation(format!(
                "font size must be between {} and {}",
                FONT_SIZE_RANGE.start(),
                FONT_SIZE_RANGE.end()
            )));
        }
        match pane {
            Pane::Editor => self.editor_font_size = size,
            Pane::Preview => self.preview_font_size = size,
        }
        Ok(())
    }

    pub fn set_line_height(&mut self, pane: Pane, height: f64) -> Result<(), Error> {
        if !LINE_HEIGHT_RANGE.contains(&height) {
            return Err(Error::Validation(format!(
                "line height must be between {} and {}",
                LINE_HEIGHT_RANGE.start(),
                LINE_HEIGHT_RANGE.end()
            )));
        }
        match pane {
            Pane::Editor => self.editor_line_height = height,
            Pane::Preview => self.preview_line_height = height,
        }
        Ok(())
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
    }

    /// Divider position for the split view, e.g. `"40%"` / `"60%"`.
    pub fn set_split(&mut self, editor_width: impl Into<String>, preview_width: impl Into<String>) {
        self.editor_width = Some(editor_width.into());
        self.preview_width = Some(preview_width.into());
    }

    /// Set an option by its wire name from a textual value.
    ///
    /// Known options are validated; unknown options are stored as JSON when
    /// the value parses as JSON and as a string otherwise.
    pub fn set_option(&mut self, key: &str, raw: &str) -> Result<(), Error> {
        let raw = raw.trim();
        match key {
            "editorFontSize" => self.set_font_size(Pane::Editor, parse_number(key, raw)?),
            "previewFontSize" => self.set_font_size(Pane::Preview, parse_number(key, raw)?),
            "editorLineHeight" => self.set_line_height(Pane::Editor, parse_number(key, raw)?),
            "previewLineHeight" => self.set_line_height(Pane::Preview, parse_number(key, raw)?),
            "theme" => {
                self.theme = parse_enum(key, raw)?;
                Ok(())
            }
            "viewMode" => {
                self.view_mode = parse_enum(key, raw)?;
                Ok(())
            }
            "codeTheme" => {
                self.code_theme = non_empty(key, raw)?;
                Ok(())
            }
            "defaultCodeLanguage" => {
                self.default_code_language = non_empty(key, raw)?;
                Ok(())
            }
            "editorWidth" => {
                self.editor_width = Some(non_empty(key, raw)?);
                Ok(())
            }
            "previewWidth" => {
                self.preview_width = Some(non_empty(key, raw)?);
                Ok(())
            }
            other => {
                if other.trim().is_empty() {
                    return Err(Error::Validation("option name must not be empty".to_string()));
                }
                let value = serde_json::from_str::<Value>(raw)
                    .unwrap_or_else(|_| Value::String(raw.to_string()));
                self.extra.insert(other.to_string(), value);
                Ok(())
            }
        }
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, Error> {
    raw.parse()
        .map_err(|_| Error::Validation(format!("{key} expects a number, got '{raw}'")))
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T, Error> {
    serde_json::from_value(Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| Error::Validation(format!("unsupported {key} '{raw}'")))
}

fn non_empty(key: &str, raw: &str) -> Result<String, Error> {
    if raw.is_empty() {
        Err(Error::Validation(format!("{key} must not be empty")))
    } else {
        Ok(raw.to_string())
    }
}
