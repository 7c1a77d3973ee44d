//! Data models for Daybook

mod note;
mod settings;

pub use note::{HistorySnapshot, NotePath, NoteSummary};
pub use settings::{DeviceClass, EditorSettings, Pane, Theme, ViewMode};
