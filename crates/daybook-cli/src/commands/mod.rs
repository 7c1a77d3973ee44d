pub mod append;
pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod delete;
pub mod edit;
pub mod history;
pub mod list;
pub mod live;
pub mod settings;
pub mod show;
pub mod write;
