use std::path::PathBuf;

use crate::drafts::{DraftAutosaver, FileDraftSink};
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub drafts: Option<Drafts>,
}

/// Lesson-draft storage for the open workspace.
pub struct Drafts {
    pub store: FileDraftSink,
    pub autosaver: DraftAutosaver,
}
