//! Saved-exchange store backed by a JSON-lines file.
//!
//! Failures here never interrupt a chat turn; callers log and move on. A
//! missing or unreadable file simply reads as an empty history.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::api::client::BoxError;
use crate::core::message::Message;

/// How many saved exchanges the history browser shows.
pub const RECENT_LIMIT: usize = 50;

/// One persisted exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_message: String,
    pub assistant_response: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub endpoint: String,
    pub created_at: DateTime<Utc>,
}

pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "parley", "parley")
            .map(|dirs| dirs.data_dir().join("history.jsonl"))
    }

    /// Appends one exchange. The assistant side is stored flattened, the
    /// same text the telemetry event carries.
    pub fn save(
        &self,
        user_message: &str,
        messages: &[Message],
        request_id: Option<&str>,
        endpoint: &str,
    ) -> Result<(), BoxError> {
        let entry = HistoryEntry {
            user_message: user_message.to_string(),
            assistant_response: flatten_messages(messages),
            request_id: request_id.map(str::to_string),
            endpoint: endpoint.to_string(),
            created_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        serde_json::to_writer(&mut file, &entry)?;
        writeln!(file)?;
        file.flush()?;
        Ok(())
    }

    /// The most recent exchanges, newest first. Lines that fail to decode
    /// are skipped rather than failing the whole read.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let mut entries: Vec<HistoryEntry> = contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        entries.reverse();
        entries.truncate(limit);
        entries
    }
}

/// Collapses a response's message list into the stored text: content-bearing
/// messages joined by newlines, tool-call shells contributing nothing.
pub fn flatten_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|message| !message.content.is_empty())
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
