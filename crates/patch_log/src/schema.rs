use serde::{Deserialize, Serialize};
use session_patch::Patch;

pub const LOG_VERSION: u32 = 1;

/// First line of every log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHeader {
    pub version: u32,
    pub session_id: String,
    pub created_at: String,
}

impl LogHeader {
    #[must_use]
    pub fn v1(session_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            version: LOG_VERSION,
            session_id: session_id.into(),
            created_at: created_at.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub ts: String,
    pub patch: Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum JsonLine {
    Log(LogHeader),
    Patch(LogEntry),
}
