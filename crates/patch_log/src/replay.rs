use std::path::Path;

use chat_state::{reduce, ChatState};

use crate::error::PatchLogError;
use crate::schema::LogEntry;
use crate::store::read_log;

/// Rebuilds the chat state recorded in the log at `path`.
pub fn replay(path: &Path) -> Result<ChatState, PatchLogError> {
    let (_, entries) = read_log(path)?;
    Ok(replay_entries(entries))
}

#[must_use]
pub fn replay_entries(entries: impl IntoIterator<Item = LogEntry>) -> ChatState {
    entries
        .into_iter()
        .map(|entry| entry.patch)
        .fold(ChatState::new(), reduce)
}
