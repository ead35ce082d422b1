//! JSONL persistence for session patches.

mod error;
mod paths;
mod replay;
mod schema;
mod store;

pub use error::PatchLogError;
pub use paths::{log_file_name, log_root, LOG_DIR};
pub use replay::{replay, replay_entries};
pub use schema::{LogEntry, LogHeader, LOG_VERSION};
pub use store::{read_log, PatchLog};
