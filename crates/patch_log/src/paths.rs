use std::path::{Path, PathBuf};

pub const LOG_DIR: [&str; 2] = [".frameflow", "logs"];

#[must_use]
pub fn log_root(cwd: &Path) -> PathBuf {
    cwd.join(LOG_DIR[0]).join(LOG_DIR[1])
}

fn sanitize_timestamp_for_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' => '-',
            _ => c,
        })
        .collect()
}

/// `<created_at>_<session_id>.jsonl`; names sort by creation time.
#[must_use]
pub fn log_file_name(created_at: &str, session_id: &str) -> String {
    format!(
        "{}_{}.jsonl",
        sanitize_timestamp_for_filename(created_at),
        session_id
    )
}
