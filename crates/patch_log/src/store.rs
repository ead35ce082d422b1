use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use session_patch::Patch;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::PatchLogError;
use crate::paths::log_file_name;
use crate::schema::{JsonLine, LogEntry, LogHeader, LOG_VERSION};

/// Append-only JSONL log of the patches applied to one session.
///
/// Respond handles are not persisted; patches read back carry `None` in their place.
#[derive(Debug)]
pub struct PatchLog {
    path: PathBuf,
    file: File,
    header: LogHeader,
    last_seq: u64,
}

impl PatchLog {
    /// Creates a fresh log file under `root`, creating the directory if needed.
    pub fn create(root: &Path) -> Result<Self, PatchLogError> {
        fs::create_dir_all(root)
            .map_err(|source| PatchLogError::io("creating log directory", root, source))?;

        let header = LogHeader::v1(Uuid::new_v4().to_string(), now_rfc3339()?);
        let path = root.join(log_file_name(&header.created_at, &header.session_id));
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|source| PatchLogError::io("creating log file", &path, source))?;

        write_line(&mut file, &path, &JsonLine::Log(header.clone()))?;
        debug!(path = %path.display(), session_id = %header.session_id, "patch log created");

        Ok(Self {
            path,
            file,
            header,
            last_seq: 0,
        })
    }

    /// Opens an existing log for appending after validating every line.
    pub fn open(path: &Path) -> Result<Self, PatchLogError> {
        let (header, entries) = read_log(path)?;
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|source| PatchLogError::io("opening log file for append", path, source))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
            last_seq: entries.last().map_or(0, |entry| entry.seq),
        })
    }

    /// Most recently created log under `root`.
    pub fn latest_in(root: &Path) -> Result<PathBuf, PatchLogError> {
        let entries = fs::read_dir(root)
            .map_err(|source| PatchLogError::io("listing log directory", root, source))?;

        let mut latest: Option<PathBuf> = None;
        for entry in entries {
            let path = entry
                .map_err(|source| PatchLogError::io("listing log directory", root, source))?
                .path();
            if path.extension().is_some_and(|ext| ext == "jsonl")
                && latest.as_ref().map_or(true, |current| path > *current)
            {
                latest = Some(path);
            }
        }

        latest.ok_or_else(|| PatchLogError::NoLogsFound {
            root: root.to_path_buf(),
        })
    }

    /// Writes `patch` as the next entry and returns its sequence number.
    pub fn append(&mut self, patch: &Patch) -> Result<u64, PatchLogError> {
        let entry = LogEntry {
            seq: self.last_seq + 1,
            ts: now_rfc3339()?,
            patch: patch.clone(),
        };
        write_line(&mut self.file, &self.path, &JsonLine::Patch(entry))?;
        self.last_seq += 1;
        Ok(self.last_seq)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

/// Reads and validates a whole log file.
pub fn read_log(path: &Path) -> Result<(LogHeader, Vec<LogEntry>), PatchLogError> {
    let file =
        File::open(path).map_err(|source| PatchLogError::io("opening log file", path, source))?;
    let reader = BufReader::new(file);

    let mut header: Option<LogHeader> = None;
    let mut entries: Vec<LogEntry> = Vec::new();

    for (line_index, line_result) in reader.lines().enumerate() {
        let line_number = line_index + 1;
        let line = line_result.map_err(|source| PatchLogError::io_line(path, line_number, source))?;
        let parsed = serde_json::from_str::<JsonLine>(&line)
            .map_err(|source| PatchLogError::json_line(path, line_number, source))?;

        match (line_number, parsed) {
            (1, JsonLine::Log(parsed_header)) => {
                validate_header_line(path, line_number, &parsed_header)?;
                header = Some(parsed_header);
            }
            (1, JsonLine::Patch(_)) => {
                return Err(PatchLogError::InvalidHeaderRecord {
                    path: path.to_path_buf(),
                    line: line_number,
                });
            }
            (_, JsonLine::Log(_)) => {
                return Err(PatchLogError::InvalidEntryRecord {
                    path: path.to_path_buf(),
                    line: line_number,
                });
            }
            (_, JsonLine::Patch(entry)) => {
                validate_rfc3339(path, line_number, "ts", &entry.ts)?;
                let previous = entries.last().map_or(0, |last| last.seq);
                if entry.seq <= previous {
                    return Err(PatchLogError::NonMonotonicSequence {
                        path: path.to_path_buf(),
                        line: line_number,
                        previous,
                        found: entry.seq,
                    });
                }
                entries.push(entry);
            }
        }
    }

    let header = header.ok_or_else(|| PatchLogError::MissingHeader {
        path: path.to_path_buf(),
    })?;
    Ok((header, entries))
}

fn write_line(file: &mut File, path: &Path, line: &JsonLine) -> Result<(), PatchLogError> {
    let mut encoded =
        serde_json::to_string(line).map_err(|source| PatchLogError::json_serialize(path, source))?;
    encoded.push('\n');
    file.write_all(encoded.as_bytes())
        .map_err(|source| PatchLogError::io("appending to log file", path, source))
}

fn now_rfc3339() -> Result<String, PatchLogError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(PatchLogError::ClockFormat)
}

fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &LogHeader,
) -> Result<(), PatchLogError> {
    if header.version != LOG_VERSION {
        return Err(PatchLogError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)
}

fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), PatchLogError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(PatchLogError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}
