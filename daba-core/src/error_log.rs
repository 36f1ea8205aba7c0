//! Persistent record of failed operations.
//!
//! Every failure seen by the [`OperationExecutor`](crate::executor::OperationExecutor)
//! produces one [`ErrorRecord`], appended to the registry's [`ErrorLog`] as a
//! single line:
//!
//! ```text
//! 2026-10-18 09:14:03,512 - daba.app.users - ERROR - insert_one on app.users failed: Connection error: ...
//! ```
//!
//! Creating, rotating or shipping the file is left to the application.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Severity of an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        })
    }
}

/// One line of the error log.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub severity: Severity,
    pub message: String,
}

impl ErrorRecord {
    /// A record stamped with the current time.
    pub fn now(source: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // One record per line, whatever the message contains
        let message = self.message.replace(['\r', '\n'], " ");

        write!(
            f,
            "{} - {} - {} - {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.source,
            self.severity,
            message,
        )
    }
}

/// A sink for [`ErrorRecord`]s.
pub trait ErrorLog: Send + Sync + fmt::Debug {
    /// Appends one record.
    fn append(&self, record: &ErrorRecord) -> io::Result<()>;
}

/// Appends records to a file, one line each.
///
/// The file and its parent directories are created on first write.
#[derive(Debug, Clone)]
pub struct FileErrorLog {
    path: PathBuf,
}

impl FileErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorLog for FileErrorLog {
    fn append(&self, record: &ErrorRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Single write so concurrent appenders never interleave within a line
        file.write_all(format!("{record}\n").as_bytes())
    }
}

/// Keeps records in memory.
///
/// Clones share the same buffer, so a clone handed to a registry can be
/// inspected from the outside.
#[derive(Debug, Clone, Default)]
pub struct MemoryErrorLog {
    records: Arc<Mutex<Vec<ErrorRecord>>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of every record appended so far.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorLog for MemoryErrorLog {
    fn append(&self, record: &ErrorRecord) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(message: &str) -> ErrorRecord {
        ErrorRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 10, 18, 9, 14, 3).unwrap(),
            source: "daba.app.users".into(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    #[test]
    fn renders_the_line_format() {
        assert_eq!(
            record("insert_one on app.users failed: boom").to_string(),
            "2026-10-18 09:14:03,000 - daba.app.users - ERROR - insert_one on app.users failed: boom"
        );
    }

    #[test]
    fn multi_line_messages_stay_on_one_line() {
        assert!(!record("first\nsecond").to_string().contains('\n'));
    }

    #[test]
    fn file_log_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("error.log");
        let log = FileErrorLog::new(&path);

        log.append(&record("first")).unwrap();
        log.append(&record("second")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - daba.app.users - ERROR - first"));
        assert!(lines[1].ends_with(" - daba.app.users - ERROR - second"));
    }

    #[test]
    fn memory_log_clones_share_records() {
        let log = MemoryErrorLog::new();
        let observer = log.clone();

        log.append(&record("boom")).unwrap();

        assert_eq!(observer.len(), 1);
        assert_eq!(observer.records()[0].message, "boom");
    }
}
