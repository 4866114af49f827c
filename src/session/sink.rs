//! Destinations for session log events.
//!
//! ```text
//! Session::append / log_fragment / create_agent
//!           │
//!      ┌────┼────┐
//!      ▼    ▼    ▼
//!   JSONL  Memory  (viewer)
//! ```
//!
//! Every event is written to every sink before its message id is considered used.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{WeaveError, WeaveResult};

use super::event::LogEvent;

/// An output for log events. Must be `Send + Sync` so sessions can move between tasks.
pub trait LogSink: Send + Sync {
    /// Write one event. Must be atomic with respect to concurrent readers.
    fn write(&self, event: &LogEvent) -> WeaveResult<()>;

    fn flush(&self) -> WeaveResult<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonlFileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlFileSink {
    pub fn open(path: impl Into<PathBuf>) -> WeaveResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonlFileSink {
    fn write(&self, event: &LogEvent) -> WeaveResult<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| WeaveError::Session("log writer poisoned".into()))?;
        // One write_all per record so a tailing reader never sees half a line.
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn flush(&self) -> WeaveResult<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| WeaveError::Session("log writer poisoned".into()))?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps events in memory. Useful for viewers and tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn write(&self, event: &LogEvent) -> WeaveResult<()> {
        self.events
            .lock()
            .map_err(|_| WeaveError::Session("memory sink poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::CauseRef;
    use crate::session::event::FragmentRecord;
    use crate::types::MessageId;

    fn fragment(id: u64, content: &str) -> LogEvent {
        LogEvent::Fragment(FragmentRecord {
            message_id: MessageId(id),
            agent: "user".into(),
            content: content.into(),
            cause: CauseRef::User.into(),
        })
    }

    #[test]
    fn file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("s.jsonl");
        let sink = JsonlFileSink::open(&path).unwrap();
        sink.write(&fragment(0, "a")).unwrap();
        sink.write(&fragment(1, "multi\nline")).unwrap();
        sink.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: LogEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second, fragment(1, "multi\nline"));
        assert_eq!(sink.path(), path);
    }

    #[test]
    fn file_sink_reopens_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        JsonlFileSink::open(&path).unwrap().write(&fragment(0, "a")).unwrap();
        JsonlFileSink::open(&path).unwrap().write(&fragment(1, "b")).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn memory_sink_collects() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.write(&fragment(0, "a")).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].message_id(), MessageId(0));
    }
}
