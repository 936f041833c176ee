//! Append-only feedback log (`.playbook/events.jsonl`).

use crate::error::Result;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Helpful,
    NotHelpful,
    HumanConfirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub delta_id: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub human: bool,
}

pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn open(root: &Path) -> Self {
        Self {
            path: paths::events_path(root),
        }
    }

    pub fn append(&self, event: &Event) -> Result<()> {
        io::append_json_line(&self.path, event)
    }

    /// Every parseable event in file order. Missing file reads as empty;
    /// malformed lines are skipped.
    pub fn read_all(&self) -> Vec<Event> {
        let content = match io::read_optional(&self.path) {
            Ok(Some(c)) => c,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "treating event log as empty");
                return Vec::new();
            }
        };
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::debug!(line = n + 1, error = %e, "skipping malformed event");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::tests::at;
    use tempfile::TempDir;

    #[test]
    fn append_and_read() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path());
        log.append(&Event {
            timestamp: at(1),
            delta_id: "d1".to_string(),
            outcome: Outcome::Helpful,
            human: false,
        })
        .unwrap();
        log.append(&Event {
            timestamp: at(2),
            delta_id: "d1".to_string(),
            outcome: Outcome::HumanConfirmed,
            human: true,
        })
        .unwrap();
        let events = log.read_all();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].outcome, Outcome::HumanConfirmed);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::open(dir.path());
        std::fs::create_dir_all(dir.path().join(".playbook")).unwrap();
        std::fs::write(
            dir.path().join(".playbook/events.jsonl"),
            "not json\n\n{\"timestamp\":\"2026-01-02T00:00:00Z\",\"delta_id\":\"d9\",\"outcome\":\"not_helpful\"}\n{\"trunc",
        )
        .unwrap();
        let events = log.read_all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].delta_id, "d9");
        assert!(!events[0].human);
    }

    #[test]
    fn missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(EventLog::open(dir.path()).read_all().is_empty());
    }
}
