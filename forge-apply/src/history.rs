//! Bounded log of applied changes, used for "undo the AI's last change".
//!
//! The log is a FIFO ring ordered by insertion: once it is full the oldest
//! record is dropped, no matter how recently it was looked at. Undo only
//! ever reverts AI-originated records; a user's own edit blocks undo for
//! that file instead of being rolled back.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of records kept per session.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Who produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    Ai,
    User,
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeSource::Ai => write!(f, "ai"),
            ChangeSource::User => write!(f, "user"),
        }
    }
}

/// One applied transition of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub filename: String,
    /// Content before the change. `None` when the change created the file.
    pub old_content: Option<String>,
    /// Content after the change. `None` when the change deleted the file.
    pub new_content: Option<String>,
    pub source: ChangeSource,
    pub timestamp: DateTime<Utc>,
}

/// What undoing a record asks the caller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Write this content back to the file.
    Restore(String),
    /// The change created the file; remove it.
    Remove,
}

#[derive(Debug, Clone)]
pub struct ChangeHistory {
    records: VecDeque<ChangeRecord>,
    capacity: usize,
}

impl ChangeHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// A capacity of 0 is treated as 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one when over capacity.
    pub fn record(
        &mut self,
        filename: impl Into<String>,
        old_content: Option<String>,
        new_content: Option<String>,
        source: ChangeSource,
    ) {
        self.records.push_back(ChangeRecord {
            filename: filename.into(),
            old_content,
            new_content,
            source,
            timestamp: Utc::now(),
        });
        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                tracing::debug!("history: evicted oldest record for {}", evicted.filename);
            }
        }
    }

    /// Newest record for `filename`, if any.
    pub fn last_for(&self, filename: &str) -> Option<&ChangeRecord> {
        self.records.iter().rev().find(|r| r.filename == filename)
    }

    /// What `undo_last` would do for `filename`, leaving the history as is.
    pub fn peek_undo(&self, filename: &str) -> Option<UndoAction> {
        let record = self.last_for(filename).filter(|r| r.source == ChangeSource::Ai)?;
        Some(match &record.old_content {
            Some(content) => UndoAction::Restore(content.clone()),
            None => UndoAction::Remove,
        })
    }

    /// Undo the newest change to `filename` if the AI made it.
    ///
    /// Removes the record and tells the caller how to revert the file.
    /// Returns `None` when there is no record, or when the newest record for
    /// the file came from the user.
    pub fn undo_last(&mut self, filename: &str) -> Option<UndoAction> {
        let idx = self.records.iter().rposition(|r| r.filename == filename)?;
        if self.records[idx].source != ChangeSource::Ai {
            return None;
        }
        let record = self.records.remove(idx)?;
        Some(match record.old_content {
            Some(content) => UndoAction::Restore(content),
            None => UndoAction::Remove,
        })
    }

    /// Records oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ChangeHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ai(history: &mut ChangeHistory, file: &str, old: &str, new: &str) {
        history.record(file, Some(old.into()), Some(new.into()), ChangeSource::Ai);
    }

    #[test]
    fn test_undo_returns_old_content() {
        let mut history = ChangeHistory::new();
        ai(&mut history, "a.rs", "v1", "v2");
        ai(&mut history, "a.rs", "v2", "v3");

        assert_eq!(history.undo_last("a.rs"), Some(UndoAction::Restore("v2".into())));
        assert_eq!(history.undo_last("a.rs"), Some(UndoAction::Restore("v1".into())));
        assert_eq!(history.undo_last("a.rs"), None);
    }

    #[test]
    fn test_undo_only_touches_matching_file() {
        let mut history = ChangeHistory::new();
        ai(&mut history, "a.rs", "a1", "a2");
        ai(&mut history, "b.rs", "b1", "b2");

        assert_eq!(history.undo_last("a.rs"), Some(UndoAction::Restore("a1".into())));
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_for("b.rs").map(|r| r.filename.as_str()), Some("b.rs"));
    }

    #[test]
    fn test_user_change_blocks_undo() {
        let mut history = ChangeHistory::new();
        ai(&mut history, "a.rs", "v1", "v2");
        history.record("a.rs", Some("v2".into()), Some("v2-user".into()), ChangeSource::User);

        assert_eq!(history.undo_last("a.rs"), None);
        // the refused undo leaves the log intact
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_peek_undo_leaves_record() {
        let mut history = ChangeHistory::new();
        ai(&mut history, "a.rs", "v1", "v2");

        assert_eq!(history.peek_undo("a.rs"), Some(UndoAction::Restore("v1".into())));
        assert_eq!(history.len(), 1);
        assert_eq!(history.peek_undo("b.rs"), None);

        history.record("a.rs", Some("v2".into()), Some("v3".into()), ChangeSource::User);
        assert_eq!(history.peek_undo("a.rs"), None);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = ChangeHistory::with_capacity(3);
        for i in 0..5 {
            ai(&mut history, &format!("f{i}.rs"), "old", "new");
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.undo_last("f0.rs"), None);
        assert_eq!(history.undo_last("f1.rs"), None);
        assert!(history.undo_last("f4.rs").is_some());
        let names: Vec<_> = history.records().map(|r| r.filename.clone()).collect();
        assert_eq!(names, vec!["f2.rs", "f3.rs"]);
    }

    #[test]
    fn test_undo_of_creation_removes_file() {
        let mut history = ChangeHistory::new();
        history.record("new.rs", None, Some("fn x() {}".into()), ChangeSource::Ai);
        assert_eq!(history.undo_last("new.rs"), Some(UndoAction::Remove));
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut history = ChangeHistory::with_capacity(0);
        ai(&mut history, "a.rs", "1", "2");
        ai(&mut history, "a.rs", "2", "3");
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.undo_last("a.rs"), Some(UndoAction::Restore("2".into())));
    }
}
