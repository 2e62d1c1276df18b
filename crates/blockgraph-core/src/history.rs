//! Edit history for undo/redo.
//!
//! [`History`] keeps one checkpoint per committed user action: the full state
//! as it was before the action ran, tagged with the action's undo group.
//! Undo swaps the current state for the checkpoint and moves the current
//! state onto the redo stack; a newly committed action clears the redo
//! stack.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::GroupId;

/// Metadata of one undoable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub group: Option<GroupId>,
    pub description: Option<String>,
    pub undone: bool,
}

/// Linear undo/redo over snapshots of type `S`.
#[derive(Debug, Clone)]
pub struct History<S> {
    undo_stack: Vec<(HistoryEntry, S)>,
    redo_stack: Vec<(HistoryEntry, S)>,
    limit: usize,
}

impl<S> History<S> {
    /// Creates a history that keeps at most `limit` undo steps.
    pub fn new(limit: usize) -> Self {
        History {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Records a committed action. `before` is the state prior to it.
    pub fn record(
        &mut self,
        group: Option<GroupId>,
        description: Option<&str>,
        before: S,
    ) -> String {
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            group,
            description: description.map(str::to_string),
            undone: false,
        };
        let id = entry.id.clone();
        self.undo_stack.push((entry, before));
        if self.undo_stack.len() > self.limit {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
        id
    }

    /// Undoes the last action. Returns the state to restore.
    pub fn undo(&mut self, current: S) -> Option<(S, HistoryEntry)> {
        let (mut entry, previous) = self.undo_stack.pop()?;
        entry.undone = true;
        self.redo_stack.push((entry.clone(), current));
        Some((previous, entry))
    }

    /// Redoes the most recently undone action. Returns the state to restore.
    pub fn redo(&mut self, current: S) -> Option<(S, HistoryEntry)> {
        let (mut entry, next) = self.redo_stack.pop()?;
        entry.undone = false;
        self.undo_stack.push((entry.clone(), current));
        Some((next, entry))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// All entries, most recent first; undone entries come before the rest.
    pub fn list(&self) -> Vec<HistoryEntry> {
        self.redo_stack
            .iter()
            .map(|(e, _)| e.clone())
            .chain(self.undo_stack.iter().rev().map(|(e, _)| e.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_redo_swaps_states() {
        let mut history = History::new(10);
        history.record(None, Some("one"), 0);
        history.record(None, Some("two"), 1);

        let (state, entry) = history.undo(2).unwrap();
        assert_eq!(state, 1);
        assert!(entry.undone);
        assert_eq!(entry.description.as_deref(), Some("two"));

        let (state, _) = history.undo(1).unwrap();
        assert_eq!(state, 0);
        assert!(history.undo(0).is_none());

        let (state, entry) = history.redo(0).unwrap();
        assert_eq!(state, 1);
        assert!(!entry.undone);
    }

    #[test]
    fn new_record_clears_redo() {
        let mut history = History::new(10);
        history.record(None, None, 0);
        history.undo(1).unwrap();
        assert!(history.can_redo());
        history.record(None, None, 0);
        assert!(!history.can_redo());
    }

    #[test]
    fn limit_drops_oldest() {
        let mut history = History::new(2);
        history.record(None, Some("a"), 0);
        history.record(None, Some("b"), 1);
        history.record(None, Some("c"), 2);
        let list = history.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].description.as_deref(), Some("c"));
        assert_eq!(list[1].description.as_deref(), Some("b"));
    }
}
