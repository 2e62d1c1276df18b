//! Change notifications and explicit transactions.
//!
//! Every workspace mutation takes a `&mut Transaction` and fires its
//! [`Event`]s into it. The transaction carries the state an editor would
//! otherwise keep in globals: the current undo group, whether the edit came
//! from the user, and whether undo recording is suppressed. Reactive hooks
//! pull undispatched events back out with
//! [`take_undispatched`](Transaction::take_undispatched); anything they fire
//! lands in the same transaction and therefore the same group.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{BlockId, GroupId, VarId};

/// Which property of a block changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeElement {
    /// Enabled/disabled state. Values are booleans meaning "disabled".
    Disabled,
    /// A named field, e.g. `NAME`.
    Field(String),
    /// The block's mutation (shape-defining extra state).
    Mutation,
}

/// Kind-specific payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// A block tree was created. `ids` lists the root first, then descendants.
    Create { ids: SmallVec<[BlockId; 4]> },
    /// A block tree was deleted. `ids` lists the root first, then descendants.
    Delete { ids: SmallVec<[BlockId; 4]> },
    /// A block was plugged in or unplugged.
    Move {
        block: BlockId,
        old_parent: Option<BlockId>,
        new_parent: Option<BlockId>,
    },
    /// A block property changed.
    Change {
        block: BlockId,
        element: ChangeElement,
        old: serde_json::Value,
        new: serde_json::Value,
    },
    /// The user picked up a block and started dragging it.
    DragStart { block: BlockId },
    VarCreate { var: VarId, name: String },
    VarRename {
        var: VarId,
        old_name: String,
        new_name: String,
    },
    VarDelete { var: VarId, name: String },
}

/// A fired change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Undo group the event belongs to.
    pub group: Option<GroupId>,
    /// `true` only for genuine, undoable user edits.
    pub record_undo: bool,
}

impl Event {
    /// Returns the block this event is about, for single-block events.
    pub fn block(&self) -> Option<BlockId> {
        match &self.kind {
            EventKind::Move { block, .. }
            | EventKind::Change { block, .. }
            | EventKind::DragStart { block } => Some(*block),
            EventKind::Create { ids } | EventKind::Delete { ids } => ids.first().copied(),
            _ => None,
        }
    }
}

/// Where a transaction's edits come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Interactive edits; eligible for undo and for reactive hooks.
    User,
    /// Loading, replaying or API-driven edits; never recorded for undo.
    Programmatic,
}

/// Explicit transaction context passed to every mutation.
#[derive(Debug, Clone)]
pub struct Transaction {
    origin: Origin,
    groups: Vec<GroupId>,
    suppress_depth: u32,
    events: Vec<Event>,
    dispatched: usize,
}

impl Transaction {
    pub fn new(origin: Origin) -> Self {
        Transaction {
            origin,
            groups: Vec::new(),
            suppress_depth: 0,
            events: Vec::new(),
            dispatched: 0,
        }
    }

    pub fn user() -> Self {
        Self::new(Origin::User)
    }

    pub fn programmatic() -> Self {
        Self::new(Origin::Programmatic)
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Opens a (possibly nested) undo group.
    pub fn begin_group(&mut self, id: GroupId) {
        self.groups.push(id);
    }

    /// Closes the innermost undo group.
    pub fn end_group(&mut self) {
        self.groups.pop();
    }

    /// The innermost open group, if any.
    pub fn group(&self) -> Option<&GroupId> {
        self.groups.last()
    }

    /// Stops recording undo for subsequently fired events until [`resume`](Self::resume).
    pub fn suppress(&mut self) {
        self.suppress_depth += 1;
    }

    pub fn resume(&mut self) {
        self.suppress_depth = self.suppress_depth.saturating_sub(1);
    }

    /// Whether events fired right now are undoable user edits.
    pub fn records_undo(&self) -> bool {
        self.origin == Origin::User && self.suppress_depth == 0
    }

    /// Fires an event tagged with the current group and undo flag.
    pub fn fire(&mut self, kind: EventKind) {
        let event = Event {
            kind,
            group: self.group().cloned(),
            record_undo: self.records_undo(),
        };
        tracing::trace!(kind = ?event.kind, record_undo = event.record_undo, "event");
        self.events.push(event);
    }

    /// All events fired so far, in order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns the events fired since the previous call and marks them
    /// dispatched.
    pub fn take_undispatched(&mut self) -> Vec<Event> {
        let batch = self.events[self.dispatched..].to_vec();
        self.dispatched = self.events.len();
        batch
    }

    /// Returns `true` if any event still waits for dispatch.
    pub fn has_undispatched(&self) -> bool {
        self.dispatched < self.events.len()
    }

    /// Returns `true` if at least one event is an undoable user edit.
    pub fn has_undoable(&self) -> bool {
        self.events.iter().any(|e| e.record_undo)
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
