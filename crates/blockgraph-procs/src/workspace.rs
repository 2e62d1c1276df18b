//! The procedure-aware workspace.
//!
//! [`ProcedureWorkspace`] wraps a core [`Workspace`] and keeps the procedure
//! state of every definition, call and conditional-return block next to it.
//! All public mutations run as *actions*: one transaction, one undo group,
//! followed by reactive dispatch of the fired events to the call and
//! return-guard hooks. A failing action restores the state it started from.

use std::collections::{BTreeMap, HashMap};

use blockgraph_core::{
    BlockId, GroupId, History, HistoryEntry, Link, Origin, Position, Transaction, Workspace,
};
use blockgraph_core::{Event, EventKind, InputKey};
use serde::{Deserialize, Serialize};

use crate::call::CallState;
use crate::config::SyncConfig;
use crate::definition::DefinitionState;
use crate::editor::EditorSession;
use crate::error::ProcError;
use crate::return_guard::ReturnGuardState;

/// Procedure state attached to a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcedureBlock {
    Definition(DefinitionState),
    Call(CallState),
    ReturnGuard(ReturnGuardState),
}

impl ProcedureBlock {
    pub fn as_definition(&self) -> Option<&DefinitionState> {
        match self {
            ProcedureBlock::Definition(def) => Some(def),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&CallState> {
        match self {
            ProcedureBlock::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_return_guard(&self) -> Option<&ReturnGuardState> {
        match self {
            ProcedureBlock::ReturnGuard(guard) => Some(guard),
            _ => None,
        }
    }
}

/// Everything undo/redo swaps.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    ws: Workspace,
    procs: BTreeMap<BlockId, ProcedureBlock>,
}

#[derive(Clone, Copy)]
enum Hook {
    Call,
    ReturnGuard,
}

/// A workspace with procedure definitions, calls and return guards kept in
/// sync.
#[derive(Debug, Clone)]
pub struct ProcedureWorkspace {
    pub(crate) ws: Workspace,
    pub(crate) procs: BTreeMap<BlockId, ProcedureBlock>,
    pub(crate) sessions: HashMap<BlockId, EditorSession>,
    pub(crate) config: SyncConfig,
    history: History<Snapshot>,
    last_events: Vec<Event>,
}

impl Default for ProcedureWorkspace {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl ProcedureWorkspace {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_workspace(Workspace::new(), config)
    }

    /// A palette workspace. Hooks never run in it and names are taken as
    /// given.
    pub fn flyout(config: SyncConfig) -> Self {
        Self::with_workspace(Workspace::flyout(), config)
    }

    fn with_workspace(ws: Workspace, config: SyncConfig) -> Self {
        ProcedureWorkspace {
            ws,
            procs: BTreeMap::new(),
            sessions: HashMap::new(),
            history: History::new(config.history_limit),
            config,
            last_events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn procedure_block(&self, id: BlockId) -> Option<&ProcedureBlock> {
        self.procs.get(&id)
    }

    pub fn definition(&self, id: BlockId) -> Option<&DefinitionState> {
        self.procs.get(&id).and_then(ProcedureBlock::as_definition)
    }

    pub fn call(&self, id: BlockId) -> Option<&CallState> {
        self.procs.get(&id).and_then(ProcedureBlock::as_call)
    }

    pub fn return_guard(&self, id: BlockId) -> Option<&ReturnGuardState> {
        self.procs.get(&id).and_then(ProcedureBlock::as_return_guard)
    }

    /// Events fired by the most recent action, in order.
    pub fn last_events(&self) -> &[Event] {
        &self.last_events
    }

    /// Undo/redo entries, most recent first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.list()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub(crate) fn definition_mut(&mut self, id: BlockId) -> Result<&mut DefinitionState, ProcError> {
        match self.procs.get_mut(&id) {
            Some(ProcedureBlock::Definition(def)) => Ok(def),
            _ => Err(ProcError::NotADefinition { id }),
        }
    }

    pub(crate) fn call_mut(&mut self, id: BlockId) -> Result<&mut CallState, ProcError> {
        match self.procs.get_mut(&id) {
            Some(ProcedureBlock::Call(call)) => Ok(call),
            _ => Err(ProcError::NotACall { id }),
        }
    }

    pub(crate) fn require_definition(&self, id: BlockId) -> Result<&DefinitionState, ProcError> {
        self.definition(id).ok_or(ProcError::NotADefinition { id })
    }

    pub(crate) fn require_call(&self, id: BlockId) -> Result<&CallState, ProcError> {
        self.call(id).ok_or(ProcError::NotACall { id })
    }

    /// Position of the top-level block that contains `id`.
    pub(crate) fn root_position(&self, id: BlockId) -> Position {
        let mut current = id;
        while let Some((parent, _)) = self.ws.parent(current) {
            current = parent;
        }
        self.ws
            .block(current)
            .map(|b| b.position)
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    /// Runs `f` as one undoable user action.
    pub(crate) fn user_action<T>(
        &mut self,
        description: &str,
        f: impl FnOnce(&mut Self, &mut Transaction) -> Result<T, ProcError>,
    ) -> Result<T, ProcError> {
        self.run_action(Origin::User, description, f)
    }

    /// Runs `f` as a programmatic change: hooks see it as non-user and no
    /// history entry is recorded.
    pub(crate) fn programmatic_action<T>(
        &mut self,
        description: &str,
        f: impl FnOnce(&mut Self, &mut Transaction) -> Result<T, ProcError>,
    ) -> Result<T, ProcError> {
        self.run_action(Origin::Programmatic, description, f)
    }

    fn run_action<T>(
        &mut self,
        origin: Origin,
        description: &str,
        f: impl FnOnce(&mut Self, &mut Transaction) -> Result<T, ProcError>,
    ) -> Result<T, ProcError> {
        let before = self.snapshot();
        let sessions_before = self.sessions.clone();
        let group = GroupId::generate();
        let mut tx = Transaction::new(origin);
        tx.begin_group(group.clone());

        let result = f(self, &mut tx).and_then(|value| {
            self.dispatch(&mut tx)?;
            Ok(value)
        });
        tx.end_group();

        match result {
            Ok(value) => {
                if tx.has_undoable() {
                    self.history.record(Some(group), Some(description), before);
                }
                self.last_events = tx.into_events();
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(action = description, error = %err, "action rolled back");
                self.restore(before);
                self.sessions = sessions_before;
                Err(err)
            }
        }
    }

    /// Feeds fired events to the reactive hooks until the transaction is
    /// quiet or the pass limit is hit.
    fn dispatch(&mut self, tx: &mut Transaction) -> Result<(), ProcError> {
        if self.ws.is_flyout() {
            tx.take_undispatched();
            return Ok(());
        }

        for _ in 0..self.config.max_reaction_passes {
            let batch = tx.take_undispatched();
            if batch.is_empty() {
                return Ok(());
            }
            for event in &batch {
                let targets: Vec<(BlockId, Hook)> = self
                    .procs
                    .iter()
                    .filter_map(|(&id, block)| match block {
                        ProcedureBlock::Call(_) => Some((id, Hook::Call)),
                        ProcedureBlock::ReturnGuard(_) => Some((id, Hook::ReturnGuard)),
                        ProcedureBlock::Definition(_) => None,
                    })
                    .collect();
                for (id, hook) in targets {
                    // An earlier hook in this batch may have deleted the block.
                    if !self.procs.contains_key(&id) {
                        continue;
                    }
                    match hook {
                        Hook::Call => self.call_on_event(id, event, tx)?,
                        Hook::ReturnGuard => self.return_guard_on_event(id, event, tx)?,
                    }
                }
            }
        }

        if tx.has_undispatched() {
            let pending = tx.take_undispatched().len();
            tracing::warn!(
                passes = self.config.max_reaction_passes,
                pending,
                "reaction loop cut off"
            );
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            ws: self.ws.clone(),
            procs: self.procs.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.ws = snapshot.ws;
        self.procs = snapshot.procs;
    }

    /// Reverts the most recent undoable action. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool, ProcError> {
        if !self.sessions.is_empty() {
            return Err(ProcError::SessionsOpen);
        }
        let current = self.snapshot();
        match self.history.undo(current) {
            Some((previous, entry)) => {
                tracing::debug!(entry = %entry.id, description = ?entry.description, "undo");
                self.restore(previous);
                self.last_events.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-applies the most recently undone action.
    pub fn redo(&mut self) -> Result<bool, ProcError> {
        if !self.sessions.is_empty() {
            return Err(ProcError::SessionsOpen);
        }
        let current = self.snapshot();
        match self.history.redo(current) {
            Some((next, entry)) => {
                tracing::debug!(entry = %entry.id, description = ?entry.description, "redo");
                self.restore(next);
                self.last_events.clear();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -----------------------------------------------------------------------
    // Generic editing
    // -----------------------------------------------------------------------

    /// Deletes a block and everything attached below it.
    pub fn delete_block(&mut self, id: BlockId) -> Result<Vec<BlockId>, ProcError> {
        self.user_action("delete block", |this, tx| this.delete_tree(id, tx))
    }

    /// Deletes `id` and its descendants, dropping their procedure state and
    /// any editor session of a deleted definition.
    pub(crate) fn delete_tree(
        &mut self,
        id: BlockId,
        tx: &mut Transaction,
    ) -> Result<Vec<BlockId>, ProcError> {
        let doomed = self.ws.delete_block(id, tx)?;
        for victim in &doomed {
            self.procs.remove(victim);
            self.sessions.remove(victim);
        }
        Ok(doomed)
    }

    /// Plugs `child` into `parent` through `link`.
    pub fn connect(&mut self, parent: BlockId, link: Link, child: BlockId) -> Result<(), ProcError> {
        self.user_action("connect", |this, tx| {
            this.ws.connect(parent, link, child, tx)?;
            Ok(())
        })
    }

    /// Plugs `child` into the input `key` of `parent`.
    pub fn connect_input(
        &mut self,
        parent: BlockId,
        key: InputKey,
        child: BlockId,
    ) -> Result<(), ProcError> {
        self.connect(parent, Link::Input(key), child)
    }

    /// Unplugs `child`. Returns its former parent.
    pub fn disconnect(&mut self, child: BlockId) -> Result<Option<BlockId>, ProcError> {
        self.user_action("disconnect", |this, tx| Ok(this.ws.disconnect(child, tx)?))
    }

    pub fn set_enabled(&mut self, id: BlockId, enabled: bool) -> Result<bool, ProcError> {
        let description = if enabled { "enable block" } else { "disable block" };
        self.user_action(description, |this, tx| Ok(this.ws.set_enabled(id, enabled, tx)?))
    }

    pub fn move_block(&mut self, id: BlockId, position: Position) -> Result<(), ProcError> {
        self.user_action("move block", |this, _tx| Ok(this.ws.move_to(id, position)?))
    }

    /// Signals that the user picked up a block.
    pub fn start_drag(&mut self, id: BlockId) -> Result<(), ProcError> {
        if !self.ws.contains(id) {
            return Err(blockgraph_core::CoreError::BlockNotFound { id }.into());
        }
        self.user_action("drag", |_this, tx| {
            // UI-only event: never an undo step of its own.
            tx.suppress();
            tx.fire(EventKind::DragStart { block: id });
            tx.resume();
            Ok(())
        })
    }

    /// Inserts a plain block that carries no procedure state.
    pub fn add_plain_block(&mut self, block: blockgraph_core::Block) -> Result<BlockId, ProcError> {
        self.user_action("create block", |this, tx| Ok(this.ws.add_block(block, tx)))
    }
}
