//! The conditional return block (`if … return …`).
//!
//! It is only legal somewhere inside a procedure definition. After every
//! change it looks up its enclosing definition: outside one it shows a
//! warning and disables itself, inside one it matches its value input to the
//! definition's kind.

use blockgraph_core::{
    Block, BlockId, BlockShape, ChangeElement, Event, EventKind, Input, InputKey, Position,
    Transaction,
};
use serde::{Deserialize, Serialize};

use crate::error::ProcError;
use crate::kind::{ProcedureKind, IF_RETURN};
use crate::workspace::{ProcedureBlock, ProcedureWorkspace};

/// Procedure state of a conditional return block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnGuardState {
    /// Whether the `VALUE` input accepts a block.
    pub has_return_value: bool,
    /// Set while the block is disabled because it sits outside a definition.
    pub auto_disabled: bool,
}

impl Default for ReturnGuardState {
    fn default() -> Self {
        ReturnGuardState {
            has_return_value: true,
            auto_disabled: false,
        }
    }
}

fn value_input(has_return_value: bool) -> Input {
    if has_return_value {
        Input::value(InputKey::Value, "return")
    } else {
        Input::dummy(InputKey::Value, "return")
    }
}

pub(crate) fn return_guard_block(has_return_value: bool, position: Position) -> Block {
    let mut block = Block::new(IF_RETURN, BlockShape::statement())
        .with_input(Input::value(InputKey::Condition, "if"))
        .with_input(value_input(has_return_value))
        .at(position);
    block.tooltip = "If a value is true, then return a second value.".to_string();
    block
}

impl ProcedureWorkspace {
    /// Places a conditional return block.
    pub fn place_return_guard(&mut self, position: Position) -> Result<BlockId, ProcError> {
        self.user_action("create conditional return", |this, tx| {
            let id = this.insert_return_guard(ReturnGuardState::default(), position);
            this.ws.announce_created(id, tx);
            Ok(id)
        })
    }

    pub(crate) fn insert_return_guard(&mut self, state: ReturnGuardState, position: Position) -> BlockId {
        let id = self
            .ws
            .insert_block(return_guard_block(state.has_return_value, position));
        self.procs.insert(id, ProcedureBlock::ReturnGuard(state));
        id
    }

    /// Kind of the nearest definition surrounding `id`, if any.
    pub fn enclosing_definition(&self, id: BlockId) -> Option<(BlockId, ProcedureKind)> {
        let mut current = Some(id);
        while let Some(block) = current {
            if let Some(def) = self.definition(block) {
                return Some((block, def.kind));
            }
            current = self.ws.surround_parent(block);
        }
        None
    }

    pub(crate) fn return_guard_on_event(
        &mut self,
        guard: BlockId,
        event: &Event,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        if matches!(event.kind, EventKind::DragStart { .. }) {
            return Ok(());
        }

        match self.enclosing_definition(guard) {
            Some((_, kind)) => {
                self.set_return_value(guard, kind.returns_value(), tx)?;
                self.ws.set_warning(guard, None)?;
                if self.return_guard_state(guard)?.auto_disabled {
                    self.return_guard_mut(guard)?.auto_disabled = false;
                    self.ws.set_enabled(guard, true, tx)?;
                }
            }
            None => {
                let warning = self.config.return_warning.clone();
                self.ws.set_warning(guard, Some(warning))?;
                if self.ws.is_enabled(guard) && !self.ws.inherited_disabled(guard) {
                    self.return_guard_mut(guard)?.auto_disabled = true;
                    self.ws.set_enabled(guard, false, tx)?;
                }
            }
        }
        Ok(())
    }

    /// Switches the `VALUE` input between a value socket and a bare label.
    /// Does nothing when it already has the requested form.
    fn set_return_value(
        &mut self,
        guard: BlockId,
        has_return_value: bool,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        if self.return_guard_state(guard)?.has_return_value == has_return_value {
            return Ok(());
        }
        let before = self.mutation_text(guard)?;
        self.ws.remove_input(guard, &InputKey::Value, tx)?;
        self.ws.append_input(guard, value_input(has_return_value))?;
        self.return_guard_mut(guard)?.has_return_value = has_return_value;
        let after = self.mutation_text(guard)?;

        tx.suppress();
        tx.fire(EventKind::Change {
            block: guard,
            element: ChangeElement::Mutation,
            old: serde_json::Value::String(before),
            new: serde_json::Value::String(after),
        });
        tx.resume();
        Ok(())
    }

    fn return_guard_state(&self, id: BlockId) -> Result<&ReturnGuardState, ProcError> {
        self.return_guard(id).ok_or(ProcError::NotAReturnGuard { id })
    }

    fn return_guard_mut(&mut self, id: BlockId) -> Result<&mut ReturnGuardState, ProcError> {
        match self.procs.get_mut(&id) {
            Some(ProcedureBlock::ReturnGuard(state)) => Ok(state),
            _ => Err(ProcError::NotAReturnGuard { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_kind(ws: &ProcedureWorkspace, guard: BlockId) -> blockgraph_core::InputKind {
        ws.workspace()
            .block(guard)
            .unwrap()
            .input(&InputKey::Value)
            .unwrap()
            .kind
    }

    #[test]
    fn outside_definition_is_disabled_with_warning() {
        let mut ws = ProcedureWorkspace::default();
        let guard = ws.place_return_guard(Position::default()).unwrap();

        let block = ws.workspace().block(guard).unwrap();
        assert!(!block.enabled);
        assert!(block.warning.is_some());
    }

    #[test]
    fn inside_no_return_definition_drops_value_socket() {
        let mut ws = ProcedureWorkspace::default();
        let def = ws
            .place_definition(ProcedureKind::NoReturn, "f", Position::default())
            .unwrap();
        let guard = ws.place_return_guard(Position::default()).unwrap();
        ws.connect_input(def, InputKey::Stack, guard).unwrap();

        let block = ws.workspace().block(guard).unwrap();
        assert!(block.enabled);
        assert!(block.warning.is_none());
        assert_eq!(value_kind(&ws, guard), blockgraph_core::InputKind::Dummy);
        assert!(!ws.return_guard(guard).unwrap().has_return_value);
    }

    #[test]
    fn inside_return_definition_keeps_value_socket() {
        let mut ws = ProcedureWorkspace::default();
        let def = ws
            .place_definition(ProcedureKind::Return, "f", Position::default())
            .unwrap();
        let guard = ws.place_return_guard(Position::default()).unwrap();
        ws.connect_input(def, InputKey::Stack, guard).unwrap();

        assert_eq!(value_kind(&ws, guard), blockgraph_core::InputKind::Value);
        assert!(ws.workspace().is_enabled(guard));
    }

    #[test]
    fn explicit_disable_inside_definition_sticks() {
        let mut ws = ProcedureWorkspace::default();
        let def = ws
            .place_definition(ProcedureKind::Return, "f", Position::default())
            .unwrap();
        let guard = ws.place_return_guard(Position::default()).unwrap();
        ws.connect_input(def, InputKey::Stack, guard).unwrap();

        ws.set_enabled(guard, false).unwrap();
        assert!(!ws.workspace().is_enabled(guard));
    }

    #[test]
    fn drag_start_is_ignored() {
        let mut ws = ProcedureWorkspace::default();
        let guard = ws.place_return_guard(Position::default()).unwrap();
        ws.ws.set_warning(guard, None).unwrap();

        ws.start_drag(guard).unwrap();
        assert!(ws.workspace().block(guard).unwrap().warning.is_none());
    }
}
