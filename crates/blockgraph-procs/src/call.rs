//! Procedure call blocks and their reactive hooks.
//!
//! A call caches the name and parameter names of the definition it is bound
//! to and has one value input per parameter. The hooks keep the binding
//! alive without user involvement: a call whose definition is missing when
//! it is created gets one synthesized, a call whose definition is deleted is
//! deleted too, and a call mirrors its definition's enabled state.

use blockgraph_core::{
    names_equal, Block, BlockId, BlockShape, ChangeElement, Event, EventKind, Input, InputKey,
    Position, Transaction,
};
use serde::{Deserialize, Serialize};

use crate::definition::Parameter;
use crate::error::ProcError;
use crate::kind::{ParamId, ProcedureKind};
use crate::reconcile::ArgumentMemory;
use crate::workspace::{ProcedureBlock, ProcedureWorkspace};

/// Procedure state of a call block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallState {
    pub kind: ProcedureKind,
    pub name: String,
    /// Parameter names, one value input each.
    pub arguments: Vec<String>,
    pub memory: ArgumentMemory,
    /// Own enabled state from before the definition disabled this call.
    pub previous_enabled: bool,
}

impl CallState {
    pub fn new(kind: ProcedureKind, name: impl Into<String>, arguments: Vec<String>) -> Self {
        CallState {
            kind,
            name: name.into(),
            arguments,
            memory: ArgumentMemory::default(),
            previous_enabled: true,
        }
    }
}

/// Builds the block shell of a call with one value input per argument.
pub(crate) fn call_block(
    kind: ProcedureKind,
    name: &str,
    arguments: &[String],
    position: Position,
) -> Block {
    let shape = if kind.returns_value() {
        BlockShape::value()
    } else {
        BlockShape::statement()
    };
    let mut block = Block::new(kind.call_type(), shape)
        .with_input(Input::dummy(InputKey::TopRow, name))
        .at(position);
    for (i, arg) in arguments.iter().enumerate() {
        block = block.with_input(Input::value(InputKey::Arg(i), arg.as_str()));
    }
    block.tooltip = kind.call_tooltip(name);
    block
}

impl ProcedureWorkspace {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Places a call bound to `def`.
    pub fn place_call(&mut self, def: BlockId, position: Position) -> Result<BlockId, ProcError> {
        let state = self.require_definition(def)?;
        let kind = state.kind;
        let name = state.name.clone();
        let args = state.param_names();
        self.user_action("create call", |this, tx| {
            let call = this.insert_call(kind, &name, args, position)?;
            this.ws.announce_created(call, tx);
            Ok(call)
        })
    }

    /// Places a call by name and argument list, as a paste of a call from
    /// elsewhere would. A missing definition is synthesized by the creation
    /// hook.
    pub fn place_orphan_call<S: AsRef<str>>(
        &mut self,
        kind: ProcedureKind,
        name: &str,
        arguments: &[S],
        position: Position,
    ) -> Result<BlockId, ProcError> {
        let args: Vec<String> = arguments.iter().map(|a| a.as_ref().to_string()).collect();
        self.user_action("create call", |this, tx| {
            let call = this.insert_call(kind, name, args, position)?;
            this.ws.announce_created(call, tx);
            Ok(call)
        })
    }

    /// Inserts a call without announcing it. When a matching definition
    /// exists, the call's argument memory is seeded with its parameter ids.
    pub(crate) fn insert_call(
        &mut self,
        kind: ProcedureKind,
        name: &str,
        arguments: Vec<String>,
        position: Position,
    ) -> Result<BlockId, ProcError> {
        let id = self
            .ws
            .insert_block(call_block(kind, name, &arguments, position));
        let mut state = CallState::new(kind, name, arguments);
        if let Some(ids) = self.matching_param_ids(kind, name, &state.arguments) {
            state.memory.bind(ids);
        }
        self.procs.insert(id, ProcedureBlock::Call(state));
        Ok(id)
    }

    /// Parameter ids of the definition matching name, kind and argument
    /// names, if there is one.
    pub(crate) fn matching_param_ids(
        &self,
        kind: ProcedureKind,
        name: &str,
        arguments: &[String],
    ) -> Option<Vec<ParamId>> {
        let def = self.definition(self.find_definition(name)?)?;
        (def.kind == kind && def.param_names() == arguments).then(|| def.param_ids())
    }

    // -----------------------------------------------------------------------
    // Rename and reconcile
    // -----------------------------------------------------------------------

    /// Moves a call from `old` to `new` if it is currently bound to `old`.
    pub(crate) fn rename_call_in(
        &mut self,
        call: BlockId,
        old: &str,
        new: &str,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        let state = self.call_mut(call)?;
        if !names_equal(old, &state.name) {
            return Ok(());
        }
        let previous = std::mem::replace(&mut state.name, new.to_string());
        let kind = state.kind;
        self.ws.set_input_label(call, &InputKey::TopRow, new)?;
        self.ws.set_tooltip(call, kind.call_tooltip(new))?;
        tx.fire(EventKind::Change {
            block: call,
            element: ChangeElement::Field("NAME".into()),
            old: serde_json::Value::String(previous),
            new: serde_json::Value::String(new.to_string()),
        });
        Ok(())
    }

    /// Reconciles a call against an explicit parameter list.
    ///
    /// `ids == None` announces an edit session: the argument memory is reset
    /// and the shape is left alone.
    ///
    /// # Panics
    ///
    /// Panics if `ids` is given and its length differs from `names`.
    pub fn reconcile_call_site(
        &mut self,
        call: BlockId,
        names: &[String],
        ids: Option<&[ParamId]>,
    ) -> Result<(), ProcError> {
        let bound = self.require_call(call)?.name.clone();
        let session_open = self
            .find_definition(&bound)
            .is_some_and(|def| self.sessions.contains_key(&def));
        self.user_action("update call", |this, tx| {
            this.reconcile_call(call, names, ids, session_open, tx)
        })
    }

    // -----------------------------------------------------------------------
    // Reactive hooks
    // -----------------------------------------------------------------------

    pub(crate) fn call_on_event(
        &mut self,
        call: BlockId,
        event: &Event,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        if self.ws.is_flyout() || !event.record_undo {
            return Ok(());
        }
        match &event.kind {
            EventKind::Create { ids } if ids.contains(&call) => {
                self.ensure_definition_for(call, tx)
            }
            EventKind::Delete { .. } => {
                let name = self.require_call(call)?.name.clone();
                if self.find_definition(&name).is_none() {
                    tracing::info!(%call, procedure = %name, "deleting call to removed procedure");
                    self.delete_tree(call, tx)?;
                }
                Ok(())
            }
            EventKind::Change {
                block,
                element: ChangeElement::Disabled,
                new,
                ..
            } => {
                let name = self.require_call(call)?.name.clone();
                if self.find_definition(&name) != Some(*block) {
                    return Ok(());
                }
                if new.as_bool().unwrap_or(false) {
                    let own = self.ws.is_enabled(call);
                    self.call_mut(call)?.previous_enabled = own;
                    self.ws.set_enabled(call, false, tx)?;
                } else {
                    let restore = self.require_call(call)?.previous_enabled;
                    self.ws.set_enabled(call, restore, tx)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Synthesizes a definition for a freshly created call that has no
    /// matching one.
    fn ensure_definition_for(
        &mut self,
        call: BlockId,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        let state = self.require_call(call)?;
        let kind = state.kind;
        let name = state.name.clone();
        let args = state.arguments.clone();

        if let Some(ids) = self.matching_param_ids(kind, &name, &args) {
            self.call_mut(call)?.memory.bind(ids);
            return Ok(());
        }

        let legal = self.legal_name(&name, None);
        let dx = if self.config.rtl {
            -self.config.snap_radius
        } else {
            self.config.snap_radius
        };
        let position = self
            .root_position(call)
            .offset(dx, 2.0 * self.config.snap_radius);

        let mut params: Vec<Parameter> = Vec::with_capacity(args.len());
        for arg in &args {
            match self.ws.variables.resolve_or_create(None, arg, "", tx) {
                Ok(slot) if params.iter().all(|p| p.slot != slot.id) => params.push(Parameter {
                    name: slot.name,
                    slot: slot.id,
                    id: ParamId::generate(),
                }),
                Ok(_) => tracing::warn!(%call, argument = %arg, "skipping repeated argument"),
                Err(err) => {
                    tracing::warn!(%call, argument = %arg, error = %err, "skipping argument")
                }
            }
        }

        let def = self.create_definition(kind, &legal, params, true, position, tx)?;
        tracing::info!(%call, %def, procedure = %legal, "created definition for orphaned call");
        if legal != name {
            self.rename_call_in(call, &name, &legal, tx)?;
        }
        self.mutate_callers(def, tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defined(ws: &mut ProcedureWorkspace, name: &str, params: &[&str]) -> BlockId {
        let def = ws
            .place_definition(ProcedureKind::NoReturn, name, Position::default())
            .unwrap();
        ws.set_parameter_names(def, params).unwrap();
        def
    }

    #[test]
    fn placed_call_mirrors_definition() {
        let mut ws = ProcedureWorkspace::default();
        let def = defined(&mut ws, "draw", &["x", "y"]);
        let call = ws.place_call(def, Position::new(0.0, 100.0)).unwrap();

        let state = ws.call(call).unwrap();
        assert_eq!(state.name, "draw");
        assert_eq!(state.arguments, ["x", "y"]);
        assert_eq!(
            state.memory.ids(),
            Some(ws.definition(def).unwrap().param_ids().as_slice())
        );
        let block = ws.workspace().block(call).unwrap();
        assert_eq!(block.inputs.len(), 3);
        assert_eq!(block.tooltip, "Run the user-defined function 'draw'.");
    }

    #[test]
    fn rename_rehomes_calls() {
        let mut ws = ProcedureWorkspace::default();
        let def = defined(&mut ws, "draw", &[]);
        let call = ws.place_call(def, Position::default()).unwrap();

        ws.rename_definition(def, "paint").unwrap();
        assert_eq!(ws.call(call).unwrap().name, "paint");
        assert_eq!(
            ws.workspace().block(call).unwrap().inputs[0].label,
            "paint"
        );
    }

    #[test]
    fn orphan_call_synthesizes_definition() {
        let mut ws = ProcedureWorkspace::default();
        let call = ws
            .place_orphan_call(ProcedureKind::Return, "area", &["w", "h"], Position::new(10.0, 20.0))
            .unwrap();

        let def = ws.find_definition("area").unwrap();
        let state = ws.definition(def).unwrap();
        assert_eq!(state.kind, ProcedureKind::Return);
        assert_eq!(state.param_names(), ["w", "h"]);
        assert_eq!(
            ws.workspace().block(def).unwrap().position,
            Position::new(38.0, 76.0)
        );
        assert_eq!(ws.call(call).unwrap().memory.ids().unwrap().len(), 2);
    }

    #[test]
    fn orphan_with_taken_name_adopts_legal_name() {
        let mut ws = ProcedureWorkspace::default();
        defined(&mut ws, "foo", &["a"]);
        let call = ws
            .place_orphan_call(ProcedureKind::NoReturn, "foo", &["b"], Position::default())
            .unwrap();

        assert_eq!(ws.call(call).unwrap().name, "foo2");
        let def = ws.find_definition("foo2").unwrap();
        assert_eq!(ws.definition(def).unwrap().param_names(), ["b"]);
    }

    #[test]
    fn rtl_mirrors_offset() {
        let config = crate::SyncConfig {
            rtl: true,
            ..Default::default()
        };
        let mut ws = ProcedureWorkspace::new(config);
        ws.place_orphan_call::<&str>(ProcedureKind::NoReturn, "go", &[], Position::new(100.0, 0.0))
            .unwrap();
        let def = ws.find_definition("go").unwrap();
        assert_eq!(ws.workspace().block(def).unwrap().position, Position::new(72.0, 56.0));
    }

    #[test]
    fn deleting_definition_deletes_calls() {
        let mut ws = ProcedureWorkspace::default();
        let def = defined(&mut ws, "draw", &[]);
        let a = ws.place_call(def, Position::default()).unwrap();
        let b = ws.place_call(def, Position::default()).unwrap();

        ws.delete_block(def).unwrap();
        assert!(ws.call(a).is_none());
        assert!(ws.call(b).is_none());
        assert!(!ws.workspace().contains(a));
    }

    #[test]
    fn calls_mirror_definition_enabled_state() {
        let mut ws = ProcedureWorkspace::default();
        let def = defined(&mut ws, "draw", &[]);
        let own_disabled = ws.place_call(def, Position::default()).unwrap();
        let plain = ws.place_call(def, Position::default()).unwrap();
        ws.set_enabled(own_disabled, false).unwrap();

        ws.set_enabled(def, false).unwrap();
        assert!(!ws.workspace().is_enabled(plain));
        assert!(!ws.workspace().is_enabled(own_disabled));

        ws.set_enabled(def, true).unwrap();
        assert!(ws.workspace().is_enabled(plain));
        assert!(!ws.workspace().is_enabled(own_disabled));
    }

    #[test]
    #[should_panic(expected = "same length")]
    fn mismatched_ids_panic() {
        let mut ws = ProcedureWorkspace::default();
        let def = defined(&mut ws, "draw", &["x"]);
        let call = ws.place_call(def, Position::default()).unwrap();
        let _ = ws.reconcile_call_site(call, &["x".to_string()], Some(&[]));
    }
}
