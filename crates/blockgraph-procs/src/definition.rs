//! Procedure definition blocks.
//!
//! A definition owns the canonical signature: its name, the ordered
//! parameters (each bound to a variable slot and carrying a stable
//! [`ParamId`]) and whether it has a statement body. Every signature change
//! is pushed to the call sites bound to the definition's name.

use blockgraph_core::{
    Block, BlockId, BlockShape, ChangeElement, EventKind, Input, InputKey, Link, Position,
    RenameOutcome, Transaction, VarId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProcError;
use crate::kind::{ParamId, ProcedureKind};
use crate::workspace::{ProcedureBlock, ProcedureWorkspace};

/// One parameter of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Display name; follows the bound slot's name.
    pub name: String,
    pub slot: VarId,
    pub id: ParamId,
}

/// Procedure state of a definition block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionState {
    pub kind: ProcedureKind,
    pub name: String,
    pub params: Vec<Parameter>,
    pub has_body: bool,
    /// Body stack detached while the body is toggled off.
    pub stored_body: Option<BlockId>,
}

impl DefinitionState {
    pub fn new(kind: ProcedureKind, name: impl Into<String>) -> Self {
        DefinitionState {
            kind,
            name: name.into(),
            params: Vec::new(),
            has_body: true,
            stored_body: None,
        }
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    pub fn param_ids(&self) -> Vec<ParamId> {
        self.params.iter().map(|p| p.id.clone()).collect()
    }

    /// The header label listing the parameters, e.g. `with: x, y`.
    pub fn params_label(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!("with: {}", self.param_names().join(", "))
        }
    }

    /// `true` if any parameter is bound to `slot`.
    pub fn binds_slot(&self, slot: &VarId) -> bool {
        self.params.iter().any(|p| &p.slot == slot)
    }
}

/// Builds the block shell of a definition.
pub(crate) fn definition_block(kind: ProcedureKind, has_body: bool, position: Position) -> Block {
    let mut block = Block::new(kind.definition_type(), BlockShape::hat())
        .with_input(Input::dummy(InputKey::TopRow, ""))
        .at(position);
    if has_body {
        block = block.with_input(Input::statement(InputKey::Stack, "do"));
    }
    if kind.returns_value() {
        block = block.with_input(Input::value(InputKey::Return, "return"));
    }
    block.tooltip = kind.definition_tooltip().to_string();
    block
}

fn check_unique(params: &[Parameter]) -> Result<(), ProcError> {
    for (i, param) in params.iter().enumerate() {
        let clash = params[..i].iter().any(|earlier| {
            earlier.id == param.id || blockgraph_core::names_equal(&earlier.name, &param.name)
        });
        if clash {
            return Err(ProcError::DuplicateParameter {
                name: param.name.clone(),
            });
        }
    }
    Ok(())
}

impl ProcedureWorkspace {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Places a new definition with no parameters. The name is made unique.
    pub fn place_definition(
        &mut self,
        kind: ProcedureKind,
        name: &str,
        position: Position,
    ) -> Result<BlockId, ProcError> {
        self.user_action("create definition", |this, tx| {
            let legal = this.legal_name(name.trim(), None);
            this.create_definition(kind, &legal, Vec::new(), true, position, tx)
        })
    }

    /// Inserts a definition without announcing it. `name` is used as given.
    pub(crate) fn insert_definition(
        &mut self,
        kind: ProcedureKind,
        name: &str,
        params: Vec<Parameter>,
        has_body: bool,
        position: Position,
    ) -> Result<BlockId, ProcError> {
        check_unique(&params)?;
        let id = self.ws.insert_block(definition_block(kind, has_body, position));
        let state = DefinitionState {
            kind,
            name: name.to_string(),
            params,
            has_body,
            stored_body: None,
        };
        self.ws.set_input_label(id, &InputKey::TopRow, &state.params_label())?;
        self.procs.insert(id, ProcedureBlock::Definition(state));
        Ok(id)
    }

    /// Inserts a definition and fires its `Create` event.
    pub(crate) fn create_definition(
        &mut self,
        kind: ProcedureKind,
        name: &str,
        params: Vec<Parameter>,
        has_body: bool,
        position: Position,
        tx: &mut Transaction,
    ) -> Result<BlockId, ProcError> {
        let id = self.insert_definition(kind, name, params, has_body, position)?;
        self.ws.announce_created(id, tx);
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Rename
    // -----------------------------------------------------------------------

    /// Renames a definition and every call bound to it. Returns the name
    /// actually taken, which differs from `proposed` when that was in use.
    pub fn rename_definition(&mut self, def: BlockId, proposed: &str) -> Result<String, ProcError> {
        self.user_action("rename procedure", |this, tx| {
            this.rename_definition_in(def, proposed, tx)
        })
    }

    pub(crate) fn rename_definition_in(
        &mut self,
        def: BlockId,
        proposed: &str,
        tx: &mut Transaction,
    ) -> Result<String, ProcError> {
        let old = self.require_definition(def)?.name.clone();
        let legal = self.legal_name(proposed.trim(), Some(def));
        if legal == old {
            return Ok(legal);
        }

        self.definition_mut(def)?.name = legal.clone();
        tx.fire(EventKind::Change {
            block: def,
            element: ChangeElement::Field("NAME".into()),
            old: Value::String(old.clone()),
            new: Value::String(legal.clone()),
        });
        for call in self.callers(&old) {
            self.rename_call_in(call, &old, &legal, tx)?;
        }
        tracing::debug!(%def, from = %old, to = %legal, "procedure renamed");
        Ok(legal)
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    /// Replaces the parameter list. Each parameter takes its slot's current
    /// name; call sites are reconciled by parameter id.
    pub fn set_parameters(&mut self, def: BlockId, params: Vec<Parameter>) -> Result<(), ProcError> {
        self.user_action("set parameters", |this, tx| {
            let mut resolved = Vec::with_capacity(params.len());
            for mut param in params {
                let slot = this
                    .ws
                    .variables
                    .get(&param.slot)
                    .ok_or_else(|| blockgraph_core::CoreError::VariableNotFound {
                        id: param.slot.clone(),
                    })?;
                param.name = slot.name.clone();
                resolved.push(param);
            }
            this.set_parameters_in(def, resolved, tx)
        })
    }

    /// Replaces the parameter list by names, creating slots as needed.
    /// Parameters already bound to a named slot keep their id.
    pub fn set_parameter_names<S: AsRef<str>>(
        &mut self,
        def: BlockId,
        names: &[S],
    ) -> Result<(), ProcError> {
        self.user_action("set parameters", |this, tx| {
            let existing = this.require_definition(def)?.params.clone();
            let mut params = Vec::with_capacity(names.len());
            for name in names {
                let slot = this
                    .ws
                    .variables
                    .resolve_or_create(None, name.as_ref(), "", tx)?;
                let id = existing
                    .iter()
                    .find(|p| p.slot == slot.id)
                    .map(|p| p.id.clone())
                    .unwrap_or_else(ParamId::generate);
                params.push(Parameter {
                    name: slot.name,
                    slot: slot.id,
                    id,
                });
            }
            this.set_parameters_in(def, params, tx)
        })
    }

    pub(crate) fn set_parameters_in(
        &mut self,
        def: BlockId,
        params: Vec<Parameter>,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        check_unique(&params)?;
        let before = self.mutation_text(def)?;
        self.definition_mut(def)?.params = params;
        self.refresh_params_label(def, tx)?;
        self.mutate_callers(def, tx)?;
        self.fire_mutation(def, before, tx)
    }

    /// Updates the `with: x, y` label. The change is display-only and not
    /// undoable on its own.
    pub(crate) fn refresh_params_label(
        &mut self,
        def: BlockId,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        let label = self.require_definition(def)?.params_label();
        let old = self
            .ws
            .block(def)
            .and_then(|b| b.input(&InputKey::TopRow))
            .map(|input| input.label.clone())
            .unwrap_or_default();
        if self.ws.set_input_label(def, &InputKey::TopRow, &label)? {
            tx.suppress();
            tx.fire(EventKind::Change {
                block: def,
                element: ChangeElement::Field("PARAMS".into()),
                old: Value::String(old),
                new: Value::String(label),
            });
            tx.resume();
        }
        Ok(())
    }

    /// Brings every call bound to `def` in line with its parameters.
    pub(crate) fn mutate_callers(
        &mut self,
        def: BlockId,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        let state = self.require_definition(def)?;
        let name = state.name.clone();
        let names = state.param_names();
        let ids = state.param_ids();
        let session_open = self.sessions.contains_key(&def);

        for call in self.callers(&name) {
            let before = self.mutation_text(call)?;
            self.reconcile_call(call, &names, Some(&ids), session_open, tx)?;
            let after = self.mutation_text(call)?;
            if before != after {
                tx.suppress();
                tx.fire(EventKind::Change {
                    block: call,
                    element: ChangeElement::Mutation,
                    old: Value::String(before),
                    new: Value::String(after),
                });
                tx.resume();
            }
        }
        Ok(())
    }

    /// Fires a mutation change for `id` if its mutation differs from
    /// `before`.
    pub(crate) fn fire_mutation(
        &mut self,
        id: BlockId,
        before: String,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        let after = self.mutation_text(id)?;
        if before != after {
            tx.fire(EventKind::Change {
                block: id,
                element: ChangeElement::Mutation,
                old: Value::String(before),
                new: Value::String(after),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Body toggle
    // -----------------------------------------------------------------------

    /// Shows or hides the statement body. A hidden body is detached and
    /// remembered; showing it again plugs it back if it is still free.
    pub fn toggle_body(&mut self, def: BlockId, present: bool) -> Result<(), ProcError> {
        let description = if present { "show body" } else { "hide body" };
        self.user_action(description, |this, tx| this.toggle_body_in(def, present, tx))
    }

    pub(crate) fn toggle_body_in(
        &mut self,
        def: BlockId,
        present: bool,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        if self.require_definition(def)?.has_body == present {
            return Ok(());
        }
        let before = self.mutation_text(def)?;

        if present {
            self.ws
                .insert_input(def, 1, Input::statement(InputKey::Stack, "do"))?;
            if let Some(body) = self.definition_mut(def)?.stored_body.take() {
                let free = self.ws.contains(body) && self.ws.parent(body).is_none();
                if free {
                    self.ws.connect(def, Link::Input(InputKey::Stack), body, tx)?;
                }
            }
        } else {
            let body = self.ws.remove_input(def, &InputKey::Stack, tx)?;
            self.definition_mut(def)?.stored_body = body;
        }
        self.definition_mut(def)?.has_body = present;
        self.fire_mutation(def, before, tx)
    }

    // -----------------------------------------------------------------------
    // Variable slot changes
    // -----------------------------------------------------------------------

    /// Renames a variable slot and updates every parameter bound to it.
    /// Renaming onto another slot's name merges the two slots.
    pub fn rename_variable(
        &mut self,
        var: &VarId,
        new_name: &str,
    ) -> Result<RenameOutcome, ProcError> {
        self.user_action("rename variable", |this, tx| {
            this.rename_variable_in(var, new_name, tx)
        })
    }

    pub(crate) fn rename_variable_in(
        &mut self,
        var: &VarId,
        new_name: &str,
        tx: &mut Transaction,
    ) -> Result<RenameOutcome, ProcError> {
        let outcome = self.ws.variables.rename(var, new_name, tx)?;
        match &outcome {
            RenameOutcome::Unchanged => {}
            RenameOutcome::Renamed { .. } => self.on_slot_renamed(var, new_name, tx)?,
            RenameOutcome::Merged { into, .. } => {
                let merged_name = self
                    .ws
                    .variables
                    .get(into)
                    .map(|slot| slot.name.clone())
                    .unwrap_or_else(|| new_name.to_string());
                self.on_slot_replaced(var, into, tx)?;
                self.on_slot_renamed(into, &merged_name, tx)?;
            }
        }
        Ok(outcome)
    }

    /// Updates parameters bound to `slot` after it was renamed, then their
    /// calls and any open parameter editor.
    pub(crate) fn on_slot_renamed(
        &mut self,
        slot: &VarId,
        new_name: &str,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        let mut touched = Vec::new();
        for (&id, block) in self.procs.iter_mut() {
            let ProcedureBlock::Definition(def) = block else {
                continue;
            };
            let mut changed = false;
            for param in def.params.iter_mut().filter(|p| &p.slot == slot) {
                if param.name != new_name {
                    param.name = new_name.to_string();
                    changed = true;
                }
            }
            if changed {
                touched.push(id);
            }
        }
        self.propagate_param_changes(&touched, tx)
    }

    /// Rebinds parameters from `old` to `new` after two slots were merged.
    pub(crate) fn on_slot_replaced(
        &mut self,
        old: &VarId,
        new: &VarId,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        let new_name = self
            .ws
            .variables
            .get(new)
            .map(|slot| slot.name.clone())
            .ok_or_else(|| blockgraph_core::CoreError::VariableNotFound { id: new.clone() })?;
        let mut touched = Vec::new();
        for (&id, block) in self.procs.iter_mut() {
            let ProcedureBlock::Definition(def) = block else {
                continue;
            };
            let mut changed = false;
            for param in def.params.iter_mut().filter(|p| &p.slot == old) {
                param.slot = new.clone();
                param.name = new_name.clone();
                changed = true;
            }
            if changed {
                touched.push(id);
            }
        }
        self.propagate_param_changes(&touched, tx)
    }

    fn propagate_param_changes(
        &mut self,
        defs: &[BlockId],
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        for &def in defs {
            self.refresh_params_label(def, tx)?;
            self.mutate_callers(def, tx)?;
            let params = self.require_definition(def)?.params.clone();
            if let Some(session) = self.sessions.get_mut(&def) {
                session.sync_names(&params);
            }
        }
        Ok(())
    }
}
