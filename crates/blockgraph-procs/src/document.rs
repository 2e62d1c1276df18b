//! Workspace documents, copy and paste.
//!
//! A [`WorkspaceDocument`] is the JSON save format: the variable list plus
//! one nested [`BlockState`] per top-level block. Procedure blocks carry
//! their shape either as `extraState` (compact form) or as a `mutation` tag
//! tree; both are accepted on load. Blocks of types this layer does not know
//! are kept as opaque blocks with their fields and children intact.
//!
//! Loading is programmatic: call hooks stay quiet, so a document with an
//! orphaned call loads as written. Pasting is a user action and goes through
//! the hooks like any other edit.

use blockgraph_core::{
    Block, BlockId, BlockShape, Input, InputKey, Link, Position, Transaction, VarId,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::ProcError;
use crate::kind::{ProcedureKind, IF_RETURN};
use crate::persist::{
    return_value_from_tree, CallExtraState, DefinitionExtraState, ParsedCall, ParsedDefinition,
    ReturnGuardExtraState, TagNode,
};
use crate::return_guard::ReturnGuardState;
use crate::workspace::{ProcedureBlock, ProcedureWorkspace};

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// Which encoding procedure blocks are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistForm {
    Compact,
    Tree,
}

/// A saved variable slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableState {
    pub name: String,
    pub id: VarId,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

/// A saved block and everything attached below it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockState {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation: Option<TagNode>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, BlockState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Box<BlockState>>,
}

impl BlockState {
    pub fn new(block_type: impl Into<String>) -> Self {
        BlockState {
            block_type: block_type.into(),
            x: None,
            y: None,
            enabled: true,
            fields: IndexMap::new(),
            extra_state: None,
            mutation: None,
            inputs: IndexMap::new(),
            next: None,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.x.unwrap_or_default(), self.y.unwrap_or_default())
    }

    fn invalid(&self, reason: impl Into<String>) -> ProcError {
        ProcError::InvalidState {
            block_type: self.block_type.clone(),
            reason: reason.into(),
        }
    }

    fn extra<T: serde::de::DeserializeOwned>(&self) -> Result<Option<T>, ProcError> {
        self.extra_state
            .clone()
            .map(serde_json::from_value::<T>)
            .transpose()
            .map_err(|err| self.invalid(err.to_string()))
    }
}

/// A saved workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableState>,
    #[serde(default)]
    pub blocks: Vec<BlockState>,
}

impl WorkspaceDocument {
    pub fn from_json(text: &str) -> Result<Self, ProcError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ProcError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl ProcedureWorkspace {
    /// Builds a workspace from a document.
    pub fn from_document(doc: &WorkspaceDocument, config: SyncConfig) -> Result<Self, ProcError> {
        let mut ws = ProcedureWorkspace::new(config);
        ws.load_document(doc)?;
        Ok(ws)
    }

    /// Adds the document's variables and blocks. Returns the new top-level
    /// block ids.
    pub fn load_document(&mut self, doc: &WorkspaceDocument) -> Result<Vec<BlockId>, ProcError> {
        self.programmatic_action("load document", |this, tx| {
            for var in &doc.variables {
                this.ws
                    .variables
                    .resolve_or_create(Some(&var.id), &var.name, &var.kind, tx)?;
            }
            let mut roots = Vec::with_capacity(doc.blocks.len());
            for state in &doc.blocks {
                let root = this.build_block(state, tx)?;
                this.ws.announce_created(root, tx);
                roots.push(root);
            }
            this.bind_unbound_calls();
            this.ws.validate()?;
            tracing::info!(blocks = roots.len(), "document loaded");
            Ok(roots)
        })
    }

    /// Saves every top-level block.
    pub fn save_document(&self, form: PersistForm) -> Result<WorkspaceDocument, ProcError> {
        let variables = self
            .ws
            .variables
            .iter()
            .map(|slot| VariableState {
                name: slot.name.clone(),
                id: slot.id.clone(),
                kind: slot.kind.clone(),
            })
            .collect();
        let blocks = self
            .ws
            .top_blocks()
            .into_iter()
            .map(|id| self.export_block(id, form, true))
            .collect::<Result<_, _>>()?;
        Ok(WorkspaceDocument { variables, blocks })
    }

    /// Copies a block and everything below it.
    pub fn copy_block(&self, id: BlockId, form: PersistForm) -> Result<BlockState, ProcError> {
        self.export_block(id, form, true)
    }

    /// Pastes a copied block tree as a user action. Pasted definitions get
    /// unique names; pasted calls without a definition get one created.
    pub fn paste(&mut self, state: &BlockState) -> Result<BlockId, ProcError> {
        self.user_action("paste", |this, tx| {
            let root = this.build_block(state, tx)?;
            this.ws.announce_created(root, tx);
            Ok(root)
        })
    }

    /// Seeds argument memory of calls that were read before their
    /// definition.
    fn bind_unbound_calls(&mut self) {
        let unbound: Vec<(BlockId, ProcedureKind, String, Vec<String>)> = self
            .procs
            .iter()
            .filter_map(|(&id, block)| match block {
                ProcedureBlock::Call(call) if call.memory.ids().is_none() => {
                    Some((id, call.kind, call.name.clone(), call.arguments.clone()))
                }
                _ => None,
            })
            .collect();
        for (id, kind, name, args) in unbound {
            if let Some(ids) = self.matching_param_ids(kind, &name, &args) {
                if let Ok(call) = self.call_mut(id) {
                    call.memory.bind(ids);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reading blocks
    // -----------------------------------------------------------------------

    /// Builds a block tree without announcing it. Structural events of the
    /// build are not reported; variable creation is.
    fn build_block(&mut self, state: &BlockState, tx: &mut Transaction) -> Result<BlockId, ProcError> {
        let mut structure = Transaction::programmatic();
        let id = self.build_node(state, tx)?;

        if !state.enabled {
            self.ws.set_enabled(id, false, &mut structure)?;
        }
        for (name, child_state) in &state.inputs {
            let child = self.build_block(child_state, tx)?;
            let key = InputKey::from_name(name);
            let has_input = self
                .ws
                .block(id)
                .is_some_and(|block| block.input(&key).is_some());
            if !has_input && !self.procs.contains_key(&id) {
                let child_output = self.ws.block(child).is_some_and(|b| b.shape.output);
                let input = if child_output {
                    Input::value(key.clone(), "")
                } else {
                    Input::statement(key.clone(), "")
                };
                self.ws.append_input(id, input)?;
            }
            self.ws
                .connect(id, Link::Input(key), child, &mut structure)?;
        }
        if let Some(next) = &state.next {
            let child = self.build_block(next, tx)?;
            self.ws.connect(id, Link::Next, child, &mut structure)?;
        }
        Ok(id)
    }

    fn build_node(&mut self, state: &BlockState, tx: &mut Transaction) -> Result<BlockId, ProcError> {
        let position = state.position();
        let block_type = state.block_type.as_str();

        if let Some(kind) = ProcedureKind::from_definition_type(block_type) {
            let parsed = match (state.extra::<DefinitionExtraState>()?, &state.mutation) {
                (Some(extra), _) => ParsedDefinition::from_extra_state(&extra),
                (None, Some(tree)) => ParsedDefinition::from_tree(tree),
                (None, None) => ParsedDefinition::default(),
            };
            let proposed = state.fields.get("NAME").map(String::as_str).unwrap_or_default();
            let name = self.legal_name(proposed.trim(), None);
            let params = self.resolve_params(&parsed.params, tx);
            return self.insert_definition(kind, &name, params, parsed.has_body, position);
        }

        if let Some(kind) = ProcedureKind::from_call_type(block_type) {
            let parsed = match (state.extra::<CallExtraState>()?, &state.mutation) {
                (Some(extra), _) => ParsedCall::from_extra_state(&extra),
                (None, Some(tree)) => ParsedCall::from_tree(tree),
                (None, None) => ParsedCall::default(),
            };
            let name = parsed
                .name
                .clone()
                .or_else(|| state.fields.get("NAME").cloned())
                .ok_or_else(|| state.invalid("call without a procedure name"))?;
            let id = self.insert_call(kind, &name, parsed.arguments.clone(), position)?;
            if let Some(ids) = parsed.param_ids {
                if ids.len() == parsed.arguments.len() {
                    self.call_mut(id)?.memory.bind(ids);
                }
            }
            return Ok(id);
        }

        if block_type == IF_RETURN {
            let has_return_value = match (state.extra::<ReturnGuardExtraState>()?, &state.mutation) {
                (Some(extra), _) => extra.has_return_value,
                (None, Some(tree)) => return_value_from_tree(tree),
                (None, None) => true,
            };
            let guard = ReturnGuardState {
                has_return_value,
                auto_disabled: false,
            };
            return Ok(self.insert_return_guard(guard, position));
        }

        let mut block = Block::new(block_type, BlockShape::opaque()).at(position);
        block.fields = state.fields.clone();
        Ok(self.ws.insert_block(block))
    }

    // -----------------------------------------------------------------------
    // Writing blocks
    // -----------------------------------------------------------------------

    fn export_block(&self, id: BlockId, form: PersistForm, top_level: bool) -> Result<BlockState, ProcError> {
        let block = self
            .ws
            .block(id)
            .ok_or(blockgraph_core::CoreError::BlockNotFound { id })?;
        let mut state = BlockState::new(block.block_type.as_str());
        if top_level {
            state.x = Some(block.position.x);
            state.y = Some(block.position.y);
        }
        state.enabled = block.enabled;
        state.fields = block.fields.clone();

        match (self.procs.get(&id), form) {
            (Some(ProcedureBlock::Definition(def)), form) => {
                state.fields.insert("NAME".into(), def.name.clone());
                match form {
                    PersistForm::Compact => {
                        state.extra_state = def
                            .to_extra_state()
                            .map(serde_json::to_value)
                            .transpose()?;
                    }
                    PersistForm::Tree => state.mutation = Some(def.to_tree(false)),
                }
            }
            (Some(ProcedureBlock::Call(call)), PersistForm::Compact) => {
                state.extra_state = Some(serde_json::to_value(call.to_extra_state())?);
            }
            (Some(ProcedureBlock::Call(call)), PersistForm::Tree) => {
                state.mutation = Some(call.to_tree());
            }
            (Some(ProcedureBlock::ReturnGuard(guard)), PersistForm::Compact) => {
                state.extra_state = Some(serde_json::to_value(guard.to_extra_state())?);
            }
            (Some(ProcedureBlock::ReturnGuard(guard)), PersistForm::Tree) => {
                state.mutation = Some(guard.to_tree());
            }
            (None, _) => {}
        }

        for (link, child) in self.ws.children(id) {
            match link {
                Link::Input(key) => {
                    let child_state = self.export_block(child, form, false)?;
                    state.inputs.insert(key.as_name().into_owned(), child_state);
                }
                Link::Next => {
                    state.next = Some(Box::new(self.export_block(child, form, false)?));
                }
            }
        }
        Ok(state)
    }
}
