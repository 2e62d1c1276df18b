//! Parameter editor sessions.
//!
//! The editor is a small side panel listing a definition's parameters as
//! rows. Opening it starts an *edit session*: calls of the definition keep
//! the argument blocks of removed parameters in memory, so restoring a
//! parameter before the session ends gives its value back. Each change the
//! user makes in the panel arrives as a new [`EditorTree`] (or a single row
//! rename) and is applied to the definition immediately.

use std::collections::HashMap;

use blockgraph_core::{names_equal, BlockId, CoreError, Transaction, VarId};
use serde::{Deserialize, Serialize};

use crate::definition::Parameter;
use crate::error::ProcError;
use crate::kind::ParamId;
use crate::validator::normalize_param_name;
use crate::workspace::ProcedureWorkspace;

/// One parameter row of the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorRow {
    pub name: String,
    pub param_id: ParamId,
}

/// The editor's view of a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorTree {
    pub rows: Vec<EditorRow>,
    /// Body toggle. Only offered for procedures with a return value.
    pub has_statements: Option<bool>,
}

impl EditorTree {
    pub fn names(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.name.clone()).collect()
    }

    /// Appends a row for a new parameter and returns its id.
    pub fn push(&mut self, name: &str) -> ParamId {
        let param_id = ParamId::generate();
        self.rows.push(EditorRow {
            name: name.to_string(),
            param_id: param_id.clone(),
        });
        param_id
    }

    pub fn remove(&mut self, index: usize) -> Option<EditorRow> {
        (index < self.rows.len()).then(|| self.rows.remove(index))
    }

    /// Moves a row to a new position; out-of-range indices are ignored.
    pub fn move_row(&mut self, from: usize, to: usize) {
        if from < self.rows.len() && to < self.rows.len() {
            let row = self.rows.remove(from);
            self.rows.insert(to, row);
        }
    }
}

/// Result of applying an editor tree.
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// The tree as committed.
    pub tree: EditorTree,
    /// Indices (in the submitted tree) of rows whose name was rejected.
    /// An existing parameter keeps its previous name; a new row is dropped.
    pub rejected: Vec<usize>,
}

/// State of an open parameter editor.
#[derive(Debug, Clone)]
pub struct EditorSession {
    pub(crate) tree: EditorTree,
    /// Slots created while typing, per row.
    pub(crate) created: HashMap<ParamId, Vec<VarId>>,
}

impl EditorSession {
    fn new(tree: EditorTree) -> Self {
        EditorSession {
            tree,
            created: HashMap::new(),
        }
    }

    /// Picks up renamed parameters.
    pub(crate) fn sync_names(&mut self, params: &[Parameter]) {
        for row in &mut self.tree.rows {
            if let Some(param) = params.iter().find(|p| p.id == row.param_id) {
                row.name = param.name.clone();
            }
        }
    }
}

impl ProcedureWorkspace {
    /// `true` while an editor is open for `def`.
    pub fn is_editing(&self, def: BlockId) -> bool {
        self.sessions.contains_key(&def)
    }

    /// The current tree of an open editor.
    pub fn editor_tree(&self, def: BlockId) -> Option<&EditorTree> {
        self.sessions.get(&def).map(|session| &session.tree)
    }

    fn session_mut(&mut self, def: BlockId) -> Result<&mut EditorSession, ProcError> {
        self.sessions
            .get_mut(&def)
            .ok_or(ProcError::NoSession { id: def })
    }

    /// Opens the parameter editor for `def` and returns its initial tree.
    pub fn open_editor(&mut self, def: BlockId) -> Result<EditorTree, ProcError> {
        self.user_action("open parameter editor", |this, tx| {
            if this.sessions.contains_key(&def) {
                return Err(ProcError::SessionAlreadyOpen { id: def });
            }
            let state = this.require_definition(def)?;
            let tree = EditorTree {
                rows: state
                    .params
                    .iter()
                    .map(|p| EditorRow {
                        name: p.name.clone(),
                        param_id: p.id.clone(),
                    })
                    .collect(),
                has_statements: state.kind.returns_value().then_some(state.has_body),
            };
            let name = state.name.clone();
            let names = state.param_names();
            this.sessions.insert(def, EditorSession::new(tree.clone()));

            for call in this.callers(&name) {
                this.reconcile_call(call, &names, None, true, tx)?;
            }
            Ok(tree)
        })
    }

    /// Applies a tree submitted by the editor.
    ///
    /// Every row name is validated against the other rows of `tree`.
    /// Rejected rows are reported in the outcome; the rest is committed to
    /// the definition and its calls.
    pub fn apply_editor(&mut self, def: BlockId, tree: EditorTree) -> Result<EditOutcome, ProcError> {
        self.user_action("edit parameters", |this, tx| {
            let previous = this.session_mut(def)?.tree.clone();
            let mut created = std::mem::take(&mut this.session_mut(def)?.created);
            let result = this.commit_tree(def, &previous, tree, &mut created, tx);
            this.session_mut(def)?.created = created;
            result
        })
    }

    fn commit_tree(
        &mut self,
        def: BlockId,
        previous: &EditorTree,
        tree: EditorTree,
        created: &mut HashMap<ParamId, Vec<VarId>>,
        tx: &mut Transaction,
    ) -> Result<EditOutcome, ProcError> {
        let proposed: Vec<Option<String>> = tree
            .rows
            .iter()
            .map(|row| normalize_param_name(&row.name))
            .collect();

        // Name each row would fall back to if rejected; new rows have none.
        let fallback: Vec<Option<&str>> = tree
            .rows
            .iter()
            .map(|row| {
                previous
                    .rows
                    .iter()
                    .find(|r| r.param_id == row.param_id)
                    .map(|r| r.name.as_str())
            })
            .collect();

        let mut valid: Vec<bool> = proposed
            .iter()
            .enumerate()
            .map(|(i, name)| match name {
                Some(name) => !proposed.iter().enumerate().any(|(j, other)| {
                    j != i && other.as_deref().is_some_and(|o| names_equal(o, name))
                }),
                None => false,
            })
            .collect();

        // A rejected existing row keeps its old name, so any accepted name
        // clashing with it is rejected as well, until nothing changes.
        loop {
            let mut changed = false;
            for i in 0..proposed.len() {
                let Some(name) = proposed[i].as_deref().filter(|_| valid[i]) else {
                    continue;
                };
                let clash = (0..proposed.len()).any(|j| {
                    j != i && !valid[j] && fallback[j].is_some_and(|old| names_equal(old, name))
                });
                if clash {
                    valid[i] = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let mut rejected = Vec::new();
        let mut rows: Vec<EditorRow> = Vec::with_capacity(tree.rows.len());
        for (i, row) in tree.rows.iter().enumerate() {
            let name = if valid[i] {
                proposed[i].as_deref()
            } else {
                rejected.push(i);
                fallback[i]
            };
            if let Some(name) = name {
                rows.push(EditorRow {
                    name: name.to_string(),
                    param_id: row.param_id.clone(),
                });
            }
        }

        let names: Vec<String> = rows.iter().map(|row| row.name.clone()).collect();
        for (i, row) in rows.iter().enumerate() {
            let speculative = created.entry(row.param_id.clone()).or_default();
            if self
                .validate_param_name(&names, i, &row.name, speculative, tx)?
                .is_none()
            {
                return Err(ProcError::DuplicateParameter {
                    name: row.name.clone(),
                });
            }
        }

        let committed = EditorTree {
            rows,
            has_statements: tree.has_statements,
        };
        self.compose(def, &committed, tx)?;
        self.session_mut(def)?.tree = committed.clone();
        Ok(EditOutcome {
            tree: committed,
            rejected,
        })
    }

    /// Writes a validated tree into the definition.
    fn compose(&mut self, def: BlockId, tree: &EditorTree, tx: &mut Transaction) -> Result<(), ProcError> {
        let mut params = Vec::with_capacity(tree.rows.len());
        for row in &tree.rows {
            let slot = self
                .ws
                .variables
                .lookup_by_name(&row.name, "")
                .cloned()
                .ok_or_else(|| CoreError::InvalidVariable {
                    name: row.name.clone(),
                    reason: "no slot backs this parameter".into(),
                })?;
            params.push(Parameter {
                name: slot.name,
                slot: slot.id,
                id: row.param_id.clone(),
            });
        }
        self.set_parameters_in(def, params, tx)?;
        if let Some(has_statements) = tree.has_statements {
            self.toggle_body_in(def, has_statements, tx)?;
        }
        Ok(())
    }

    /// Renames one row of the open editor, as typed. Returns the accepted
    /// name, or `None` (with nothing changed) if it was rejected.
    pub fn rename_param_row(
        &mut self,
        def: BlockId,
        index: usize,
        proposed: &str,
    ) -> Result<Option<String>, ProcError> {
        self.user_action("rename parameter", |this, tx| {
            let mut tree = this.session_mut(def)?.tree.clone();
            let Some(row) = tree.rows.get(index) else {
                return Err(ProcError::RowOutOfRange { index });
            };
            let param_id = row.param_id.clone();
            let names = tree.names();

            let mut created = std::mem::take(&mut this.session_mut(def)?.created);
            let speculative = created.entry(param_id).or_default();
            let accepted = this.validate_param_name(&names, index, proposed, speculative, tx);
            this.session_mut(def)?.created = created;

            let Some(name) = accepted? else {
                return Ok(None);
            };
            tree.rows[index].name = name.clone();
            this.compose(def, &tree, tx)?;
            this.session_mut(def)?.tree = tree;
            Ok(Some(name))
        })
    }

    /// Ends typing in row `index`: slots created for intermediate names are
    /// deleted unless something else uses them.
    pub fn finish_param_edit(&mut self, def: BlockId, index: usize) -> Result<(), ProcError> {
        self.user_action("finish parameter edit", |this, tx| {
            let session = this.session_mut(def)?;
            let Some(row) = session.tree.rows.get(index).cloned() else {
                return Err(ProcError::RowOutOfRange { index });
            };
            let created = session.created.remove(&row.param_id).unwrap_or_default();
            this.discard_speculative(created, Some(&row.name), tx);
            Ok(())
        })
    }

    /// Closes the editor of `def`, ending its edit session.
    pub fn close_editor(&mut self, def: BlockId) -> Result<(), ProcError> {
        self.user_action("close parameter editor", |this, tx| {
            let session = this
                .sessions
                .remove(&def)
                .ok_or(ProcError::NoSession { id: def })?;
            for (param_id, created) in session.created {
                let keep = session
                    .tree
                    .rows
                    .iter()
                    .find(|row| row.param_id == param_id)
                    .map(|row| row.name.as_str());
                this.discard_speculative(created, keep, tx);
            }
            if let Some(state) = this.definition(def) {
                let name = state.name.clone();
                for call in this.callers(&name) {
                    this.call_mut(call)?.memory.reset();
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ProcedureKind;
    use blockgraph_core::{Block, BlockShape, InputKey, Position};

    fn definition(ws: &mut ProcedureWorkspace, params: &[&str]) -> BlockId {
        let def = ws
            .place_definition(ProcedureKind::NoReturn, "f", Position::default())
            .unwrap();
        ws.set_parameter_names(def, params).unwrap();
        def
    }

    #[test]
    fn open_twice_fails() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["x"]);
        let tree = ws.open_editor(def).unwrap();
        assert_eq!(tree.names(), ["x"]);
        assert_eq!(tree.has_statements, None);
        assert!(matches!(
            ws.open_editor(def),
            Err(ProcError::SessionAlreadyOpen { .. })
        ));
    }

    #[test]
    fn returning_procedures_offer_body_toggle() {
        let mut ws = ProcedureWorkspace::default();
        let def = ws
            .place_definition(ProcedureKind::Return, "g", Position::default())
            .unwrap();
        let mut tree = ws.open_editor(def).unwrap();
        assert_eq!(tree.has_statements, Some(true));

        tree.has_statements = Some(false);
        ws.apply_editor(def, tree).unwrap();
        assert!(!ws.definition(def).unwrap().has_body);
    }

    #[test]
    fn apply_adds_and_renames_rows() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["x"]);
        let mut tree = ws.open_editor(def).unwrap();
        tree.rows[0].name = "width".into();
        tree.push("height");

        let outcome = ws.apply_editor(def, tree).unwrap();
        assert!(outcome.rejected.is_empty());
        assert_eq!(ws.definition(def).unwrap().param_names(), ["width", "height"]);
    }

    #[test]
    fn apply_rejects_duplicates() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["a", "b"]);
        let mut tree = ws.open_editor(def).unwrap();
        tree.rows[0].name = "B".into();
        tree.push("  ");

        let outcome = ws.apply_editor(def, tree).unwrap();
        assert_eq!(outcome.rejected, [0, 1, 2]);
        assert_eq!(ws.definition(def).unwrap().param_names(), ["a", "b"]);
        assert_eq!(outcome.tree.names(), ["a", "b"]);
    }

    #[test]
    fn rejected_row_keeps_its_parameter() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["a", "b"]);
        let call = ws.place_call(def, Position::default()).unwrap();
        let value = ws
            .add_plain_block(Block::new("math_number", BlockShape::value()))
            .unwrap();
        ws.connect_input(call, InputKey::Arg(0), value).unwrap();
        let ids = ws.definition(def).unwrap().param_ids();

        let mut tree = ws.open_editor(def).unwrap();
        tree.rows[0].name = "".into();
        tree.rows[1].name = "a".into();
        let outcome = ws.apply_editor(def, tree).unwrap();
        ws.close_editor(def).unwrap();

        assert_eq!(outcome.rejected, [0, 1]);
        let state = ws.definition(def).unwrap();
        assert_eq!(state.param_names(), ["a", "b"]);
        assert_eq!(state.param_ids(), ids);
        assert_eq!(ws.call(call).unwrap().arguments, ["a", "b"]);
        assert_eq!(ws.workspace().target_block(call, &InputKey::Arg(0)), Some(value));
    }

    #[test]
    fn session_restores_removed_argument() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["x", "y"]);
        let call = ws.place_call(def, Position::default()).unwrap();
        let value = ws
            .add_plain_block(Block::new("math_number", BlockShape::value()))
            .unwrap();
        ws.connect_input(call, InputKey::Arg(1), value).unwrap();

        let full = ws.open_editor(def).unwrap();
        let mut without_y = full.clone();
        without_y.remove(1);
        ws.apply_editor(def, without_y).unwrap();
        assert!(ws.workspace().parent(value).is_none());

        ws.apply_editor(def, full).unwrap();
        assert_eq!(ws.workspace().target_block(call, &InputKey::Arg(1)), Some(value));
        ws.close_editor(def).unwrap();
        assert_eq!(ws.call(call).unwrap().memory.held_len(), 0);
    }

    #[test]
    fn typing_leaves_only_final_variable() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &[]);
        let mut tree = ws.open_editor(def).unwrap();
        tree.push("v");
        ws.apply_editor(def, tree).unwrap();

        for partial in ["s", "sp", "spe", "speed"] {
            assert_eq!(
                ws.rename_param_row(def, 0, partial).unwrap().as_deref(),
                Some(partial)
            );
        }
        ws.finish_param_edit(def, 0).unwrap();
        ws.close_editor(def).unwrap();

        let mut names: Vec<_> = ws
            .workspace()
            .variables
            .iter()
            .map(|slot| slot.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, ["speed"]);
        assert_eq!(ws.definition(def).unwrap().param_names(), ["speed"]);
    }

    #[test]
    fn rejected_row_rename_changes_nothing() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["a", "b"]);
        ws.open_editor(def).unwrap();

        assert_eq!(ws.rename_param_row(def, 1, "A").unwrap(), None);
        assert_eq!(ws.definition(def).unwrap().param_names(), ["a", "b"]);
        assert!(matches!(
            ws.rename_param_row(def, 5, "z"),
            Err(ProcError::RowOutOfRange { index: 5 })
        ));
    }

    #[test]
    fn editor_sees_variable_renames() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["x"]);
        ws.open_editor(def).unwrap();
        let slot = ws.definition(def).unwrap().params[0].slot.clone();

        ws.rename_variable(&slot, "xpos").unwrap();
        assert_eq!(ws.editor_tree(def).unwrap().names(), ["xpos"]);
    }

    #[test]
    fn undo_refused_while_editing() {
        let mut ws = ProcedureWorkspace::default();
        let def = definition(&mut ws, &["x"]);
        ws.open_editor(def).unwrap();
        assert!(matches!(ws.undo(), Err(ProcError::SessionsOpen)));
        ws.close_editor(def).unwrap();
        assert!(ws.undo().unwrap());
    }
}
