//! Signature registry queries: lookup by name, legal names, callers and the
//! palette.
//!
//! Procedure names are compared case-insensitively everywhere. Lookups cover
//! every definition in the workspace, disabled ones included; a palette
//! workspace has no lookup scope at all.

use blockgraph_core::{names_equal, BlockId};
use serde::{Deserialize, Serialize};

use crate::definition::DefinitionState;
use crate::document::BlockState;
use crate::kind::{ProcedureKind, IF_RETURN};
use crate::persist::CallExtraState;
use crate::workspace::{ProcedureBlock, ProcedureWorkspace};

/// One procedure as listed by [`ProcedureWorkspace::all_procedures`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureSummary {
    pub definition: BlockId,
    pub name: String,
    pub parameters: Vec<String>,
    pub returns_value: bool,
}

/// A broken link between a call and its definition, or a misplaced
/// conditional return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Inconsistency {
    /// A call whose procedure does not exist.
    OrphanCall { call: BlockId, name: String },
    /// A call whose arguments differ from its definition's parameters.
    SignatureMismatch {
        call: BlockId,
        name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    /// A conditional return outside any definition.
    MisplacedReturn { block: BlockId },
}

/// Returns the next candidate in the `foo`, `foo2`, `foo3` sequence: a
/// trailing number is incremented, otherwise `2` is appended.
pub fn next_candidate(name: &str) -> String {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let digits = &name[prefix.len()..];
    match digits.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
        Some(n) if !digits.is_empty() => format!("{}{}", prefix, n),
        _ => format!("{}2", name),
    }
}

impl ProcedureWorkspace {
    /// All definitions in id order. Empty for a palette workspace.
    pub fn definitions(&self) -> impl Iterator<Item = (BlockId, &DefinitionState)> + '_ {
        let flyout = self.ws.is_flyout();
        self.procs
            .iter()
            .filter(move |_| !flyout)
            .filter_map(|(&id, block)| block.as_definition().map(|def| (id, def)))
    }

    /// Finds the definition named `name`, ignoring case.
    pub fn find_definition(&self, name: &str) -> Option<BlockId> {
        self.definitions()
            .find(|(_, def)| names_equal(&def.name, name))
            .map(|(id, _)| id)
    }

    /// `true` if a definition other than `exclude` is named `name`.
    pub fn is_name_used(&self, name: &str, exclude: Option<BlockId>) -> bool {
        self.definitions()
            .any(|(id, def)| Some(id) != exclude && names_equal(&def.name, name))
    }

    /// Returns `proposed` if no other definition uses it, else the first free
    /// name in the `foo2`, `foo3` sequence. An empty proposal becomes the
    /// configured unnamed name. A palette takes names as given.
    pub fn legal_name(&self, proposed: &str, exclude: Option<BlockId>) -> String {
        if self.ws.is_flyout() {
            return proposed.to_string();
        }
        let mut name = if proposed.is_empty() {
            self.config.unnamed_name.clone()
        } else {
            proposed.to_string()
        };
        while self.is_name_used(&name, exclude) {
            name = next_candidate(&name);
        }
        name
    }

    /// Calls bound to `name`, in id order.
    pub fn callers(&self, name: &str) -> Vec<BlockId> {
        self.procs
            .iter()
            .filter_map(|(&id, block)| match block {
                ProcedureBlock::Call(call) if names_equal(&call.name, name) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Lists procedures without and with a return value, each sorted by name
    /// ignoring case.
    pub fn all_procedures(&self) -> (Vec<ProcedureSummary>, Vec<ProcedureSummary>) {
        let mut no_return = Vec::new();
        let mut with_return = Vec::new();
        for (id, def) in self.definitions() {
            let summary = ProcedureSummary {
                definition: id,
                name: def.name.clone(),
                parameters: def.param_names(),
                returns_value: def.kind.returns_value(),
            };
            match def.kind {
                ProcedureKind::NoReturn => no_return.push(summary),
                ProcedureKind::Return => with_return.push(summary),
            }
        }
        let by_name = |a: &ProcedureSummary, b: &ProcedureSummary| {
            a.name.to_lowercase().cmp(&b.name.to_lowercase())
        };
        no_return.sort_by(by_name);
        with_return.sort_by(by_name);
        (no_return, with_return)
    }

    /// Lists every call without a definition, every call whose arguments
    /// disagree with its definition, and every conditional return outside
    /// a definition.
    pub fn check_consistency(&self) -> Vec<Inconsistency> {
        let mut problems = Vec::new();
        for (&id, block) in &self.procs {
            match block {
                ProcedureBlock::Call(call) => match self.find_definition(&call.name) {
                    None => problems.push(Inconsistency::OrphanCall {
                        call: id,
                        name: call.name.clone(),
                    }),
                    Some(def) => {
                        let expected = self
                            .definition(def)
                            .map(DefinitionState::param_names)
                            .unwrap_or_default();
                        if expected != call.arguments {
                            problems.push(Inconsistency::SignatureMismatch {
                                call: id,
                                name: call.name.clone(),
                                expected,
                                found: call.arguments.clone(),
                            });
                        }
                    }
                },
                ProcedureBlock::ReturnGuard(_) if self.enclosing_definition(id).is_none() => {
                    problems.push(Inconsistency::MisplacedReturn { block: id });
                }
                _ => {}
            }
        }
        problems
    }

    /// Block templates a palette offers: both definition kinds, the
    /// conditional return when any returning procedure exists, then one call
    /// per procedure.
    pub fn palette(&self) -> Vec<BlockState> {
        let mut blocks = Vec::new();
        for kind in [ProcedureKind::NoReturn, ProcedureKind::Return] {
            let mut template = BlockState::new(kind.definition_type());
            template
                .fields
                .insert("NAME".into(), self.config.template_name.clone());
            blocks.push(template);
        }

        let (no_return, with_return) = self.all_procedures();
        if !with_return.is_empty() {
            blocks.push(BlockState::new(IF_RETURN));
        }
        for (kind, list) in [
            (ProcedureKind::NoReturn, no_return),
            (ProcedureKind::Return, with_return),
        ] {
            for summary in list {
                let mut call = BlockState::new(kind.call_type());
                let extra = CallExtraState {
                    name: summary.name,
                    params: (!summary.parameters.is_empty()).then_some(summary.parameters),
                };
                call.extra_state = serde_json::to_value(extra).ok();
                blocks.push(call);
            }
        }
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockgraph_core::Position;

    fn define(ws: &mut ProcedureWorkspace, kind: ProcedureKind, name: &str) -> BlockId {
        ws.place_definition(kind, name, Position::default()).unwrap()
    }

    #[test]
    fn candidate_sequence() {
        assert_eq!(next_candidate("foo"), "foo2");
        assert_eq!(next_candidate("foo2"), "foo3");
        assert_eq!(next_candidate("bar7"), "bar8");
        assert_eq!(next_candidate("x99"), "x100");
        assert_eq!(next_candidate("7"), "8");
    }

    #[test]
    fn candidate_with_huge_number_appends() {
        let name = "n99999999999999999999999";
        assert_eq!(next_candidate(name), format!("{}2", name));
    }

    #[test]
    fn find_is_case_insensitive() {
        let mut ws = ProcedureWorkspace::default();
        let def = define(&mut ws, ProcedureKind::NoReturn, "DoThing");
        assert_eq!(ws.find_definition("dothing"), Some(def));
        assert_eq!(ws.find_definition("other"), None);
    }

    #[test]
    fn legal_name_skips_taken_names() {
        let mut ws = ProcedureWorkspace::default();
        define(&mut ws, ProcedureKind::NoReturn, "foo");
        define(&mut ws, ProcedureKind::Return, "foo2");
        assert_eq!(ws.legal_name("foo", None), "foo3");
        assert_eq!(ws.legal_name("FOO", None), "FOO3");
        assert_eq!(ws.legal_name("bar", None), "bar");
    }

    #[test]
    fn legal_name_excludes_self() {
        let mut ws = ProcedureWorkspace::default();
        let def = define(&mut ws, ProcedureKind::NoReturn, "foo");
        assert_eq!(ws.legal_name("foo", Some(def)), "foo");
    }

    #[test]
    fn empty_name_becomes_unnamed() {
        let ws = ProcedureWorkspace::default();
        assert_eq!(ws.legal_name("", None), "unnamed");
    }

    #[test]
    fn flyout_keeps_proposal() {
        let ws = ProcedureWorkspace::flyout(Default::default());
        assert_eq!(ws.legal_name("", None), "");
    }

    #[test]
    fn procedures_sorted_by_kind_and_name() {
        let mut ws = ProcedureWorkspace::default();
        define(&mut ws, ProcedureKind::NoReturn, "beta");
        define(&mut ws, ProcedureKind::NoReturn, "Alpha");
        define(&mut ws, ProcedureKind::Return, "gamma");

        let (no_return, with_return) = ws.all_procedures();
        let names: Vec<_> = no_return.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "beta"]);
        assert_eq!(with_return.len(), 1);
        assert!(with_return[0].returns_value);
    }

    #[test]
    fn consistency_report() {
        let mut ws = ProcedureWorkspace::default();
        let def = define(&mut ws, ProcedureKind::NoReturn, "f");
        ws.place_call(def, Position::default()).unwrap();
        assert!(ws.check_consistency().is_empty());

        ws.place_return_guard(Position::default()).unwrap();
        let problems = ws.check_consistency();
        assert_eq!(problems.len(), 1);
        assert!(matches!(problems[0], Inconsistency::MisplacedReturn { .. }));
    }

    #[test]
    fn palette_lists_calls() {
        let mut ws = ProcedureWorkspace::default();
        let def = define(&mut ws, ProcedureKind::Return, "area");
        ws.set_parameter_names(def, &["w", "h"]).unwrap();

        let palette = ws.palette();
        let types: Vec<_> = palette.iter().map(|b| b.block_type.as_str()).collect();
        assert_eq!(
            types,
            [
                "procedures_defnoreturn",
                "procedures_defreturn",
                "procedures_ifreturn",
                "procedures_callreturn"
            ]
        );
        let extra = palette[3].extra_state.as_ref().unwrap();
        assert_eq!(extra["name"], "area");
        assert_eq!(extra["params"], serde_json::json!(["w", "h"]));
    }
}
