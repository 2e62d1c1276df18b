//! Parameter name validation.
//!
//! A proposed name is normalized (whitespace runs, non-breaking spaces
//! included, collapse to one space; the ends are trimmed) and rejected when
//! empty or when another row of the same parameter list already uses it,
//! ignoring case. An accepted name is backed by a variable slot right away:
//! an existing slot differing only in case is renamed, a missing one is
//! created and remembered as speculative so it can be dropped again when the
//! user keeps typing.

use blockgraph_core::{names_equal, Transaction, VarId};

use crate::error::ProcError;
use crate::workspace::ProcedureWorkspace;

/// Collapses whitespace runs to one space and trims. `None` if nothing is
/// left.
pub fn normalize_param_name(raw: &str) -> Option<String> {
    let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then_some(name)
}

/// `true` if a row other than `index` is named `name`, ignoring case.
pub fn is_duplicate_row<S: AsRef<str>>(rows: &[S], index: usize, name: &str) -> bool {
    rows.iter()
        .enumerate()
        .any(|(i, row)| i != index && names_equal(row.as_ref(), name))
}

impl ProcedureWorkspace {
    /// Validates `proposed` as the name of row `index` of `rows`. Returns
    /// the accepted name, or `None` if rejected. Slots created on the way
    /// are appended to `created`.
    pub(crate) fn validate_param_name<S: AsRef<str>>(
        &mut self,
        rows: &[S],
        index: usize,
        proposed: &str,
        created: &mut Vec<VarId>,
        tx: &mut Transaction,
    ) -> Result<Option<String>, ProcError> {
        let Some(name) = normalize_param_name(proposed) else {
            return Ok(None);
        };
        if is_duplicate_row(rows, index, &name) {
            return Ok(None);
        }

        match self.ws.variables.lookup_by_name(&name, "").cloned() {
            Some(slot) if slot.name != name => {
                self.rename_variable_in(&slot.id, &name, tx)?;
            }
            Some(_) => {}
            None => {
                let slot = self.ws.variables.create(&name, "", None, tx)?;
                created.push(slot.id);
            }
        }
        Ok(Some(name))
    }

    /// Deletes speculative slots that ended up unused: not named `keep` and
    /// not bound by any definition parameter.
    pub(crate) fn discard_speculative(
        &mut self,
        created: Vec<VarId>,
        keep: Option<&str>,
        tx: &mut Transaction,
    ) {
        for id in created {
            let Some(slot) = self.ws.variables.get(&id) else {
                continue;
            };
            if keep == Some(slot.name.as_str()) {
                continue;
            }
            if self.definitions().any(|(_, def)| def.binds_slot(&id)) {
                continue;
            }
            tracing::debug!(var = %id, name = %slot.name, "discarding intermediate variable");
            self.ws.variables.delete(&id, tx);
        }
    }
}
