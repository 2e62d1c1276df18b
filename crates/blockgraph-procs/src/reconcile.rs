//! Argument slot reconciliation.
//!
//! When a signature changes, each call rebuilds its argument inputs while
//! keeping plugged-in value blocks attached to the *parameter* they belonged
//! to rather than the position they happened to occupy. The call remembers
//! which block sat under which [`ParamId`]; after the rebuild every
//! remembered block is plugged into the slot that now carries its id.
//!
//! While a parameter editor is open the memory persists across edits, so a
//! parameter removed and then restored in the same session gets its value
//! back. Outside a session the memory only lives for one reconciliation.

use std::collections::{BTreeMap, HashMap};

use blockgraph_core::{BlockId, Input, InputKey, Transaction};
use serde::{Deserialize, Serialize};

use crate::error::ProcError;
use crate::kind::ParamId;
use crate::workspace::{ProcedureBlock, ProcedureWorkspace};

/// Per-call record of parameter ids and the argument blocks held for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentMemory {
    /// Parameter id of each argument slot, once known.
    ids: Option<Vec<ParamId>>,
    /// Block last seen under each parameter id. `None` records an empty slot.
    held: HashMap<ParamId, Option<BlockId>>,
}

impl ArgumentMemory {
    pub fn ids(&self) -> Option<&[ParamId]> {
        self.ids.as_deref()
    }

    /// The block remembered for `id`: `None` if nothing is recorded,
    /// `Some(None)` if the slot was recorded empty.
    pub fn held(&self, id: &ParamId) -> Option<Option<BlockId>> {
        self.held.get(id).copied()
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Sets the parameter ids of the current slots.
    pub fn bind(&mut self, ids: Vec<ParamId>) {
        self.ids = Some(ids);
    }

    /// Forgets every held block.
    pub fn reset(&mut self) {
        self.held.clear();
    }
}

fn take_memory(
    procs: &mut BTreeMap<BlockId, ProcedureBlock>,
    call: BlockId,
) -> Result<ArgumentMemory, ProcError> {
    match procs.get_mut(&call) {
        Some(ProcedureBlock::Call(state)) => Ok(std::mem::take(&mut state.memory)),
        _ => Err(ProcError::NotACall { id: call }),
    }
}

impl ProcedureWorkspace {
    /// Reshapes `call` to the parameter list `names`/`ids`.
    ///
    /// `ids == None` means an edit session is starting: held blocks are
    /// forgotten and nothing else changes. Names identical to the current
    /// ones only refresh the id memory.
    ///
    /// # Panics
    ///
    /// Panics if `ids` is given and its length differs from `names`.
    pub(crate) fn reconcile_call(
        &mut self,
        call: BlockId,
        names: &[String],
        ids: Option<&[ParamId]>,
        session_open: bool,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        if let Some(ids) = ids {
            assert_eq!(
                ids.len(),
                names.len(),
                "parameter names and ids must have the same length"
            );
        }

        let mut memory = take_memory(&mut self.procs, call)?;
        let result = self.reconcile_with(call, &mut memory, names, ids, session_open, tx);
        self.call_mut(call)?.memory = memory;
        result
    }

    fn reconcile_with(
        &mut self,
        call: BlockId,
        memory: &mut ArgumentMemory,
        names: &[String],
        ids: Option<&[ParamId]>,
        session_open: bool,
        tx: &mut Transaction,
    ) -> Result<(), ProcError> {
        if !session_open {
            memory.held.clear();
        }
        let Some(ids) = ids else {
            memory.held.clear();
            return Ok(());
        };

        let old_names = self.require_call(call)?.arguments.clone();
        if old_names == names {
            memory.ids = Some(ids.to_vec());
            return Ok(());
        }

        // Record what every known parameter holds; unplug blocks whose
        // parameter is gone.
        if let Some(old_ids) = memory.ids.clone() {
            for (i, old_id) in old_ids.iter().enumerate().take(old_names.len()) {
                let child = self.ws.target_block(call, &InputKey::Arg(i));
                memory.held.insert(old_id.clone(), child);
                if let Some(child) = child {
                    if !ids.contains(old_id) {
                        self.ws.disconnect(child, tx)?;
                    }
                }
            }
        }

        // Rebuild the argument inputs.
        self.call_mut(call)?.arguments = names.to_vec();
        for (i, name) in names.iter().enumerate() {
            let key = InputKey::Arg(i);
            let exists = self
                .ws
                .block(call)
                .is_some_and(|block| block.input(&key).is_some());
            if exists {
                self.ws.set_input_label(call, &key, name)?;
            } else {
                self.ws.append_input(call, Input::value(key, name.as_str()))?;
            }
        }
        let mut extra = names.len();
        loop {
            let key = InputKey::Arg(extra);
            let exists = self
                .ws
                .block(call)
                .is_some_and(|block| block.input(&key).is_some());
            if !exists {
                break;
            }
            self.ws.remove_input(call, &key, tx)?;
            extra += 1;
        }
        memory.ids = Some(ids.to_vec());

        // Plug remembered blocks back under their parameter's new slot.
        for (i, id) in ids.iter().enumerate() {
            if let Some(Some(child)) = memory.held.get(id).copied() {
                if !self.ws.reconnect(child, call, &InputKey::Arg(i), tx) {
                    tracing::debug!(%call, param = %id, %child, "dropping held argument");
                    memory.held.remove(id);
                }
            }
        }

        if !session_open {
            memory.held.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ProcedureKind;
    use blockgraph_core::{Block, BlockShape, Position};

    struct Fixture {
        ws: ProcedureWorkspace,
        def: BlockId,
        call: BlockId,
        values: Vec<BlockId>,
    }

    /// A definition with parameters `a, b, c` and one call with a value in
    /// every slot.
    fn fixture() -> Fixture {
        let mut ws = ProcedureWorkspace::default();
        let def = ws
            .place_definition(ProcedureKind::NoReturn, "f", Position::default())
            .unwrap();
        ws.set_parameter_names(def, &["a", "b", "c"]).unwrap();
        let call = ws.place_call(def, Position::default()).unwrap();
        let mut values = Vec::new();
        for i in 0..3 {
            let value = ws
                .add_plain_block(Block::new("math_number", BlockShape::value()))
                .unwrap();
            ws.connect_input(call, InputKey::Arg(i), value).unwrap();
            values.push(value);
        }
        Fixture {
            ws,
            def,
            call,
            values,
        }
    }

    fn slot(ws: &ProcedureWorkspace, call: BlockId, i: usize) -> Option<BlockId> {
        ws.workspace().target_block(call, &InputKey::Arg(i))
    }

    #[test]
    fn reorder_follows_parameters() {
        let mut f = fixture();
        f.ws.set_parameter_names(f.def, &["c", "a", "b"]).unwrap();

        assert_eq!(f.ws.call(f.call).unwrap().arguments, ["c", "a", "b"]);
        assert_eq!(slot(&f.ws, f.call, 0), Some(f.values[2]));
        assert_eq!(slot(&f.ws, f.call, 1), Some(f.values[0]));
        assert_eq!(slot(&f.ws, f.call, 2), Some(f.values[1]));
    }

    #[test]
    fn removed_parameter_frees_its_value() {
        let mut f = fixture();
        f.ws.set_parameter_names(f.def, &["a", "c"]).unwrap();

        assert_eq!(slot(&f.ws, f.call, 0), Some(f.values[0]));
        assert_eq!(slot(&f.ws, f.call, 1), Some(f.values[2]));
        assert!(f.ws.workspace().parent(f.values[1]).is_none());
        assert!(f.ws.workspace().contains(f.values[1]));
        let block = f.ws.workspace().block(f.call).unwrap();
        assert!(block.input(&InputKey::Arg(2)).is_none());
    }

    #[test]
    fn renamed_parameter_keeps_value() {
        let mut f = fixture();
        let slot_b = f.ws.definition(f.def).unwrap().params[1].slot.clone();
        f.ws.rename_variable(&slot_b, "beta").unwrap();

        assert_eq!(f.ws.call(f.call).unwrap().arguments, ["a", "beta", "c"]);
        assert_eq!(slot(&f.ws, f.call, 1), Some(f.values[1]));
        let label = &f.ws.workspace().block(f.call).unwrap().inputs[2].label;
        assert_eq!(label, "beta");
    }

    #[test]
    fn memory_is_cleared_outside_sessions() {
        let mut f = fixture();
        f.ws.set_parameter_names(f.def, &["a"]).unwrap();
        assert_eq!(f.ws.call(f.call).unwrap().memory.held_len(), 0);
    }

    #[test]
    fn unchanged_names_only_refresh_ids() {
        let mut f = fixture();
        let names = f.ws.call(f.call).unwrap().arguments.clone();
        let fresh: Vec<ParamId> = names.iter().map(|_| ParamId::generate()).collect();
        f.ws.reconcile_call_site(f.call, &names, Some(&fresh)).unwrap();

        assert_eq!(f.ws.call(f.call).unwrap().memory.ids(), Some(fresh.as_slice()));
        assert_eq!(slot(&f.ws, f.call, 2), Some(f.values[2]));
    }

    #[test]
    fn unknown_ids_keep_values_in_place() {
        let mut ws = ProcedureWorkspace::default();
        let def = ws
            .place_definition(ProcedureKind::NoReturn, "f", Position::default())
            .unwrap();
        ws.set_parameter_names(def, &["a"]).unwrap();
        let call = ws.place_call(def, Position::default()).unwrap();
        let value = ws
            .add_plain_block(Block::new("math_number", BlockShape::value()))
            .unwrap();
        ws.connect_input(call, InputKey::Arg(0), value).unwrap();

        ws.call_mut(call).unwrap().memory = ArgumentMemory::default();
        let names = vec!["x".to_string(), "y".to_string()];
        let ids = vec![ParamId::generate(), ParamId::generate()];
        ws.reconcile_call_site(call, &names, Some(&ids)).unwrap();

        assert_eq!(slot(&ws, call, 0), Some(value));
        assert_eq!(ws.call(call).unwrap().arguments, names);
    }

    #[test]
    fn entering_session_resets_memory_only() {
        let mut f = fixture();
        let names = f.ws.call(f.call).unwrap().arguments.clone();
        f.ws.reconcile_call_site(f.call, &names, None).unwrap();

        assert_eq!(f.ws.call(f.call).unwrap().memory.held_len(), 0);
        assert_eq!(slot(&f.ws, f.call, 0), Some(f.values[0]));
        assert!(f.ws.call(f.call).unwrap().memory.ids().is_some());
    }
}
