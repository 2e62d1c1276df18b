//! The variable slot map.
//!
//! A [`VariableSlot`] is a named storage location with an id that survives
//! renames. Names are unique per kind, compared case-insensitively, which is
//! how the editor resolves names typed by the user back to slots.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::events::{EventKind, Transaction};
use crate::id::VarId;

/// A named variable slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSlot {
    pub id: VarId,
    pub name: String,
    /// Type tag; the empty string is the untyped default.
    #[serde(default)]
    pub kind: String,
}

/// Result of [`VariableMap::rename`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The slot already had that exact name.
    Unchanged,
    /// The slot was renamed in place.
    Renamed { old_name: String },
    /// Another slot already owned the name. The renamed slot was deleted and
    /// its users must rebind to `into`.
    Merged { into: VarId, old_name: String },
}

/// All variable slots of a workspace, in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableMap {
    slots: IndexMap<VarId, VariableSlot>,
}

/// Case-insensitive name comparison used for variables and procedures.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableSlot> {
        self.slots.values()
    }

    pub fn get(&self, id: &VarId) -> Option<&VariableSlot> {
        self.slots.get(id)
    }

    /// Finds a slot by name (case-insensitive) and kind.
    pub fn lookup_by_name(&self, name: &str, kind: &str) -> Option<&VariableSlot> {
        self.slots
            .values()
            .find(|slot| slot.kind == kind && names_equal(&slot.name, name))
    }

    /// Creates a slot. Returns the existing slot when one with the same name
    /// and kind exists and `id` does not contradict it.
    pub fn create(
        &mut self,
        name: &str,
        kind: &str,
        id: Option<VarId>,
        tx: &mut Transaction,
    ) -> Result<VariableSlot, CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::InvalidVariable {
                name: name.to_string(),
                reason: "name is empty".into(),
            });
        }
        if let Some(existing) = self.lookup_by_name(name, kind) {
            return match id {
                Some(ref wanted) if wanted != &existing.id => Err(CoreError::InvalidVariable {
                    name: name.to_string(),
                    reason: format!("name is already used by variable {}", existing.id),
                }),
                _ => Ok(existing.clone()),
            };
        }
        if let Some(ref wanted) = id {
            if let Some(existing) = self.slots.get(wanted) {
                return Err(CoreError::InvalidVariable {
                    name: name.to_string(),
                    reason: format!("id {} already names '{}'", wanted, existing.name),
                });
            }
        }

        let slot = VariableSlot {
            id: id.unwrap_or_else(VarId::generate),
            name: name.to_string(),
            kind: kind.to_string(),
        };
        self.slots.insert(slot.id.clone(), slot.clone());
        tx.fire(EventKind::VarCreate {
            var: slot.id.clone(),
            name: slot.name.clone(),
        });
        Ok(slot)
    }

    /// Looks the slot up by id, then by name, and creates it when both miss.
    pub fn resolve_or_create(
        &mut self,
        id: Option<&VarId>,
        name: &str,
        kind: &str,
        tx: &mut Transaction,
    ) -> Result<VariableSlot, CoreError> {
        if let Some(slot) = id.and_then(|id| self.slots.get(id)) {
            return Ok(slot.clone());
        }
        if let Some(slot) = self.lookup_by_name(name, kind) {
            return Ok(slot.clone());
        }
        self.create(name, kind, id.cloned(), tx)
    }

    /// Renames a slot, merging into an existing slot that already owns
    /// `new_name`.
    pub fn rename(
        &mut self,
        id: &VarId,
        new_name: &str,
        tx: &mut Transaction,
    ) -> Result<RenameOutcome, CoreError> {
        let slot = self
            .slots
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::VariableNotFound { id: id.clone() })?;
        if slot.name == new_name {
            return Ok(RenameOutcome::Unchanged);
        }
        if new_name.trim().is_empty() {
            return Err(CoreError::InvalidVariable {
                name: new_name.to_string(),
                reason: "name is empty".into(),
            });
        }

        let conflict = self
            .slots
            .values()
            .find(|other| {
                other.id != *id && other.kind == slot.kind && names_equal(&other.name, new_name)
            })
            .cloned();

        match conflict {
            None => {
                if let Some(entry) = self.slots.get_mut(id) {
                    entry.name = new_name.to_string();
                }
                tx.fire(EventKind::VarRename {
                    var: id.clone(),
                    old_name: slot.name.clone(),
                    new_name: new_name.to_string(),
                });
                Ok(RenameOutcome::Renamed {
                    old_name: slot.name,
                })
            }
            Some(target) => {
                if target.name != new_name {
                    if let Some(entry) = self.slots.get_mut(&target.id) {
                        entry.name = new_name.to_string();
                    }
                    tx.fire(EventKind::VarRename {
                        var: target.id.clone(),
                        old_name: target.name.clone(),
                        new_name: new_name.to_string(),
                    });
                }
                self.delete(id, tx);
                Ok(RenameOutcome::Merged {
                    into: target.id,
                    old_name: slot.name,
                })
            }
        }
    }

    /// Removes a slot. Returns it if it existed.
    pub fn delete(&mut self, id: &VarId, tx: &mut Transaction) -> Option<VariableSlot> {
        let slot = self.slots.shift_remove(id)?;
        tx.fire(EventKind::VarDelete {
            var: slot.id.clone(),
            name: slot.name.clone(),
        });
        Some(slot)
    }
}
