//! Stable ID newtypes for workspace entities.
//!
//! Block ids are allocated monotonically by the [`Workspace`](crate::Workspace)
//! and never reused, so a remembered `BlockId` either names the block it was
//! taken from or nothing at all. Variable and group ids are opaque strings.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

/// Stable identifier of a variable slot, independent of its display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub String);

/// Identifier of a logical undo transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl VarId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        VarId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl GroupId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        GroupId(Uuid::new_v4().simple().to_string())
    }
}

impl From<&str> for VarId {
    fn from(s: &str) -> Self {
        VarId(s.to_string())
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_display() {
        assert_eq!(format!("{}", BlockId(7)), "7");
    }

    #[test]
    fn var_id_display() {
        assert_eq!(format!("{}", VarId::from("v1")), "v1");
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(VarId::generate(), VarId::generate());
        assert_ne!(GroupId::generate(), GroupId::generate());
    }

    #[test]
    fn block_ids_order_by_allocation() {
        assert!(BlockId(1) < BlockId(2));
    }

    #[test]
    fn serde_roundtrip() {
        let block = BlockId(42);
        let json = serde_json::to_string(&block).unwrap();
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);

        let var = VarId::from("abc");
        let json = serde_json::to_string(&var).unwrap();
        assert_eq!(json, "\"abc\"");
        let back: VarId = serde_json::from_str(&json).unwrap();
        assert_eq!(var, back);
    }
}
