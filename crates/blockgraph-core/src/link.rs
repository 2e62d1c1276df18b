//! Edge weights of the workspace graph.
//!
//! Edges point from a parent block to a child block. A child has at most one
//! incoming edge; a parent input holds at most one child.

use serde::{Deserialize, Serialize};

use crate::block::InputKey;

/// How a child block is attached to its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    /// The child is plugged into the parent's input with this key.
    Input(InputKey),
    /// The child follows the parent in a statement stack.
    Next,
}

impl Link {
    /// Returns the input key for input links.
    pub fn input_key(&self) -> Option<&InputKey> {
        match self {
            Link::Input(key) => Some(key),
            Link::Next => None,
        }
    }

    /// Returns `true` if this link chains statements.
    pub fn is_next(&self) -> bool {
        matches!(self, Link::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_link_exposes_key() {
        let link = Link::Input(InputKey::Stack);
        assert_eq!(link.input_key(), Some(&InputKey::Stack));
        assert!(!link.is_next());
    }

    #[test]
    fn next_link_has_no_key() {
        assert!(Link::Next.input_key().is_none());
        assert!(Link::Next.is_next());
    }
}
