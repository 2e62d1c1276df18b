//! Core error types for blockgraph-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! the failure modes of the block graph and the variable map.

use crate::block::InputKey;
use crate::id::{BlockId, VarId};
use thiserror::Error;

/// Core errors produced by the blockgraph-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A block id was not found in the workspace.
    #[error("block not found: BlockId({id})", id = id.0)]
    BlockNotFound { id: BlockId },

    /// The block has no input with the given key.
    #[error("block {block} has no input '{key}'")]
    InputNotFound { block: BlockId, key: InputKey },

    /// An input with the same key already exists on the block.
    #[error("block {block} already has an input '{key}'")]
    DuplicateInput { block: BlockId, key: InputKey },

    /// A connection was refused by the shape rules.
    #[error("cannot connect {child} to {parent}: {reason}")]
    ConnectionRefused {
        parent: BlockId,
        child: BlockId,
        reason: String,
    },

    /// A variable id was not found.
    #[error("variable not found: {id}")]
    VariableNotFound { id: VarId },

    /// A variable could not be created.
    #[error("invalid variable '{name}': {reason}")]
    InvalidVariable { name: String, reason: String },

    /// A structural invariant of the graph was violated.
    #[error("graph inconsistency: {reason}")]
    GraphInconsistency { reason: String },
}
