//! Error types for the procedure layer.
//!
//! [`ProcError`] wraps core graph errors and adds the failure modes of the
//! procedure protocol: operations aimed at the wrong kind of block, editor
//! session misuse, malformed persisted state and configuration problems.
//!
//! Rejected user input (an empty or duplicate parameter name) is not an
//! error; the validator reports it as `None`. A parameter id list whose length
//! differs from its name list is a caller bug and panics instead.

use blockgraph_core::{BlockId, CoreError};
use thiserror::Error;

/// Errors produced by procedure operations.
#[derive(Debug, Error)]
pub enum ProcError {
    /// An error from the underlying block graph.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("block {id} is not a procedure definition")]
    NotADefinition { id: BlockId },

    #[error("block {id} is not a procedure call")]
    NotACall { id: BlockId },

    #[error("block {id} is not a conditional return")]
    NotAReturnGuard { id: BlockId },

    #[error("parameter editor already open for definition {id}")]
    SessionAlreadyOpen { id: BlockId },

    #[error("no parameter editor open for definition {id}")]
    NoSession { id: BlockId },

    #[error("parameter editors are open; close them first")]
    SessionsOpen,

    #[error("parameter row {index} does not exist")]
    RowOutOfRange { index: usize },

    /// A parameter list handed to the API names the same parameter twice.
    #[error("duplicate parameter '{name}'")]
    DuplicateParameter { name: String },

    /// Persisted state could not be interpreted.
    #[error("invalid state for '{block_type}': {reason}")]
    InvalidState { block_type: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
