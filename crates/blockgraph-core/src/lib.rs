//! Headless block graph for a drag-and-drop programming editor.
//!
//! # Modules
//!
//! - [`id`]: typed identifiers for blocks, variables and event groups
//! - [`error`]: `CoreError` with all failure modes of the graph layer
//! - [`block`]: block payloads, inputs and connection shape
//! - [`link`]: edge weights of the block graph (input plug or next chain)
//! - [`workspace`]: the `Workspace` container and its mutation methods
//! - [`variables`]: the variable slot map
//! - [`events`]: change notifications and explicit transactions
//! - [`history`]: snapshot-based undo/redo

pub mod block;
pub mod error;
pub mod events;
pub mod history;
pub mod id;
pub mod link;
pub mod variables;
pub mod workspace;

// Re-export commonly used types
pub use block::{Block, BlockShape, Input, InputKey, InputKind, Position};
pub use error::CoreError;
pub use events::{ChangeElement, Event, EventKind, Origin, Transaction};
pub use history::{History, HistoryEntry};
pub use id::{BlockId, GroupId, VarId};
pub use link::Link;
pub use variables::{names_equal, RenameOutcome, VariableMap, VariableSlot};
pub use workspace::Workspace;
