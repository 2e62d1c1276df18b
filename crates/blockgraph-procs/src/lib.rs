//! Procedure definitions, calls and conditional returns for a block editor,
//! with their signatures kept in sync.
//!
//! A procedure is declared by a definition block and invoked by call blocks
//! that mirror its name and parameter list. Every edit to a definition
//! (rename, parameter changes from the parameter editor, variable renames)
//! is pushed to its calls, which rebuild their argument inputs while keeping
//! plugged-in values attached to the parameter they belong to. Calls also
//! react to workspace events: an orphaned call gets a definition synthesized,
//! a call whose definition is deleted is deleted with it, and calls mirror
//! their definition's enabled state.
//!
//! # Modules
//!
//! - [`workspace`]: `ProcedureWorkspace`, actions, event dispatch and undo
//! - [`kind`]: procedure kinds, block type names and `ParamId`
//! - [`registry`]: lookup by name, legal names, callers, palette, consistency
//! - [`definition`]: definition state and operations
//! - [`call`]: call state, operations and reactive hooks
//! - [`reconcile`]: id-keyed argument slot reconciliation
//! - [`validator`]: parameter name validation
//! - [`editor`]: parameter editor sessions
//! - [`return_guard`]: the conditional return block
//! - [`persist`]: tree form, compact form and signatures
//! - [`document`]: workspace documents, copy and paste
//! - [`config`]: `SyncConfig`
//! - [`error`]: `ProcError`

pub mod call;
pub mod config;
pub mod definition;
pub mod document;
pub mod editor;
pub mod error;
pub mod kind;
pub mod persist;
pub mod reconcile;
pub mod registry;
pub mod return_guard;
pub mod validator;
pub mod workspace;

pub use call::CallState;
pub use config::SyncConfig;
pub use definition::{DefinitionState, Parameter};
pub use document::{BlockState, PersistForm, VariableState, WorkspaceDocument};
pub use editor::{EditOutcome, EditorRow, EditorTree};
pub use error::ProcError;
pub use kind::{ParamId, ProcedureKind};
pub use persist::{Signature, SignatureParam, TagNode};
pub use reconcile::ArgumentMemory;
pub use registry::{next_candidate, Inconsistency, ProcedureSummary};
pub use return_guard::ReturnGuardState;
pub use validator::normalize_param_name;
pub use workspace::{ProcedureBlock, ProcedureWorkspace};
