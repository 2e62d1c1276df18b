//! Procedure kinds, block type names and parameter ids.
//!
//! Definitions and calls come in two variants that differ only in whether the
//! procedure yields a value. [`ProcedureKind`] parameterizes one type for each
//! role instead of duplicating it per variant.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEF_NO_RETURN: &str = "procedures_defnoreturn";
pub const DEF_RETURN: &str = "procedures_defreturn";
pub const CALL_NO_RETURN: &str = "procedures_callnoreturn";
pub const CALL_RETURN: &str = "procedures_callreturn";
pub const IF_RETURN: &str = "procedures_ifreturn";

/// Whether a procedure produces a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcedureKind {
    NoReturn,
    Return,
}

impl ProcedureKind {
    pub fn returns_value(self) -> bool {
        matches!(self, ProcedureKind::Return)
    }

    pub fn definition_type(self) -> &'static str {
        match self {
            ProcedureKind::NoReturn => DEF_NO_RETURN,
            ProcedureKind::Return => DEF_RETURN,
        }
    }

    pub fn call_type(self) -> &'static str {
        match self {
            ProcedureKind::NoReturn => CALL_NO_RETURN,
            ProcedureKind::Return => CALL_RETURN,
        }
    }

    /// Recognizes a definition block type.
    pub fn from_definition_type(block_type: &str) -> Option<Self> {
        match block_type {
            DEF_NO_RETURN => Some(ProcedureKind::NoReturn),
            DEF_RETURN => Some(ProcedureKind::Return),
            _ => None,
        }
    }

    /// Recognizes a call block type.
    pub fn from_call_type(block_type: &str) -> Option<Self> {
        match block_type {
            CALL_NO_RETURN => Some(ProcedureKind::NoReturn),
            CALL_RETURN => Some(ProcedureKind::Return),
            _ => None,
        }
    }

    pub(crate) fn call_tooltip(self, name: &str) -> String {
        match self {
            ProcedureKind::NoReturn => format!("Run the user-defined function '{}'.", name),
            ProcedureKind::Return => {
                format!("Run the user-defined function '{}' and use its output.", name)
            }
        }
    }

    pub(crate) fn definition_tooltip(self) -> &'static str {
        match self {
            ProcedureKind::NoReturn => "Creates a function with no output.",
            ProcedureKind::Return => "Creates a function with an output.",
        }
    }
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcedureKind::NoReturn => write!(f, "no-return"),
            ProcedureKind::Return => write!(f, "return"),
        }
    }
}

/// Stable identity of one parameter of a definition, independent of its name.
///
/// Call sites key their remembered argument blocks by this id, so a renamed
/// or reordered parameter keeps its plugged value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub String);

impl ParamId {
    pub fn generate() -> Self {
        ParamId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParamId {
    fn from(s: &str) -> Self {
        ParamId(s.to_string())
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
