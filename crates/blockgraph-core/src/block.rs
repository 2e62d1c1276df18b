//! Block payloads stored as node weights of the workspace graph.
//!
//! A [`Block`] carries its type name, ordered inputs, generic fields and the
//! editor-visible state (position, enabled flag, warning, tooltip). Inputs
//! are addressed by a typed [`InputKey`] instead of free-form strings, so a
//! shape rebuild that renumbers argument slots cannot leave a dangling name.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::BlockId;

/// Workspace coordinates of a top-level block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    /// Returns this position shifted by `(dx, dy)`.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Position {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Typed key of a block input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputKey {
    /// Header row holding the name and the parameter label.
    TopRow,
    /// Positional call argument `ARG{n}`.
    Arg(usize),
    /// Statement body of a definition.
    Stack,
    /// Return value of a value-returning definition.
    Return,
    /// Condition of a conditional return.
    Condition,
    /// Returned value of a conditional return.
    Value,
    /// Any other input of an opaque block.
    Named(String),
}

impl InputKey {
    /// Returns the persisted name of this key (`ARG0`, `STACK`, ...).
    pub fn as_name(&self) -> Cow<'_, str> {
        match self {
            InputKey::TopRow => Cow::Borrowed("TOPROW"),
            InputKey::Arg(i) => Cow::Owned(format!("ARG{}", i)),
            InputKey::Stack => Cow::Borrowed("STACK"),
            InputKey::Return => Cow::Borrowed("RETURN"),
            InputKey::Condition => Cow::Borrowed("CONDITION"),
            InputKey::Value => Cow::Borrowed("VALUE"),
            InputKey::Named(name) => Cow::Borrowed(name.as_str()),
        }
    }

    /// Parses a persisted input name. Unknown names become [`InputKey::Named`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "TOPROW" => InputKey::TopRow,
            "STACK" => InputKey::Stack,
            "RETURN" => InputKey::Return,
            "CONDITION" => InputKey::Condition,
            "VALUE" => InputKey::Value,
            other => match other.strip_prefix("ARG").and_then(|n| n.parse().ok()) {
                Some(index) => InputKey::Arg(index),
                None => InputKey::Named(other.to_string()),
            },
        }
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_name())
    }
}

/// What an input accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    /// Accepts a block with an output connection.
    Value,
    /// Accepts a stack of blocks with previous connections.
    Statement,
    /// Label-only row; accepts nothing.
    Dummy,
}

/// A single input row of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub key: InputKey,
    pub kind: InputKind,
    /// Human-readable label rendered in front of the input.
    pub label: String,
}

impl Input {
    pub fn value(key: InputKey, label: impl Into<String>) -> Self {
        Input {
            key,
            kind: InputKind::Value,
            label: label.into(),
        }
    }

    pub fn statement(key: InputKey, label: impl Into<String>) -> Self {
        Input {
            key,
            kind: InputKind::Statement,
            label: label.into(),
        }
    }

    pub fn dummy(key: InputKey, label: impl Into<String>) -> Self {
        Input {
            key,
            kind: InputKind::Dummy,
            label: label.into(),
        }
    }
}

/// Which connections a block exposes to its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockShape {
    /// Can be plugged into a value input.
    pub output: bool,
    /// Can follow another block or start a statement stack.
    pub previous: bool,
    /// Can be followed by another block.
    pub next: bool,
}

impl BlockShape {
    /// A top-level hat block (procedure definitions).
    pub fn hat() -> Self {
        BlockShape {
            output: false,
            previous: false,
            next: false,
        }
    }

    /// A value-producing expression block.
    pub fn value() -> Self {
        BlockShape {
            output: true,
            previous: false,
            next: false,
        }
    }

    /// A statement block that chains with its neighbours.
    pub fn statement() -> Self {
        BlockShape {
            output: false,
            previous: true,
            next: true,
        }
    }

    /// A block whose connection rules are unknown to this layer.
    pub fn opaque() -> Self {
        BlockShape {
            output: true,
            previous: true,
            next: true,
        }
    }
}

/// A block in the workspace graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Stable identity, assigned by the workspace on insertion.
    pub id: BlockId,
    /// Block type name, e.g. `procedures_defnoreturn`.
    pub block_type: String,
    pub shape: BlockShape,
    /// Input rows in display order.
    pub inputs: Vec<Input>,
    /// Generic field values of opaque blocks.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, String>,
    pub position: Position,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default)]
    pub tooltip: String,
}

impl Block {
    /// Creates an enabled block with no inputs. The id is a placeholder
    /// until the workspace inserts the block.
    pub fn new(block_type: impl Into<String>, shape: BlockShape) -> Self {
        Block {
            id: BlockId(u32::MAX),
            block_type: block_type.into(),
            shape,
            inputs: Vec::new(),
            fields: IndexMap::new(),
            position: Position::default(),
            enabled: true,
            warning: None,
            tooltip: String::new(),
        }
    }

    /// Builder-style input append.
    pub fn with_input(mut self, input: Input) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Returns the input with the given key.
    pub fn input(&self, key: &InputKey) -> Option<&Input> {
        self.inputs.iter().find(|i| &i.key == key)
    }

    /// Returns the row index of the input with the given key.
    pub fn input_index(&self, key: &InputKey) -> Option<usize> {
        self.inputs.iter().position(|i| &i.key == key)
    }
}
