//! Persisted forms of procedure blocks.
//!
//! Two encodings are supported and both can be read back:
//!
//! - the **tree form**, an ordered tag tree (`<mutation><arg name=".."/>…`)
//!   kept for documents written by older editors, and
//! - the **compact form**, a small JSON object per block
//!   (`{"params": [{"name", "id"}], "hasStatements": false}` for a definition,
//!   `{"name", "params"}` for a call).
//!
//! A definition can additionally be exported on its own as a [`Signature`].
//! Reading is lenient: a parameter whose variable slot cannot be resolved is
//! logged and skipped.

use blockgraph_core::{BlockId, Transaction, VarId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::call::CallState;
use crate::definition::{DefinitionState, Parameter};
use crate::error::ProcError;
use crate::kind::{ParamId, ProcedureKind};
use crate::return_guard::ReturnGuardState;
use crate::workspace::{ProcedureBlock, ProcedureWorkspace};

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tag tree
// ---------------------------------------------------------------------------

/// An element of the tree form: a tag with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TagNode>,
}

impl TagNode {
    pub fn new(tag: impl Into<String>) -> Self {
        TagNode {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: TagNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a TagNode> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    /// Renders the tree as XML text. Childless elements self-close.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ---------------------------------------------------------------------------
// Compact form and signature
// ---------------------------------------------------------------------------

/// A definition's exported signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<SignatureParam>,
    #[serde(default = "default_true")]
    pub has_body: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureParam {
    pub name: String,
    pub slot_id: VarId,
}

/// One parameter in a definition's compact form. `id` is the slot id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamState {
    pub name: String,
    pub id: VarId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_id: Option<ParamId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionExtraState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<ParamState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_statements: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExtraState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnGuardExtraState {
    #[serde(default = "default_true")]
    pub has_return_value: bool,
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

impl DefinitionState {
    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            parameters: self
                .params
                .iter()
                .map(|p| SignatureParam {
                    name: p.name.clone(),
                    slot_id: p.slot.clone(),
                })
                .collect(),
            has_body: self.has_body,
        }
    }

    /// Tree form. With `include_ids` the procedure name and parameter ids
    /// are written too.
    pub fn to_tree(&self, include_ids: bool) -> TagNode {
        let mut node = TagNode::new("mutation");
        if include_ids {
            node = node.with_attr("name", self.name.as_str());
        }
        for param in &self.params {
            let mut arg = TagNode::new("arg")
                .with_attr("name", param.name.as_str())
                .with_attr("varid", param.slot.as_str());
            if include_ids {
                arg = arg.with_attr("paramId", param.id.as_str());
            }
            node = node.with_child(arg);
        }
        if !self.has_body {
            node = node.with_attr("statements", "false");
        }
        node
    }

    /// Compact form; `None` when there is nothing beyond the defaults.
    pub fn to_extra_state(&self) -> Option<DefinitionExtraState> {
        if self.params.is_empty() && self.has_body {
            return None;
        }
        Some(DefinitionExtraState {
            params: (!self.params.is_empty()).then(|| {
                self.params
                    .iter()
                    .map(|p| ParamState {
                        name: p.name.clone(),
                        id: p.slot.clone(),
                        param_id: Some(p.id.clone()),
                    })
                    .collect()
            }),
            has_statements: (!self.has_body).then_some(false),
        })
    }
}

impl CallState {
    pub fn to_tree(&self) -> TagNode {
        self.arguments.iter().fold(
            TagNode::new("mutation").with_attr("name", self.name.as_str()),
            |node, arg| node.with_child(TagNode::new("arg").with_attr("name", arg.as_str())),
        )
    }

    pub fn to_extra_state(&self) -> CallExtraState {
        CallExtraState {
            name: self.name.clone(),
            params: (!self.arguments.is_empty()).then(|| self.arguments.clone()),
        }
    }
}

impl ReturnGuardState {
    pub fn to_tree(&self) -> TagNode {
        TagNode::new("mutation").with_attr("value", if self.has_return_value { "1" } else { "0" })
    }

    pub fn to_extra_state(&self) -> ReturnGuardExtraState {
        ReturnGuardExtraState {
            has_return_value: self.has_return_value,
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A parameter as read, before its slot is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedParam {
    pub name: String,
    pub slot: Option<VarId>,
    pub param_id: Option<ParamId>,
}

/// A definition's persisted shape, before slots are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDefinition {
    pub params: Vec<ParsedParam>,
    pub has_body: bool,
}

impl Default for ParsedDefinition {
    fn default() -> Self {
        ParsedDefinition {
            params: Vec::new(),
            has_body: true,
        }
    }
}

impl ParsedDefinition {
    /// Reads the tree form. Accepts both `varid` and `varId`.
    pub fn from_tree(node: &TagNode) -> Self {
        let params = node
            .children_named("arg")
            .map(|arg| ParsedParam {
                name: arg.attr("name").unwrap_or_default().to_string(),
                slot: arg.attr("varid").or_else(|| arg.attr("varId")).map(VarId::from),
                param_id: arg.attr("paramId").map(ParamId::from),
            })
            .collect();
        ParsedDefinition {
            params,
            has_body: node.attr("statements") != Some("false"),
        }
    }

    pub fn from_extra_state(state: &DefinitionExtraState) -> Self {
        let params = state
            .params
            .iter()
            .flatten()
            .map(|p| ParsedParam {
                name: p.name.clone(),
                slot: Some(p.id.clone()),
                param_id: p.param_id.clone(),
            })
            .collect();
        ParsedDefinition {
            params,
            has_body: state.has_statements.unwrap_or(true),
        }
    }

    pub fn from_signature(signature: &Signature) -> Self {
        ParsedDefinition {
            params: signature
                .parameters
                .iter()
                .map(|p| ParsedParam {
                    name: p.name.clone(),
                    slot: Some(p.slot_id.clone()),
                    param_id: None,
                })
                .collect(),
            has_body: signature.has_body,
        }
    }
}

/// A call's persisted shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCall {
    pub name: Option<String>,
    pub arguments: Vec<String>,
    pub param_ids: Option<Vec<ParamId>>,
}

impl ParsedCall {
    pub fn from_tree(node: &TagNode) -> Self {
        let args: Vec<&TagNode> = node.children_named("arg").collect();
        let ids: Option<Vec<ParamId>> = args
            .iter()
            .map(|arg| arg.attr("paramId").map(ParamId::from))
            .collect();
        ParsedCall {
            name: node.attr("name").map(str::to_string),
            arguments: args
                .iter()
                .map(|arg| arg.attr("name").unwrap_or_default().to_string())
                .collect(),
            param_ids: ids.filter(|ids| !ids.is_empty()),
        }
    }

    pub fn from_extra_state(state: &CallExtraState) -> Self {
        ParsedCall {
            name: Some(state.name.clone()),
            arguments: state.params.clone().unwrap_or_default(),
            param_ids: None,
        }
    }
}

/// Reads a return guard's `value` attribute; anything but `0` means a value
/// socket.
pub fn return_value_from_tree(node: &TagNode) -> bool {
    node.attr("value") != Some("0")
}

impl ProcedureWorkspace {
    /// The mutation of a procedure block as XML text.
    pub(crate) fn mutation_text(&self, id: BlockId) -> Result<String, ProcError> {
        let tree = match self.procs.get(&id) {
            Some(ProcedureBlock::Definition(def)) => def.to_tree(false),
            Some(ProcedureBlock::Call(call)) => call.to_tree(),
            Some(ProcedureBlock::ReturnGuard(guard)) => guard.to_tree(),
            None => return Err(blockgraph_core::CoreError::BlockNotFound { id }.into()),
        };
        Ok(tree.to_xml_string())
    }

    /// Resolves parsed parameters to slots, creating missing ones. Entries
    /// that cannot be resolved, or that repeat a slot, are logged and
    /// skipped.
    pub(crate) fn resolve_params(
        &mut self,
        parsed: &[ParsedParam],
        tx: &mut Transaction,
    ) -> Vec<Parameter> {
        let mut params: Vec<Parameter> = Vec::with_capacity(parsed.len());
        for entry in parsed {
            match self
                .ws
                .variables
                .resolve_or_create(entry.slot.as_ref(), &entry.name, "", tx)
            {
                Ok(slot) => {
                    if params.iter().any(|p| p.slot == slot.id) {
                        tracing::warn!(param = %entry.name, "skipping repeated parameter");
                        continue;
                    }
                    let id = entry
                        .param_id
                        .clone()
                        .filter(|id| params.iter().all(|p| &p.id != id))
                        .unwrap_or_else(ParamId::generate);
                    params.push(Parameter {
                        name: slot.name,
                        slot: slot.id,
                        id,
                    });
                }
                Err(err) => {
                    tracing::warn!(param = %entry.name, error = %err, "skipping unresolvable parameter");
                }
            }
        }
        params
    }

    /// Exports the signature of `def`.
    pub fn export_signature(&self, def: BlockId) -> Result<Signature, ProcError> {
        Ok(self.require_definition(def)?.signature())
    }

    /// Creates a definition from an exported signature. The name is made
    /// unique and missing slots are created.
    pub fn import_signature(
        &mut self,
        kind: ProcedureKind,
        signature: &Signature,
        position: blockgraph_core::Position,
    ) -> Result<BlockId, ProcError> {
        self.user_action("import procedure", |this, tx| {
            let parsed = ParsedDefinition::from_signature(signature);
            let params = this.resolve_params(&parsed.params, tx);
            let name = this.legal_name(signature.name.trim(), None);
            this.create_definition(kind, &name, params, parsed.has_body, position, tx)
        })
    }
}
