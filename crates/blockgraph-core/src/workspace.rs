//! Workspace: the block graph container.
//!
//! [`Workspace`] is the single entry point for constructing and querying a
//! block program. Blocks live as node weights of a `StableGraph`; edges point
//! from a parent to the child plugged into one of its inputs or chained after
//! it. All mutations go through `Workspace` methods so that the one-parent
//! and one-child-per-input rules hold, and every mutation fires its event
//! into the caller's [`Transaction`].
//!
//! A workspace is either the main editing surface or a flyout (the
//! non-interactive palette). Reactive behaviour layered on top checks
//! [`is_flyout`](Workspace::is_flyout) and stays inert in palettes.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use crate::block::{Block, Input, InputKey, InputKind, Position};
use crate::error::CoreError;
use crate::events::{ChangeElement, EventKind, Transaction};
use crate::id::BlockId;
use crate::link::Link;
use crate::variables::VariableMap;

/// The block graph of one editing surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    graph: StableGraph<Block, Link, Directed, u32>,
    /// Mapping from BlockId to its graph NodeIndex
    nodes: HashMap<BlockId, NodeIndex<u32>>,
    /// Variable slots of this surface
    pub variables: VariableMap,
    /// Palette surfaces never react to events
    flyout: bool,
    /// Next block ID counter
    next_block_id: u32,
}

impl Workspace {
    /// Creates an empty main workspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty flyout (palette) workspace.
    pub fn flyout() -> Self {
        Workspace {
            flyout: true,
            ..Self::default()
        }
    }

    pub fn is_flyout(&self) -> bool {
        self.flyout
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.nodes.get(&id).and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// All block ids in allocation order.
    pub fn all_blocks(&self) -> Vec<BlockId> {
        let mut ids: Vec<BlockId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Blocks without a parent, in allocation order.
    pub fn top_blocks(&self) -> Vec<BlockId> {
        self.all_blocks()
            .into_iter()
            .filter(|&id| self.parent(id).is_none())
            .collect()
    }

    fn index(&self, id: BlockId) -> Result<NodeIndex<u32>, CoreError> {
        self.nodes
            .get(&id)
            .copied()
            .ok_or(CoreError::BlockNotFound { id })
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, CoreError> {
        let idx = self.index(id)?;
        self.graph
            .node_weight_mut(idx)
            .ok_or(CoreError::BlockNotFound { id })
    }

    // -----------------------------------------------------------------------
    // Structure queries
    // -----------------------------------------------------------------------

    /// Returns the parent of `id` and how `id` is attached to it.
    pub fn parent(&self, id: BlockId) -> Option<(BlockId, Link)> {
        let idx = self.nodes.get(&id)?;
        self.graph
            .edges_directed(*idx, Direction::Incoming)
            .next()
            .map(|edge| (self.graph[edge.source()].id, edge.weight().clone()))
    }

    /// Direct children of `id`: inputs in row order, then the next block.
    pub fn children(&self, id: BlockId) -> Vec<(Link, BlockId)> {
        let (Some(idx), Some(block)) = (self.nodes.get(&id), self.block(id)) else {
            return Vec::new();
        };
        let mut children: Vec<(Link, BlockId)> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|edge| (edge.weight().clone(), self.graph[edge.target()].id))
            .collect();
        children.sort_by_key(|(link, _)| match link {
            Link::Input(key) => block.input_index(key).unwrap_or(usize::MAX - 1),
            Link::Next => usize::MAX,
        });
        children
    }

    /// Every block below `id` (inputs and next chain), depth first.
    pub fn descendants(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack: Vec<BlockId> = self
            .children(id)
            .into_iter()
            .rev()
            .map(|(_, child)| child)
            .collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).into_iter().rev().map(|(_, c)| c));
        }
        out
    }

    /// The block plugged into `parent`'s input `key`.
    pub fn target_block(&self, parent: BlockId, key: &InputKey) -> Option<BlockId> {
        self.children(parent)
            .into_iter()
            .find(|(link, _)| link.input_key() == Some(key))
            .map(|(_, child)| child)
    }

    /// The block chained after `id`.
    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        self.children(id)
            .into_iter()
            .find(|(link, _)| link.is_next())
            .map(|(_, child)| child)
    }

    /// The nearest ancestor that holds `id` in one of its inputs, skipping
    /// blocks that merely precede `id` in a statement stack.
    pub fn surround_parent(&self, id: BlockId) -> Option<BlockId> {
        let mut current = id;
        loop {
            let (parent, link) = self.parent(current)?;
            if !link.is_next() {
                return Some(parent);
            }
            current = parent;
        }
    }

    fn is_ancestor_or_self(&self, candidate: BlockId, of: BlockId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.parent(id).map(|(p, _)| p);
        }
        false
    }

    // -----------------------------------------------------------------------
    // Block lifecycle
    // -----------------------------------------------------------------------

    /// Inserts a block without firing an event and returns its new id.
    ///
    /// Used when building a tree that is announced once with
    /// [`announce_created`](Self::announce_created).
    pub fn insert_block(&mut self, mut block: Block) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        block.id = id;
        let idx = self.graph.add_node(block);
        self.nodes.insert(id, idx);
        id
    }

    /// Fires a single `Create` event for `root` and its descendants.
    pub fn announce_created(&self, root: BlockId, tx: &mut Transaction) {
        let mut ids: SmallVec<[BlockId; 4]> = SmallVec::new();
        ids.push(root);
        ids.extend(self.descendants(root));
        tx.fire(EventKind::Create { ids });
    }

    /// Inserts a block and fires its `Create` event.
    pub fn add_block(&mut self, block: Block, tx: &mut Transaction) -> BlockId {
        let id = self.insert_block(block);
        self.announce_created(id, tx);
        id
    }

    /// Deletes `id` together with everything plugged into it or chained
    /// after it. Returns the deleted ids, root first.
    pub fn delete_block(
        &mut self,
        id: BlockId,
        tx: &mut Transaction,
    ) -> Result<Vec<BlockId>, CoreError> {
        self.index(id)?;
        let mut doomed = vec![id];
        doomed.extend(self.descendants(id));

        for victim in &doomed {
            if let Some(idx) = self.nodes.remove(victim) {
                self.graph.remove_node(idx);
            }
        }

        tx.fire(EventKind::Delete {
            ids: doomed.iter().copied().collect(),
        });

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(doomed)
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Attaches `child` to `parent` through `link`.
    pub fn connect(
        &mut self,
        parent: BlockId,
        link: Link,
        child: BlockId,
        tx: &mut Transaction,
    ) -> Result<(), CoreError> {
        let parent_idx = self.index(parent)?;
        let child_idx = self.index(child)?;
        let refuse = |reason: &str| CoreError::ConnectionRefused {
            parent,
            child,
            reason: reason.to_string(),
        };

        if self.parent(child).is_some() {
            return Err(refuse("child is already attached"));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(refuse("connection would create a cycle"));
        }

        let parent_block = &self.graph[parent_idx];
        let child_shape = self.graph[child_idx].shape;
        match &link {
            Link::Input(key) => {
                let input = parent_block
                    .input(key)
                    .ok_or_else(|| CoreError::InputNotFound {
                        block: parent,
                        key: key.clone(),
                    })?;
                match input.kind {
                    InputKind::Value if !child_shape.output => {
                        return Err(refuse("value input needs an output connection"))
                    }
                    InputKind::Statement if !child_shape.previous => {
                        return Err(refuse("statement input needs a previous connection"))
                    }
                    InputKind::Dummy => return Err(refuse("dummy inputs accept nothing")),
                    _ => {}
                }
                if self.target_block(parent, key).is_some() {
                    return Err(refuse("input is occupied"));
                }
            }
            Link::Next => {
                if !parent_block.shape.next || !child_shape.previous {
                    return Err(refuse("blocks cannot be chained"));
                }
                if self.next_block(parent).is_some() {
                    return Err(refuse("next connection is occupied"));
                }
            }
        }

        self.graph.add_edge(parent_idx, child_idx, link);
        tx.fire(EventKind::Move {
            block: child,
            old_parent: None,
            new_parent: Some(parent),
        });

        #[cfg(debug_assertions)]
        self.assert_consistency();

        Ok(())
    }

    /// Unplugs `child` from its parent, keeping whatever is chained after
    /// it. Returns the former parent.
    pub fn disconnect(
        &mut self,
        child: BlockId,
        tx: &mut Transaction,
    ) -> Result<Option<BlockId>, CoreError> {
        let child_idx = self.index(child)?;
        let Some(edge) = self
            .graph
            .edges_directed(child_idx, Direction::Incoming)
            .next()
            .map(|edge| (edge.id(), self.graph[edge.source()].id))
        else {
            return Ok(None);
        };
        self.graph.remove_edge(edge.0);
        tx.fire(EventKind::Move {
            block: child,
            old_parent: Some(edge.1),
            new_parent: None,
        });
        Ok(Some(edge.1))
    }

    /// Plugs a remembered child back into `parent`'s input `key`.
    ///
    /// Succeeds only while the child still exists and is either free or
    /// attached elsewhere on `parent` itself; an occupant of the target input
    /// is unplugged first. Returns `false` when the child is gone or has been
    /// attached to another block.
    pub fn reconnect(
        &mut self,
        child: BlockId,
        parent: BlockId,
        key: &InputKey,
        tx: &mut Transaction,
    ) -> bool {
        if !self.contains(child) || !self.contains(parent) {
            return false;
        }
        match self.parent(child) {
            Some((p, Link::Input(k))) if p == parent && &k == key => return true,
            Some((p, _)) if p != parent => return false,
            _ => {}
        }
        if self.block(parent).and_then(|b| b.input(key)).is_none() {
            return false;
        }
        if let Some(occupant) = self.target_block(parent, key) {
            if self.disconnect(occupant, tx).is_err() {
                return false;
            }
        }
        if self.parent(child).is_some() && self.disconnect(child, tx).is_err() {
            return false;
        }
        self.connect(parent, Link::Input(key.clone()), child, tx)
            .is_ok()
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Appends an input row.
    pub fn append_input(&mut self, id: BlockId, input: Input) -> Result<(), CoreError> {
        let len = self.block(id).map(|b| b.inputs.len()).unwrap_or(0);
        self.insert_input(id, len, input)
    }

    /// Inserts an input row at `index` (clamped to the row count).
    pub fn insert_input(
        &mut self,
        id: BlockId,
        index: usize,
        input: Input,
    ) -> Result<(), CoreError> {
        let block = self.block_mut(id)?;
        if block.input(&input.key).is_some() {
            return Err(CoreError::DuplicateInput {
                block: id,
                key: input.key,
            });
        }
        let at = index.min(block.inputs.len());
        block.inputs.insert(at, input);
        Ok(())
    }

    /// Removes an input row, unplugging its child first. Returns the
    /// unplugged child.
    pub fn remove_input(
        &mut self,
        id: BlockId,
        key: &InputKey,
        tx: &mut Transaction,
    ) -> Result<Option<BlockId>, CoreError> {
        let row = self
            .block(id)
            .ok_or(CoreError::BlockNotFound { id })?
            .input_index(key)
            .ok_or_else(|| CoreError::InputNotFound {
                block: id,
                key: key.clone(),
            })?;
        let child = self.target_block(id, key);
        if let Some(child) = child {
            self.disconnect(child, tx)?;
        }
        self.block_mut(id)?.inputs.remove(row);
        Ok(child)
    }

    /// Updates an input label. Returns `true` if it changed.
    pub fn set_input_label(
        &mut self,
        id: BlockId,
        key: &InputKey,
        label: &str,
    ) -> Result<bool, CoreError> {
        let block = self.block_mut(id)?;
        let input = block
            .inputs
            .iter_mut()
            .find(|i| &i.key == key)
            .ok_or_else(|| CoreError::InputNotFound {
                block: id,
                key: key.clone(),
            })?;
        if input.label == label {
            return Ok(false);
        }
        input.label = label.to_string();
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Block state
    // -----------------------------------------------------------------------

    pub fn is_enabled(&self, id: BlockId) -> bool {
        self.block(id).map_or(false, |b| b.enabled)
    }

    /// Enables or disables a block. Returns `true` if the state changed.
    pub fn set_enabled(
        &mut self,
        id: BlockId,
        enabled: bool,
        tx: &mut Transaction,
    ) -> Result<bool, CoreError> {
        let block = self.block_mut(id)?;
        if block.enabled == enabled {
            return Ok(false);
        }
        block.enabled = enabled;
        tx.fire(EventKind::Change {
            block: id,
            element: ChangeElement::Disabled,
            old: Value::Bool(enabled),
            new: Value::Bool(!enabled),
        });
        Ok(true)
    }

    /// `true` if any surrounding ancestor is disabled.
    pub fn inherited_disabled(&self, id: BlockId) -> bool {
        let mut ancestor = self.surround_parent(id);
        while let Some(current) = ancestor {
            if !self.is_enabled(current) {
                return true;
            }
            ancestor = self.surround_parent(current);
        }
        false
    }

    pub fn set_warning(&mut self, id: BlockId, warning: Option<String>) -> Result<(), CoreError> {
        self.block_mut(id)?.warning = warning;
        Ok(())
    }

    pub fn set_tooltip(&mut self, id: BlockId, tooltip: String) -> Result<(), CoreError> {
        self.block_mut(id)?.tooltip = tooltip;
        Ok(())
    }

    /// Sets a generic field value and fires a field change.
    pub fn set_field(
        &mut self,
        id: BlockId,
        name: &str,
        value: &str,
        tx: &mut Transaction,
    ) -> Result<(), CoreError> {
        let block = self.block_mut(id)?;
        let old = block.fields.insert(name.to_string(), value.to_string());
        if old.as_deref() == Some(value) {
            return Ok(());
        }
        tx.fire(EventKind::Change {
            block: id,
            element: ChangeElement::Field(name.to_string()),
            old: old.map_or(Value::Null, Value::String),
            new: Value::String(value.to_string()),
        });
        Ok(())
    }

    pub fn move_to(&mut self, id: BlockId, position: Position) -> Result<(), CoreError> {
        self.block_mut(id)?.position = position;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Consistency
    // -----------------------------------------------------------------------

    /// Verifies the id mapping, the single-parent rule and that every input
    /// edge targets an existing input row.
    pub fn validate(&self) -> Result<(), CoreError> {
        let broken = |reason: String| Err(CoreError::GraphInconsistency { reason });
        if self.nodes.len() != self.graph.node_count() {
            return broken("id map and graph disagree on block count".into());
        }
        for (id, &idx) in &self.nodes {
            if self.graph[idx].id != *id {
                return broken(format!("block {} stored under wrong id", id));
            }
            let parents = self.graph.edges_directed(idx, Direction::Incoming).count();
            if parents > 1 {
                return broken(format!("block {} has {} parents", id, parents));
            }
        }
        for edge in self.graph.edge_references() {
            if let Link::Input(key) = edge.weight() {
                let parent = &self.graph[edge.source()];
                if parent.input(key).is_none() {
                    return broken(format!(
                        "edge into missing input {} on block {}",
                        key, parent.id
                    ));
                }
            }
        }
        Ok(())
    }

    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        if let Err(err) = self.validate() {
            panic!("{}", err);
        }
    }
}
