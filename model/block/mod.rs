/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Block data structures for the canvas editor.
//!
//! Core structures:
//! - `BlockGraph`: canonical owner of all block entities, keyed by id
//! - `Block`: a canvas block with position, content, and relationship links
//! - `ContentItem`: ordered content of a block, including pluggable value slots
//!
//! Relationship links (`parent`/`child`, loop head/tail, value back-references)
//! are denormalized onto the entity and kept bidirectionally consistent by the
//! mutation paths in this module. Boundary: raw link writes are `pub(crate)` —
//! callers outside the store and the drag-op path are single-write-path
//! invariant violations; hosts go through `connect_blocks`/`disconnect_block`.

use euclid::default::{Point2D, Size2D};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::BlockGraphError;

pub mod validate;

/// Stable block identity (survives reconnection and reflow).
pub type BlockId = Uuid;

/// Closed set of block kinds; determines connection topology rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Hat block: starts a chain, never attaches beneath another block.
    Flag,
    Works,
    Move,
    /// Owns a nested interior chain threaded through the same `child` links.
    Loop,
    /// Plugs into a host's value slot instead of joining a chain.
    Value,
    Composition,
}

impl BlockKind {
    /// Connection capability implied by the kind at creation time.
    pub fn default_capability(self) -> ConnectionCapability {
        match self {
            BlockKind::Flag => ConnectionCapability::Output,
            BlockKind::Value => ConnectionCapability::None,
            _ => ConnectionCapability::Both,
        }
    }

    pub fn is_loop(self) -> bool {
        matches!(self, BlockKind::Loop)
    }

    pub fn is_value(self) -> bool {
        matches!(self, BlockKind::Value)
    }
}

/// Which edge directions a block may participate in.
///
/// `Input` is the notch on top of a block (attaching beneath a parent);
/// `Output` is the connector underneath (owning a child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionCapability {
    None,
    Input,
    Output,
    #[default]
    Both,
}

impl ConnectionCapability {
    /// Whether a block with this capability may own chain children.
    pub fn can_parent(self) -> bool {
        matches!(self, ConnectionCapability::Output | ConnectionCapability::Both)
    }

    /// Whether a block with this capability may attach beneath a parent.
    pub fn can_child(self) -> bool {
        matches!(self, ConnectionCapability::Input | ConnectionCapability::Both)
    }
}

/// A named connection point on a block eligible to receive a snap target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorKind {
    /// Connector underneath a block: receives an ordinary chain child.
    Output,
    /// Mouth of a Loop block: receives interior chain members.
    LoopInterior,
    /// A value slot in a block's content row.
    ValueInput,
}

/// Anchor address: a block plus the connection point on it. Value anchors
/// carry the content item id of the slot they name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    pub block: BlockId,
    pub kind: AnchorKind,
    pub item_id: Option<String>,
}

impl Anchor {
    pub fn output(block: BlockId) -> Self {
        Self { block, kind: AnchorKind::Output, item_id: None }
    }

    pub fn loop_interior(block: BlockId) -> Self {
        Self { block, kind: AnchorKind::LoopInterior, item_id: None }
    }

    pub fn value_input(block: BlockId, item_id: impl Into<String>) -> Self {
        Self { block, kind: AnchorKind::ValueInput, item_id: Some(item_id.into()) }
    }
}

/// One entry in a block's ordered content row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub data: ContentData,
}

impl ContentItem {
    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), data: ContentData::Text(text.into()) }
    }

    pub fn value_slot(id: impl Into<String>) -> Self {
        Self { id: id.into(), data: ContentData::Value { variable: None } }
    }

    pub fn separator(id: impl Into<String>) -> Self {
        Self { id: id.into(), data: ContentData::Separator }
    }
}

/// Payload of a content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentData {
    /// Static label text.
    Text(String),
    /// A pluggable slot; `variable` holds the plugged-in Value block, if any.
    Value { variable: Option<BlockId> },
    /// Dropdown selector.
    Selector { options: Vec<String>, selected: usize },
    Separator,
}

/// A block on the canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Stable block identity, immutable after creation.
    pub id: BlockId,

    /// Kind; fixed at creation, drives topology rules.
    pub kind: BlockKind,

    /// Position in canvas space.
    pub position: Point2D<f32>,

    /// Measured render size when known; layout and culling fall back to
    /// `LayoutConstants` defaults when unset.
    pub size: Option<Size2D<f32>>,

    /// Stacking order, derived from nesting depth by the layout pass.
    pub z_index: i32,

    /// Which edge directions this block may participate in.
    pub capability: ConnectionCapability,

    /// Weak back-reference: the block whose `child` (or loop head) points here.
    pub parent: Option<BlockId>,

    /// Next block in the linear chain below this one.
    pub child: Option<BlockId>,

    /// Head of the interior chain (Loop blocks only).
    pub loop_first_child: Option<BlockId>,

    /// Tail of the interior chain (Loop blocks only).
    pub loop_last_child: Option<BlockId>,

    /// Weak back-reference: the block whose value slot holds this Value block.
    pub value_target: Option<BlockId>,

    /// Ordered content row.
    pub content: Vec<ContentItem>,
}

impl Block {
    fn new(id: BlockId, kind: BlockKind, position: Point2D<f32>) -> Self {
        Self {
            id,
            kind,
            position,
            size: None,
            z_index: 0,
            capability: kind.default_capability(),
            parent: None,
            child: None,
            loop_first_child: None,
            loop_last_child: None,
            value_target: None,
            content: Vec::new(),
        }
    }

    /// Ids of Value blocks currently plugged into this block's slots.
    pub fn plugged_values(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.content.iter().filter_map(|item| match item.data {
            ContentData::Value { variable } => variable,
            _ => None,
        })
    }

    /// Content item ids of value slots that currently hold nothing.
    pub fn open_value_slots(&self) -> impl Iterator<Item = &str> + '_ {
        self.content.iter().filter_map(|item| match item.data {
            ContentData::Value { variable: None } => Some(item.id.as_str()),
            _ => None,
        })
    }

    /// Index of a content item within the content row.
    pub fn content_index(&self, item_id: &str) -> Option<usize> {
        self.content.iter().position(|item| item.id == item_id)
    }
}

/// Shallow patch applied by `update_block`; present fields overwrite.
#[derive(Debug, Clone, Default)]
pub struct BlockPatch {
    pub position: Option<Point2D<f32>>,
    pub size: Option<Size2D<f32>>,
    pub z_index: Option<i32>,
    pub capability: Option<ConnectionCapability>,
    pub content: Option<Vec<ContentItem>>,
}

impl BlockPatch {
    pub fn position(position: Point2D<f32>) -> Self {
        Self { position: Some(position), ..Default::default() }
    }

    pub fn content(content: Vec<ContentItem>) -> Self {
        Self { content: Some(content), ..Default::default() }
    }
}

/// Canonical owner of all block entities and their relationship pointers.
///
/// Constructed explicitly and passed by reference; there is no global
/// instance, so tests can run multiple independent graphs.
#[derive(Debug, Clone, Default)]
pub struct BlockGraph {
    blocks: HashMap<BlockId, Block>,
}

impl BlockGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self { blocks: HashMap::new() }
    }

    /// Allocate a fresh block with no relationships. Always succeeds.
    pub fn create_block(&mut self, kind: BlockKind, position: Point2D<f32>) -> BlockId {
        let id = Uuid::new_v4();
        self.blocks.insert(id, Block::new(id, kind, position));
        debug!("create block {id} ({kind:?})");
        id
    }

    /// Allocate a fresh block with an initial content row.
    pub fn create_block_with_content(
        &mut self,
        kind: BlockKind,
        position: Point2D<f32>,
        content: Vec<ContentItem>,
    ) -> BlockId {
        let id = self.create_block(kind, position);
        if let Some(block) = self.blocks.get_mut(&id) {
            block.content = content;
        }
        id
    }

    /// Apply a shallow patch. Fails with `NotFound` if `id` is absent; the
    /// position, when patched, must be finite.
    pub fn update_block(&mut self, id: BlockId, patch: BlockPatch) -> Result<(), BlockGraphError> {
        if !self.blocks.contains_key(&id) {
            return Err(BlockGraphError::NotFound(id));
        }
        if let Some(position) = patch.position
            && !(position.x.is_finite() && position.y.is_finite())
        {
            return Err(BlockGraphError::Structural(format!(
                "non-finite position for {id}"
            )));
        }
        if let Some(content) = &patch.content {
            // A replaced content row may add or drop value references; the
            // referenced Value blocks must exist so back-references stay
            // whole, and one value cannot sit in two slots.
            let mut referenced = HashSet::new();
            for item in content {
                if let ContentData::Value { variable: Some(value_id) } = item.data {
                    if !self.blocks.contains_key(&value_id) {
                        return Err(BlockGraphError::Structural(format!(
                            "content references missing value block {value_id}"
                        )));
                    }
                    if !referenced.insert(value_id) {
                        return Err(BlockGraphError::Structural(format!(
                            "content references value block {value_id} twice"
                        )));
                    }
                }
            }
        }

        let old_values: Vec<BlockId> = self
            .blocks
            .get(&id)
            .map(|b| b.plugged_values().collect())
            .unwrap_or_default();

        let Some(block) = self.blocks.get_mut(&id) else {
            return Err(BlockGraphError::NotFound(id));
        };
        if let Some(position) = patch.position {
            block.position = position;
        }
        if let Some(size) = patch.size {
            block.size = Some(size);
        }
        if let Some(z_index) = patch.z_index {
            block.z_index = z_index;
        }
        if let Some(capability) = patch.capability {
            block.capability = capability;
        }
        if let Some(content) = patch.content {
            block.content = content;
        }

        // Re-point value back-references at the patched content row.
        let new_values: Vec<BlockId> = self
            .blocks
            .get(&id)
            .map(|b| b.plugged_values().collect())
            .unwrap_or_default();
        for dropped in old_values.iter().filter(|v| !new_values.contains(v)) {
            self.set_value_target(*dropped, None);
        }
        for added in new_values.iter().filter(|v| !old_values.contains(v)) {
            // Last write wins when the value sat in another host's slot.
            let _ = self.unplug_value(*added);
            self.set_value_target(*added, Some(id));
        }
        Ok(())
    }

    /// Delete a single block. No-op if absent (deletion is idempotent);
    /// otherwise clears every inbound reference, orphans the block's own
    /// chain and interior, and removes the entity.
    pub fn delete_block(&mut self, id: BlockId) {
        if !self.blocks.contains_key(&id) {
            return;
        }

        // Value links, both directions.
        if self.blocks.get(&id).and_then(|b| b.value_target).is_some() {
            let _ = self.unplug_value(id);
        }
        let plugged: Vec<BlockId> =
            self.blocks.get(&id).map(|b| b.plugged_values().collect()).unwrap_or_default();
        for value_id in plugged {
            self.set_value_target(value_id, None);
        }

        // Chain links. Loop-interior members splice around the removed node;
        // an ordinary parent simply loses its child edge.
        self.detach_from_parent(id);

        let (child, interior_head) = self
            .blocks
            .get(&id)
            .map(|b| (b.child, b.loop_first_child))
            .unwrap_or((None, None));
        if let Some(child) = child {
            self.set_parent(child, None);
        }
        if let Some(head) = interior_head {
            self.set_parent(head, None);
        }

        self.blocks.remove(&id);
        debug!("delete block {id}");
    }

    /// Delete a block and everything attached below it: the ordinary chain,
    /// loop interiors, and plugged value blocks. Explicit worklist; safe on
    /// pathological chains.
    pub fn remove_block_with_children(&mut self, id: BlockId) {
        if !self.blocks.contains_key(&id) {
            return;
        }
        let doomed = self.collect_subtree(id);
        for block_id in doomed {
            self.delete_block(block_id);
        }
    }

    /// Connect `child` (with its sub-chain) beneath `parent`, or into
    /// `parent`'s interior when `is_loop` is set. Validates first; returns
    /// false (and reports nothing beyond a log line) when the edge is
    /// rejected. Reconnecting an already-connected child silently disconnects
    /// the old edge first — connection is last write wins.
    pub fn connect_blocks(&mut self, parent: BlockId, child: BlockId, is_loop: bool) -> bool {
        let kind = if is_loop { AnchorKind::LoopInterior } else { AnchorKind::Output };
        if !validate::connection_allowed(self, parent, child, kind) {
            debug!("connect {parent} -> {child} rejected ({kind:?})");
            return false;
        }
        self.detach_from_parent(child);
        self.attach(parent, child, is_loop);
        true
    }

    /// Disconnect a block from its parent (and, for Value blocks, from any
    /// slot it is plugged into). Chain and loop pointers around it are
    /// re-linked per the loop sub-cases; no-op when the block is free.
    pub fn disconnect_block(&mut self, id: BlockId) {
        if self.blocks.get(&id).and_then(|b| b.value_target).is_some() {
            let _ = self.unplug_value(id);
        }
        self.detach_from_parent(id);
    }

    /// Disconnect a specific parent/child edge; no-op with a log line when
    /// the pair is not actually linked.
    pub fn disconnect_blocks(&mut self, parent: BlockId, child: BlockId) {
        let linked = self.blocks.get(&child).map(|b| b.parent == Some(parent)).unwrap_or(false);
        if !linked {
            debug!("disconnect {parent} -/- {child}: not linked");
            return;
        }
        self.detach_from_parent(child);
    }

    /// Read-only validation of a proposed edge.
    pub fn validate_block_connection(
        &self,
        parent: BlockId,
        child: BlockId,
        kind: AnchorKind,
    ) -> bool {
        validate::connection_allowed(self, parent, child, kind)
    }

    /// Plug a Value block into a specific value slot on `host`. Validated;
    /// returns false when the slot is occupied or the edge is illegal.
    pub fn plug_value_block(&mut self, host: BlockId, value: BlockId, item_id: &str) -> bool {
        if !validate::connection_allowed(self, host, value, AnchorKind::ValueInput)
            || !validate::value_slot_open(self, host, item_id)
        {
            debug!("plug {value} into {host}/{item_id} rejected");
            return false;
        }
        // A Value block plugs into one slot at a time.
        let _ = self.unplug_value(value);
        self.plug_value(host, value, item_id);
        true
    }

    /// Get a block by id.
    pub fn get_block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    /// Iterate all blocks. Order is unspecified.
    pub fn all_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn has_block(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks with no parent and no value host: the chain roots on canvas.
    pub fn roots(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values().filter(|b| b.parent.is_none() && b.value_target.is_none())
    }

    /// Drop all entities.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    // ---- crate-internal link primitives -------------------------------------
    // The drag-op path writes through these; everything else goes through the
    // public mutators above.

    pub(crate) fn set_position(&mut self, id: BlockId, position: Point2D<f32>) {
        if let Some(block) = self.blocks.get_mut(&id) {
            block.position = position;
        }
    }

    pub(crate) fn set_z_index(&mut self, id: BlockId, z_index: i32) {
        if let Some(block) = self.blocks.get_mut(&id) {
            block.z_index = z_index;
        }
    }

    pub(crate) fn set_parent(&mut self, id: BlockId, parent: Option<BlockId>) {
        if let Some(block) = self.blocks.get_mut(&id) {
            block.parent = parent;
        }
    }

    pub(crate) fn set_child(&mut self, id: BlockId, child: Option<BlockId>) {
        if let Some(block) = self.blocks.get_mut(&id) {
            block.child = child;
        }
    }

    pub(crate) fn set_loop_bounds(
        &mut self,
        id: BlockId,
        first: Option<BlockId>,
        last: Option<BlockId>,
    ) {
        if let Some(block) = self.blocks.get_mut(&id) {
            block.loop_first_child = first;
            block.loop_last_child = last;
        }
    }

    pub(crate) fn set_value_target(&mut self, id: BlockId, target: Option<BlockId>) {
        if let Some(block) = self.blocks.get_mut(&id) {
            block.value_target = target;
        }
    }

    pub(crate) fn set_slot_variable(
        &mut self,
        host: BlockId,
        item_id: &str,
        value: Option<BlockId>,
    ) {
        if let Some(block) = self.blocks.get_mut(&host) {
            for item in &mut block.content {
                if item.id == item_id {
                    if let ContentData::Value { variable } = &mut item.data {
                        *variable = value;
                    }
                    return;
                }
            }
        }
    }

    /// Set both halves of a value plug.
    pub(crate) fn plug_value(&mut self, host: BlockId, value: BlockId, item_id: &str) {
        self.set_slot_variable(host, item_id, Some(value));
        self.set_value_target(value, Some(host));
    }

    /// Clear both halves of a value plug. Returns the old host and slot id.
    pub(crate) fn unplug_value(&mut self, value: BlockId) -> Option<(BlockId, String)> {
        let host = self.blocks.get(&value)?.value_target?;
        let item_id = self.blocks.get(&host).and_then(|h| {
            h.content.iter().find_map(|item| match item.data {
                ContentData::Value { variable } if variable == Some(value) => {
                    Some(item.id.clone())
                },
                _ => None,
            })
        });
        let Some(item_id) = item_id else {
            // Back-reference without a matching slot: a prior bug. Report and
            // clear the dangling half rather than leaving it asymmetric.
            warn!(
                "{}",
                BlockGraphError::InvariantViolation(format!(
                    "value {value} back-references {host} but no slot holds it"
                ))
            );
            self.set_value_target(value, None);
            return None;
        };
        self.set_slot_variable(host, &item_id, None);
        self.set_value_target(value, None);
        Some((host, item_id))
    }

    /// Innermost Loop whose interior contains `id`, if any. Walks the chain
    /// upward; visited-set guarded against malformed link cycles.
    pub(crate) fn enclosing_loop(&self, id: BlockId) -> Option<BlockId> {
        let mut visited = HashSet::new();
        let mut current = id;
        while visited.insert(current) {
            let parent = self.blocks.get(&current)?.parent?;
            let parent_block = self.blocks.get(&parent)?;
            if parent_block.kind.is_loop() && parent_block.loop_first_child == Some(current) {
                return Some(parent);
            }
            if parent_block.child != Some(current) {
                warn!(
                    "{}",
                    BlockGraphError::InvariantViolation(format!(
                        "{current} names parent {parent} which does not link back"
                    ))
                );
                return None;
            }
            current = parent;
        }
        warn!(
            "{}",
            BlockGraphError::InvariantViolation(format!("parent cycle reached from {id}"))
        );
        None
    }

    /// Walk to the end of the chain starting at `id`.
    pub(crate) fn chain_tail(&self, id: BlockId) -> BlockId {
        let mut visited = HashSet::new();
        let mut current = id;
        while visited.insert(current) {
            match self.blocks.get(&current).and_then(|b| b.child) {
                Some(next) if !visited.contains(&next) => current = next,
                Some(_) => {
                    warn!(
                        "{}",
                        BlockGraphError::InvariantViolation(format!(
                            "chain cycle while walking from {id}"
                        ))
                    );
                    break;
                },
                None => break,
            }
        }
        current
    }

    /// Re-derive a loop's tail pointer from its head by walking `child`
    /// links. Called after every structural change touching the interior.
    pub(crate) fn recompute_loop_tail(&mut self, loop_id: BlockId) {
        let Some(head) = self.blocks.get(&loop_id).and_then(|b| b.loop_first_child) else {
            self.set_loop_bounds(loop_id, None, None);
            return;
        };
        let tail = self.chain_tail(head);
        self.set_loop_bounds(loop_id, Some(head), Some(tail));
    }

    /// Detach `id` from its parent link.
    ///
    /// Loop-interior members are extracted alone: the head promotes its
    /// successor (shifting its parent up to the Loop) and interior/tail
    /// members splice the chain around themselves. Ordinary chain members
    /// are severed and keep their own sub-chain.
    pub(crate) fn detach_from_parent(&mut self, id: BlockId) -> bool {
        let Some(parent) = self.blocks.get(&id).and_then(|b| b.parent) else {
            return false;
        };
        let Some(parent_block) = self.blocks.get(&parent) else {
            warn!(
                "{}",
                BlockGraphError::InvariantViolation(format!("{id} names missing parent {parent}"))
            );
            self.set_parent(id, None);
            return false;
        };

        if parent_block.kind.is_loop() && parent_block.loop_first_child == Some(id) {
            // Interior head: promote the successor.
            let successor = self.blocks.get(&id).and_then(|b| b.child);
            if let Some(successor) = successor {
                self.set_parent(successor, Some(parent));
            }
            self.set_loop_bounds(parent, successor, None);
            self.set_parent(id, None);
            self.set_child(id, None);
            self.recompute_loop_tail(parent);
            return true;
        }

        if parent_block.child != Some(id) {
            warn!(
                "{}",
                BlockGraphError::InvariantViolation(format!(
                    "{id} names parent {parent} which does not link back"
                ))
            );
            self.set_parent(id, None);
            return false;
        }

        if let Some(enclosing) = self.enclosing_loop(id) {
            // Interior or tail member: splice the chain around it.
            let successor = self.blocks.get(&id).and_then(|b| b.child);
            self.set_child(parent, successor);
            if let Some(successor) = successor {
                self.set_parent(successor, Some(parent));
            }
            self.set_parent(id, None);
            self.set_child(id, None);
            self.recompute_loop_tail(enclosing);
            return true;
        }

        // Ordinary chain member: sever; the block keeps its sub-chain.
        self.set_child(parent, None);
        self.set_parent(id, None);
        true
    }

    /// Unchecked attach; callers have already validated. `child` may carry a
    /// whole pre-existing chain.
    pub(crate) fn attach(&mut self, parent: BlockId, child: BlockId, is_loop: bool) {
        if is_loop {
            self.attach_loop_interior(parent, child);
            return;
        }

        if let Some(existing) = self.blocks.get(&parent).and_then(|b| b.child)
            && existing != child
        {
            warn!(
                "{}",
                BlockGraphError::InvariantViolation(format!(
                    "attach over occupied child slot on {parent}"
                ))
            );
            return;
        }
        self.set_child(parent, Some(child));
        self.set_parent(child, Some(parent));

        // Appending beneath a member nested in a loop extends that loop's
        // interior; the tail pointer must follow.
        if let Some(enclosing) = self.enclosing_loop(parent) {
            self.recompute_loop_tail(enclosing);
        }
    }

    fn attach_loop_interior(&mut self, loop_id: BlockId, child: BlockId) {
        let head = self.blocks.get(&loop_id).and_then(|b| b.loop_first_child);
        match head {
            None => {
                // The incoming block and its whole chain become the interior.
                self.set_loop_bounds(loop_id, Some(child), None);
                self.set_parent(child, Some(loop_id));
                self.rewalk_interior_parents(child);
            },
            Some(head) => {
                // Splice after the current tail.
                let tail = self.chain_tail(head);
                self.set_child(tail, Some(child));
                self.set_parent(child, Some(tail));
            },
        }
        self.recompute_loop_tail(loop_id);
    }

    /// Re-walk an interior chain so every member's parent names its
    /// predecessor. Mismatches indicate a prior bug and are reported.
    fn rewalk_interior_parents(&mut self, head: BlockId) {
        let mut visited = HashSet::new();
        let mut previous = head;
        visited.insert(head);
        while let Some(next) = self.blocks.get(&previous).and_then(|b| b.child) {
            if !visited.insert(next) {
                warn!(
                    "{}",
                    BlockGraphError::InvariantViolation(format!(
                        "interior chain cycle at {next}"
                    ))
                );
                break;
            }
            if self.blocks.get(&next).map(|b| b.parent) != Some(Some(previous)) {
                self.set_parent(next, Some(previous));
            }
            previous = next;
        }
    }

    /// Everything transitively attached at or below `id`: the block itself,
    /// its ordinary chain, loop interiors, and plugged value blocks.
    pub(crate) fn collect_subtree(&self, id: BlockId) -> Vec<BlockId> {
        let mut visited = HashSet::new();
        let mut ordered = Vec::new();
        let mut worklist = vec![id];
        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(block) = self.blocks.get(&current) else {
                continue;
            };
            ordered.push(current);
            if let Some(child) = block.child {
                worklist.push(child);
            }
            if let Some(head) = block.loop_first_child {
                worklist.push(head);
            }
            worklist.extend(block.plugged_values());
        }
        ordered
    }

    /// Full structural audit. Checks bidirectional links, loop head/tail
    /// consistency, acyclicity, value back-reference symmetry, and dangling
    /// references. Intended for tests and defensive callers; the mutation
    /// paths maintain these incrementally.
    pub fn check_invariants(&self) -> Result<(), BlockGraphError> {
        let violation = |detail: String| Err(BlockGraphError::InvariantViolation(detail));

        for block in self.blocks.values() {
            if let Some(child) = block.child {
                let Some(child_block) = self.blocks.get(&child) else {
                    return violation(format!("{} -> missing child {child}", block.id));
                };
                if child_block.parent != Some(block.id) {
                    return violation(format!(
                        "{} -> {child} but child names parent {:?}",
                        block.id, child_block.parent
                    ));
                }
            }
            if let Some(parent) = block.parent {
                let Some(parent_block) = self.blocks.get(&parent) else {
                    return violation(format!("{} names missing parent {parent}", block.id));
                };
                let linked = parent_block.child == Some(block.id)
                    || (parent_block.kind.is_loop()
                        && parent_block.loop_first_child == Some(block.id));
                if !linked {
                    return violation(format!(
                        "{} names parent {parent} which does not link back",
                        block.id
                    ));
                }
            }
            if block.loop_first_child.is_some() && !block.kind.is_loop() {
                return violation(format!("{} holds an interior but is not a loop", block.id));
            }
            match (block.loop_first_child, block.loop_last_child) {
                (Some(head), Some(last)) => {
                    if !self.blocks.contains_key(&head) {
                        return violation(format!("{} -> missing interior head {head}", block.id));
                    }
                    let tail = self.chain_tail(head);
                    if tail != last {
                        return violation(format!(
                            "{} tail pointer {last} but actual tail {tail}",
                            block.id
                        ));
                    }
                    if self.blocks.get(&head).and_then(|h| h.parent) != Some(block.id) {
                        return violation(format!(
                            "interior head {head} does not name loop {}",
                            block.id
                        ));
                    }
                },
                (None, None) => {},
                (first, last) => {
                    return violation(format!(
                        "{} half-set loop bounds {first:?}/{last:?}",
                        block.id
                    ));
                },
            }
            if let Some(host) = block.value_target {
                let Some(host_block) = self.blocks.get(&host) else {
                    return violation(format!("{} plugs into missing host {host}", block.id));
                };
                if !host_block.plugged_values().any(|v| v == block.id) {
                    return violation(format!(
                        "{} back-references {host} but no slot holds it",
                        block.id
                    ));
                }
            }
            for value_id in block.plugged_values() {
                let Some(value_block) = self.blocks.get(&value_id) else {
                    return violation(format!("{} slot holds missing block {value_id}", block.id));
                };
                if value_block.value_target != Some(block.id) {
                    return violation(format!(
                        "slot on {} holds {value_id} without a back-reference",
                        block.id
                    ));
                }
            }
        }

        // Acyclicity over child + loop-head edges: every walk terminates
        // within the total block count without revisiting a node. In-degree
        // over these edges is at most one (checked above), so a revisit is a
        // cycle rather than a diamond.
        let budget = self.blocks.len();
        for start in self.blocks.keys() {
            let mut seen = HashSet::new();
            let mut worklist = vec![*start];
            let mut steps = 0usize;
            while let Some(current) = worklist.pop() {
                if !seen.insert(current) {
                    return violation(format!("chain cycle through {current}"));
                }
                steps += 1;
                if steps > budget {
                    return violation(format!("walk from {start} exceeded block count"));
                }
                if let Some(block) = self.blocks.get(&current) {
                    if let Some(next) = block.child {
                        worklist.push(next);
                    }
                    if let Some(head) = block.loop_first_child {
                        worklist.push(head);
                    }
                }
            }
        }
        Ok(())
    }
}
