/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Chain layout: spacing constants, descendant reflow, and anchor geometry.
//!
//! The reflow pass is pure: it computes position writes without touching
//! the graph, so the drag engine can record each write as an individually
//! reversible operation. Traversal uses explicit frames and a visited-set
//! guard; malformed chains degrade to a warning, never a hang.

use euclid::default::{Point2D, Rect, Size2D, Vector2D};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::model::block::{Anchor, AnchorKind, Block, BlockGraph, BlockId, BlockKind, ContentData};

/// Static layout configuration consumed read-only throughout layout and
/// hit-testing math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConstants {
    /// Fallback block width when no measured size is stored.
    pub block_width: f32,
    /// Fallback block height when no measured size is stored.
    pub block_height: f32,
    /// Vertical gap between consecutive chain members.
    pub vertical_spacing: f32,
    /// Horizontal inset of a loop's interior chain.
    pub loop_indent: f32,
    /// Height of a loop's closing brace below its interior.
    pub loop_footer_height: f32,
    /// Offset of the first value slot from its host's origin.
    pub value_slot_offset: Vector2D<f32>,
    /// Horizontal advance per content item for subsequent value slots.
    pub value_slot_stride: f32,
    /// Size of a connection anchor rectangle.
    pub anchor_size: Size2D<f32>,
    /// Maximum center distance at which an anchor is a snap candidate.
    pub snap_radius: f32,
    /// Margin added around the viewport before culling.
    pub culling_margin: f32,
}

impl Default for LayoutConstants {
    fn default() -> Self {
        Self {
            block_width: 160.0,
            block_height: 40.0,
            vertical_spacing: 8.0,
            loop_indent: 24.0,
            loop_footer_height: 24.0,
            value_slot_offset: Vector2D::new(96.0, 8.0),
            value_slot_stride: 56.0,
            anchor_size: Size2D::new(28.0, 14.0),
            snap_radius: 48.0,
            culling_margin: 100.0,
        }
    }
}

/// Rendered footprint of a block, falling back to the constants table.
pub fn block_size(block: &Block, constants: &LayoutConstants) -> Size2D<f32> {
    block.size.unwrap_or(Size2D::new(constants.block_width, constants.block_height))
}

/// Vertical space a block occupies in its chain. For Loop blocks this is the
/// header plus the accumulated interior-chain heights plus the closing
/// brace, computed recursively over the nesting.
pub fn stack_height(graph: &BlockGraph, id: BlockId, constants: &LayoutConstants) -> f32 {
    stack_height_guarded(graph, id, constants, &mut HashSet::new())
}

fn stack_height_guarded(
    graph: &BlockGraph,
    id: BlockId,
    constants: &LayoutConstants,
    visited: &mut HashSet<BlockId>,
) -> f32 {
    let Some(block) = graph.get_block(id) else {
        return 0.0;
    };
    let own = block_size(block, constants).height;
    if !block.kind.is_loop() || block.loop_first_child.is_none() {
        if block.kind.is_loop() {
            return own + constants.vertical_spacing + constants.loop_footer_height;
        }
        return own;
    }
    if !visited.insert(id) {
        warn!("loop nesting cycle at {id} during height computation");
        return own;
    }
    let mut interior = 0.0;
    let mut current = block.loop_first_child;
    while let Some(member) = current {
        if !visited.insert(member) {
            warn!("interior chain cycle at {member} during height computation");
            break;
        }
        interior += stack_height_guarded(graph, member, constants, visited) + constants.vertical_spacing;
        current = graph.get_block(member).and_then(|b| b.child);
    }
    own + constants.vertical_spacing + interior + constants.loop_footer_height
}

/// Total height of the chain starting at `head`.
pub fn chain_height(graph: &BlockGraph, head: BlockId, constants: &LayoutConstants) -> f32 {
    let mut visited = HashSet::new();
    let mut total = 0.0;
    let mut current = Some(head);
    while let Some(id) = current {
        if !visited.insert(id) {
            warn!("chain cycle at {id} during height computation");
            break;
        }
        total += stack_height(graph, id, constants) + constants.vertical_spacing;
        current = graph.get_block(id).and_then(|b| b.child);
    }
    total
}

/// One pending position change produced by a reflow pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionWrite {
    pub id: BlockId,
    pub from: Point2D<f32>,
    pub to: Point2D<f32>,
}

/// Lay out the tree rooted at `root`: each chain successor directly beneath
/// its predecessor, loop interiors indented below their header, plugged
/// value blocks pinned to their host slot offsets. The root keeps its own
/// position; only blocks that actually move produce a write.
pub fn reflow_chain(
    graph: &BlockGraph,
    root: BlockId,
    constants: &LayoutConstants,
) -> Vec<PositionWrite> {
    let mut writes = Vec::new();
    let Some(root_block) = graph.get_block(root) else {
        return writes;
    };

    let mut visited = HashSet::new();
    // Each frame is a chain head plus the canvas position it starts at.
    let mut frames = vec![(root, root_block.position)];
    while let Some((head, start)) = frames.pop() {
        let mut cursor = start;
        let mut current = Some(head);
        while let Some(id) = current {
            if !visited.insert(id) {
                warn!("chain cycle at {id} during reflow");
                break;
            }
            let Some(block) = graph.get_block(id) else {
                break;
            };
            if (block.position - cursor).square_length() > f32::EPSILON {
                writes.push(PositionWrite { id, from: block.position, to: cursor });
            }
            for (index, item) in block.content.iter().enumerate() {
                if let ContentData::Value { variable: Some(value) } = item.data {
                    frames.push((value, cursor + value_slot_offset(index, constants)));
                }
            }
            if block.kind.is_loop()
                && let Some(interior_head) = block.loop_first_child
            {
                let header = block_size(block, constants).height;
                frames.push((
                    interior_head,
                    Point2D::new(
                        cursor.x + constants.loop_indent,
                        cursor.y + header + constants.vertical_spacing,
                    ),
                ));
            }
            cursor.y += stack_height(graph, id, constants) + constants.vertical_spacing;
            current = block.child;
        }
    }
    writes
}

/// Offset of the value slot at content `index` from its host's origin.
pub fn value_slot_offset(index: usize, constants: &LayoutConstants) -> Vector2D<f32> {
    Vector2D::new(
        constants.value_slot_offset.x + index as f32 * constants.value_slot_stride,
        constants.value_slot_offset.y,
    )
}

/// Geometry-only anchor rectangle computed from stored positions and the
/// constants table. The rendering-backed equivalent lives behind
/// `SpatialQuery`.
pub fn anchor_rect(
    graph: &BlockGraph,
    anchor: &Anchor,
    constants: &LayoutConstants,
) -> Option<Rect<f32>> {
    let block = graph.get_block(anchor.block)?;
    let position = block.position;
    match anchor.kind {
        AnchorKind::Output => {
            let below = stack_height(graph, anchor.block, constants);
            Some(Rect::new(
                Point2D::new(
                    position.x,
                    position.y + below - constants.anchor_size.height / 2.0,
                ),
                constants.anchor_size,
            ))
        },
        AnchorKind::LoopInterior => {
            let header = block_size(block, constants).height;
            Some(Rect::new(
                Point2D::new(position.x + constants.loop_indent, position.y + header),
                constants.anchor_size,
            ))
        },
        AnchorKind::ValueInput => {
            let item_id = anchor.item_id.as_deref()?;
            let index = block.content_index(item_id)?;
            Some(Rect::new(
                position + value_slot_offset(index, constants),
                constants.anchor_size,
            ))
        },
    }
}

/// The dragged block's own plug rectangle at a given position: its top
/// notch for chain connections, its left plug for value blocks.
pub fn drag_plug_rect(
    kind: BlockKind,
    position: Point2D<f32>,
    constants: &LayoutConstants,
) -> Rect<f32> {
    if kind.is_value() {
        Rect::new(position, constants.anchor_size)
    } else {
        Rect::new(
            Point2D::new(position.x, position.y - constants.anchor_size.height / 2.0),
            constants.anchor_size,
        )
    }
}

/// Topmost block reachable from `id` through parent links and value-host
/// hops; the root a reflow should start from.
pub fn root_ancestor(graph: &BlockGraph, id: BlockId) -> BlockId {
    let mut visited = HashSet::new();
    let mut current = id;
    while visited.insert(current) {
        let up = graph
            .get_block(current)
            .and_then(|b| b.parent.or(b.value_target));
        match up {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

/// Re-derive stacking order from nesting depth: chain members share their
/// root's depth, loop interiors and plugged values sit one level above their
/// owner.
pub fn refresh_z_indices(graph: &mut BlockGraph, root: BlockId) {
    let mut visited = HashSet::new();
    let mut writes = Vec::new();
    let mut worklist = vec![(root, 0i32)];
    while let Some((id, depth)) = worklist.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(block) = graph.get_block(id) else {
            continue;
        };
        writes.push((id, depth));
        if let Some(child) = block.child {
            worklist.push((child, depth));
        }
        if let Some(head) = block.loop_first_child {
            worklist.push((head, depth + 1));
        }
        for value in block.plugged_values() {
            worklist.push((value, depth + 1));
        }
    }
    for (id, z_index) in writes {
        graph.set_z_index(id, z_index);
    }
}
