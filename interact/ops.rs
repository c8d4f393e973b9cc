/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Reversible operations recorded during a drag.
//!
//! Each operation captures the absolute before-state it needs at
//! construction time, so rollback restores exact prior values and re-apply
//! in the original order is idempotent. Structural ops delegate their apply
//! to the store's loop-aware mutation paths and undo through the raw link
//! setters.

use euclid::default::Point2D;

use crate::batch::ReversibleOp;
use crate::model::block::{BlockGraph, BlockId, ContentData};

/// How a block was linked into its chain before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExtractScope {
    /// Head of a loop interior; parent is the Loop itself.
    LoopHead { bounds: (Option<BlockId>, Option<BlockId>) },
    /// Interior or tail member of the loop `enclosing`.
    LoopInterior {
        enclosing: BlockId,
        bounds: (Option<BlockId>, Option<BlockId>),
    },
    /// Ordinary chain member outside any loop.
    Ordinary,
}

/// Loop bookkeeping captured before an attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttachRestore {
    /// Tail the incoming chain was spliced after; None when the chain became
    /// the interior head (loop attach) or for ordinary attaches.
    pub prev_tail: Option<BlockId>,
    /// Loop whose head/tail pointers the attach touched, with their prior
    /// values.
    pub loop_bounds: Option<(BlockId, Option<BlockId>, Option<BlockId>)>,
}

/// A single reversible mutation recorded in a drag batch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DragOp {
    /// Absolute position write.
    Move {
        id: BlockId,
        from: Point2D<f32>,
        to: Point2D<f32>,
    },
    /// Clear a value plug (drag start on a plugged Value block).
    Unplug {
        host: BlockId,
        value: BlockId,
        item_id: String,
    },
    /// Set a value plug (drop onto an open slot).
    Plug {
        host: BlockId,
        value: BlockId,
        item_id: String,
    },
    /// Detach a block from its parent link.
    Extract {
        node: BlockId,
        parent: BlockId,
        successor: Option<BlockId>,
        scope: ExtractScope,
    },
    /// Attach a block (with its chain) beneath a parent or into a loop.
    Attach {
        parent: BlockId,
        child: BlockId,
        is_loop: bool,
        restore: AttachRestore,
    },
}

impl DragOp {
    pub(crate) fn movement(id: BlockId, from: Point2D<f32>, to: Point2D<f32>) -> Self {
        DragOp::Move { id, from, to }
    }

    /// Capture an unplug of `value` from whatever slot currently holds it.
    pub(crate) fn unplug(graph: &BlockGraph, value: BlockId) -> Option<Self> {
        let host = graph.get_block(value)?.value_target?;
        let item_id = graph.get_block(host)?.content.iter().find_map(|item| match item.data {
            ContentData::Value { variable } if variable == Some(value) => Some(item.id.clone()),
            _ => None,
        })?;
        Some(DragOp::Unplug { host, value, item_id })
    }

    pub(crate) fn plug(host: BlockId, value: BlockId, item_id: impl Into<String>) -> Self {
        DragOp::Plug { host, value, item_id: item_id.into() }
    }

    /// Capture the extraction of `node` from its parent link.
    pub(crate) fn extract(graph: &BlockGraph, node: BlockId) -> Option<Self> {
        let block = graph.get_block(node)?;
        let parent = block.parent?;
        let parent_block = graph.get_block(parent)?;
        let successor = block.child;
        let scope = if parent_block.kind.is_loop() && parent_block.loop_first_child == Some(node) {
            ExtractScope::LoopHead {
                bounds: (parent_block.loop_first_child, parent_block.loop_last_child),
            }
        } else if let Some(enclosing) = graph.enclosing_loop(node) {
            let loop_block = graph.get_block(enclosing)?;
            ExtractScope::LoopInterior {
                enclosing,
                bounds: (loop_block.loop_first_child, loop_block.loop_last_child),
            }
        } else {
            ExtractScope::Ordinary
        };
        Some(DragOp::Extract { node, parent, successor, scope })
    }

    /// Capture an attach of `child` beneath `parent` (or into its interior).
    pub(crate) fn attach(
        graph: &BlockGraph,
        parent: BlockId,
        child: BlockId,
        is_loop: bool,
    ) -> Self {
        let restore = if is_loop {
            let (first, last) = graph
                .get_block(parent)
                .map(|b| (b.loop_first_child, b.loop_last_child))
                .unwrap_or((None, None));
            let prev_tail = first.map(|head| graph.chain_tail(head));
            AttachRestore { prev_tail, loop_bounds: Some((parent, first, last)) }
        } else {
            let loop_bounds = graph.enclosing_loop(parent).and_then(|enclosing| {
                graph
                    .get_block(enclosing)
                    .map(|b| (enclosing, b.loop_first_child, b.loop_last_child))
            });
            AttachRestore { prev_tail: None, loop_bounds }
        };
        DragOp::Attach { parent, child, is_loop, restore }
    }
}

impl ReversibleOp<BlockGraph> for DragOp {
    fn apply(&self, graph: &mut BlockGraph) {
        match self {
            DragOp::Move { id, to, .. } => graph.set_position(*id, *to),
            DragOp::Unplug { host, value, item_id } => {
                graph.set_slot_variable(*host, item_id, None);
                graph.set_value_target(*value, None);
            },
            DragOp::Plug { host, value, item_id } => {
                graph.plug_value(*host, *value, item_id);
            },
            DragOp::Extract { node, .. } => {
                let _ = graph.detach_from_parent(*node);
            },
            DragOp::Attach { parent, child, is_loop, .. } => {
                graph.attach(*parent, *child, *is_loop);
            },
        }
    }

    fn rollback(&self, graph: &mut BlockGraph) {
        match self {
            DragOp::Move { id, from, .. } => graph.set_position(*id, *from),
            DragOp::Unplug { host, value, item_id } => {
                graph.plug_value(*host, *value, item_id);
            },
            DragOp::Plug { host, value, item_id } => {
                graph.set_slot_variable(*host, item_id, None);
                graph.set_value_target(*value, None);
            },
            DragOp::Extract { node, parent, successor, scope } => match *scope {
                ExtractScope::LoopHead { bounds } => {
                    graph.set_child(*node, *successor);
                    if let Some(successor) = *successor {
                        graph.set_parent(successor, Some(*node));
                    }
                    graph.set_loop_bounds(*parent, bounds.0, bounds.1);
                    graph.set_parent(*node, Some(*parent));
                },
                ExtractScope::LoopInterior { enclosing, bounds } => {
                    graph.set_child(*parent, Some(*node));
                    graph.set_parent(*node, Some(*parent));
                    graph.set_child(*node, *successor);
                    if let Some(successor) = *successor {
                        graph.set_parent(successor, Some(*node));
                    }
                    graph.set_loop_bounds(enclosing, bounds.0, bounds.1);
                },
                ExtractScope::Ordinary => {
                    graph.set_child(*parent, Some(*node));
                    graph.set_parent(*node, Some(*parent));
                },
            },
            DragOp::Attach { parent, child, is_loop, restore } => {
                if *is_loop {
                    match restore.prev_tail {
                        Some(prev_tail) => graph.set_child(prev_tail, None),
                        // The chain had become the whole interior.
                        None => {},
                    }
                } else {
                    graph.set_child(*parent, None);
                }
                graph.set_parent(*child, None);
                if let Some((loop_id, first, last)) = restore.loop_bounds {
                    graph.set_loop_bounds(loop_id, first, last);
                }
            },
        }
    }
}
