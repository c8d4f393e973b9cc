/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Drag-and-connect state machine.
//!
//! A drag arms on `start_drag`, re-evaluates its snap target on every
//! movement sample, and on release either commits a structural connection
//! plus a cascading re-layout or keeps the move as a purely positional
//! change. Every mutation since `start_drag` is recorded in one batch, so a
//! failed commit rolls the graph back to its exact pre-drag state.
//!
//! The engine holds only interaction state; the store is passed in by the
//! caller, so multiple independent graphs can each run their own drags.

use euclid::default::{Point2D, Rect, Vector2D};
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::batch::Batch;
use crate::error::{BlockGraphError, ErrorSink, LogErrorSink};
use crate::layout::{self, LayoutConstants};
use crate::model::block::{validate, Anchor, AnchorKind, BlockGraph, BlockId};
use crate::render::spatial_index::{AnchorSpatialIndex, SpatialQuery};

mod ops;

use ops::DragOp;

/// The best candidate attachment point computed during a drag.
///
/// Invalid candidates are still surfaced (for visual feedback) with
/// `valid == false`; only valid targets are committed on release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapTarget {
    pub anchor: Anchor,
    /// Canvas-space rectangle of the anchor.
    pub rect: Rect<f32>,
    /// Center distance between the dragged block's plug and the anchor.
    pub distance: f32,
    /// Overlap area between the dragged block's plug and the anchor.
    pub overlap: f32,
    pub valid: bool,
}

/// Interaction state of one in-progress drag.
pub struct DragState {
    pub block: BlockId,
    /// Fixed offset between the pointer and the block's origin at grab time.
    pub grab_offset: Vector2D<f32>,
    /// Position before the drag started; restored on rollback.
    pub origin: Point2D<f32>,
    /// Most recently evaluated snap target.
    pub snap: Option<SnapTarget>,
    batch: Batch<DragOp>,
}

/// Drag-connect engine: Idle → Armed → Evaluating-Snap → Committed or
/// Cancelled → Idle.
pub struct DragConnectionEngine {
    constants: LayoutConstants,
    sink: Box<dyn ErrorSink>,
    active: Option<DragState>,
}

impl Default for DragConnectionEngine {
    fn default() -> Self {
        Self::new(LayoutConstants::default())
    }
}

impl DragConnectionEngine {
    pub fn new(constants: LayoutConstants) -> Self {
        Self { constants, sink: Box::new(LogErrorSink), active: None }
    }

    /// Install a reporting sink for failure paths.
    pub fn with_error_sink(mut self, sink: Box<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn constants(&self) -> &LayoutConstants {
        &self.constants
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    /// Current interaction state, if a drag is in progress.
    pub fn drag_state(&self) -> Option<&DragState> {
        self.active.as_ref()
    }

    /// Arm a drag on `block`. Fails only when the block does not exist.
    ///
    /// A plugged Value block is unplugged from its slot, and a chained block
    /// is extracted from its chain; the gap this leaves is closed right away
    /// by a reflow rooted at the old parent's root ancestor. Everything is
    /// recorded in a fresh batch.
    pub fn start_drag(
        &mut self,
        graph: &mut BlockGraph,
        block: BlockId,
        grab_offset: Vector2D<f32>,
    ) -> bool {
        if self.active.is_some() {
            debug!("start_drag while another drag is active; cancelling it");
            self.clear_drag(graph);
        }
        let Some(entity) = graph.get_block(block) else {
            self.sink.report(&BlockGraphError::NotFound(block));
            return false;
        };
        let origin = entity.position;
        let mut batch = Batch::new(format!("drag:{block}"));

        if let Some(op) = DragOp::unplug(graph, block) {
            batch.apply(graph, op);
        }
        let old_parent = graph.get_block(block).and_then(|b| b.parent);
        if let Some(old_parent) = old_parent {
            if let Some(op) = DragOp::extract(graph, block) {
                batch.apply(graph, op);
            }
            let reflow_root = layout::root_ancestor(graph, old_parent);
            for write in layout::reflow_chain(graph, reflow_root, &self.constants) {
                batch.apply(graph, DragOp::movement(write.id, write.from, write.to));
            }
        }

        self.active = Some(DragState { block, grab_offset, origin, snap: None, batch });
        debug!("drag {block} armed");
        true
    }

    /// Feed one movement sample: repositions the dragged block (and its
    /// whole subtree) and re-evaluates the snap target.
    pub fn update_drag_position(
        &mut self,
        graph: &mut BlockGraph,
        spatial: &dyn SpatialQuery,
        pointer: Point2D<f32>,
    ) {
        let constants = self.constants;
        let Some(state) = self.active.as_mut() else {
            debug!("update_drag_position without an active drag");
            return;
        };
        let block = state.block;
        let Some(old_position) = graph.get_block(block).map(|b| b.position) else {
            return;
        };
        let new_position = pointer - state.grab_offset;
        let delta = new_position - old_position;
        if delta.square_length() > f32::EPSILON {
            state
                .batch
                .apply(graph, DragOp::movement(block, old_position, new_position));
            // The subtree follows: chain below, loop interiors, plugged
            // values, all at their canonical offsets.
            for write in layout::reflow_chain(graph, block, &constants) {
                state.batch.apply(graph, DragOp::movement(write.id, write.from, write.to));
            }
        }
        state.snap = compute_drop_target(graph, spatial, &constants, block, new_position);
    }

    /// Read-only candidate search at a pointer position.
    pub fn find_drop_target(
        &self,
        graph: &BlockGraph,
        spatial: &dyn SpatialQuery,
        pointer: Point2D<f32>,
    ) -> Option<SnapTarget> {
        let state = self.active.as_ref()?;
        compute_drop_target(graph, spatial, &self.constants, state.block, pointer - state.grab_offset)
    }

    /// Release the drag. With a valid target the structural connection is
    /// performed and the whole tree under the target's root ancestor is laid
    /// out again; any failure rolls back every change since `start_drag` and
    /// returns false. Without a valid target the batch commits as a pure
    /// positional move. Always finishes in Idle.
    pub fn end_drag(&mut self, graph: &mut BlockGraph, target: Option<SnapTarget>) -> bool {
        let Some(mut state) = self.active.take() else {
            debug!("end_drag without an active drag");
            return false;
        };
        let dragged = state.block;
        let target = target.or(state.snap.take());

        let Some(target) = target.filter(|t| t.valid) else {
            // Dropping in empty space (or on an invalid candidate) simply
            // relocates the block.
            state.batch.commit();
            let root = layout::root_ancestor(graph, dragged);
            layout::refresh_z_indices(graph, root);
            debug!("drag {dragged} committed as positional move");
            return true;
        };

        // Re-validate against the current graph; the snap was computed a
        // sample earlier.
        let allowed = match target.anchor.kind {
            AnchorKind::ValueInput => {
                target
                    .anchor
                    .item_id
                    .as_deref()
                    .map(|item| validate::value_slot_open(graph, target.anchor.block, item))
                    .unwrap_or(false)
                    && validate::connection_allowed(
                        graph,
                        target.anchor.block,
                        dragged,
                        AnchorKind::ValueInput,
                    )
            },
            kind => validate::connection_allowed(graph, target.anchor.block, dragged, kind),
        };
        if !allowed {
            let slot_taken = target.anchor.kind == AnchorKind::ValueInput
                && target
                    .anchor
                    .item_id
                    .as_deref()
                    .map(|item| !validate::value_slot_open(graph, target.anchor.block, item))
                    .unwrap_or(true);
            let error = if slot_taken {
                BlockGraphError::SlotOccupied(target.anchor.block)
            } else {
                BlockGraphError::Structural(format!(
                    "drop of {dragged} onto {} rejected",
                    target.anchor.block
                ))
            };
            self.sink.report(&error);
            state.batch.rollback(graph);
            let root = layout::root_ancestor(graph, dragged);
            layout::refresh_z_indices(graph, root);
            return false;
        }

        match target.anchor.kind {
            AnchorKind::ValueInput => {
                let item_id = target.anchor.item_id.clone().unwrap_or_default();
                state
                    .batch
                    .apply(graph, DragOp::plug(target.anchor.block, dragged, item_id));
            },
            AnchorKind::Output | AnchorKind::LoopInterior => {
                let is_loop = target.anchor.kind == AnchorKind::LoopInterior;
                let op = DragOp::attach(graph, target.anchor.block, dragged, is_loop);
                state.batch.apply(graph, op);
            },
        }

        // Canonical reposition of the dragged block and every descendant of
        // the new root.
        let root = layout::root_ancestor(graph, target.anchor.block);
        for write in layout::reflow_chain(graph, root, &self.constants) {
            state.batch.apply(graph, DragOp::movement(write.id, write.from, write.to));
        }

        let linked = match target.anchor.kind {
            AnchorKind::ValueInput => graph
                .get_block(dragged)
                .map(|b| b.value_target == Some(target.anchor.block))
                .unwrap_or(false),
            _ => graph.get_block(dragged).map(|b| b.parent.is_some()).unwrap_or(false),
        };
        if !linked {
            self.sink.report(&BlockGraphError::InvariantViolation(format!(
                "connection of {dragged} did not take effect"
            )));
            state.batch.rollback(graph);
            let root = layout::root_ancestor(graph, dragged);
            layout::refresh_z_indices(graph, root);
            return false;
        }

        state.batch.commit();
        layout::refresh_z_indices(graph, root);
        debug!("drag {dragged} committed onto {}", target.anchor.block);
        true
    }

    /// Cancel an in-progress drag: every recorded change is rolled back and
    /// the machine returns to Idle. No-op when already idle.
    pub fn clear_drag(&mut self, graph: &mut BlockGraph) {
        if let Some(state) = self.active.take() {
            let block = state.block;
            state.batch.rollback(graph);
            let root = layout::root_ancestor(graph, block);
            layout::refresh_z_indices(graph, root);
            debug!("drag {block} cancelled");
        }
    }
}

fn rect_center(rect: &Rect<f32>) -> Point2D<f32> {
    rect.origin + rect.size.to_vector() / 2.0
}

/// Candidate search: collect every anchor the dragged block could attach
/// to, resolve each to a rectangle (rendered rect when available, geometry
/// fallback otherwise), and rank the candidates near the plug by overlap
/// area, then by center distance.
fn compute_drop_target(
    graph: &BlockGraph,
    spatial: &dyn SpatialQuery,
    constants: &LayoutConstants,
    dragged: BlockId,
    position: Point2D<f32>,
) -> Option<SnapTarget> {
    let dragged_block = graph.get_block(dragged)?;
    let dragged_kind = dragged_block.kind;
    let excluded: HashSet<BlockId> = graph.collect_subtree(dragged).into_iter().collect();

    let mut candidates = Vec::new();
    for block in graph.all_blocks() {
        if excluded.contains(&block.id) {
            continue;
        }
        if dragged_kind.is_value() {
            for item_id in block.open_value_slots() {
                candidates.push(Anchor::value_input(block.id, item_id));
            }
        } else {
            if block.capability.can_parent() {
                candidates.push(Anchor::output(block.id));
            }
            if block.kind.is_loop() {
                candidates.push(Anchor::loop_interior(block.id));
            }
        }
    }

    let resolved = candidates.into_iter().filter_map(|anchor| {
        let rect = spatial
            .anchor_rect(graph, &anchor)
            .or_else(|| layout::anchor_rect(graph, &anchor, constants))?;
        Some((anchor, rect))
    });
    let index = AnchorSpatialIndex::build(resolved);

    let plug = layout::drag_plug_rect(dragged_kind, position, constants);
    let plug_center = rect_center(&plug);

    let best = index
        .anchors_within(plug_center, constants.snap_radius)
        .map(|(anchor, rect)| {
            let overlap = plug
                .intersection(&rect)
                .map(|overlap| overlap.size.area())
                .unwrap_or(0.0);
            let distance = plug_center.distance_to(rect_center(&rect));
            (anchor.clone(), rect, overlap, distance)
        })
        .filter(|(_, _, overlap, distance)| *overlap > 0.0 || *distance <= constants.snap_radius)
        .min_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(Ordering::Equal)
                .then(a.3.partial_cmp(&b.3).unwrap_or(Ordering::Equal))
        })?;

    let (anchor, rect, overlap, distance) = best;
    let valid = match anchor.kind {
        AnchorKind::ValueInput => {
            anchor
                .item_id
                .as_deref()
                .map(|item| validate::value_slot_open(graph, anchor.block, item))
                .unwrap_or(false)
                && validate::connection_allowed(graph, anchor.block, dragged, AnchorKind::ValueInput)
        },
        kind => validate::connection_allowed(graph, anchor.block, dragged, kind),
    };
    Some(SnapTarget { anchor, rect, distance, overlap, valid })
}
