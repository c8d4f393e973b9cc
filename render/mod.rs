/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Viewport-based visibility culling ("virtual scrolling").
//!
//! Stateless geometric filters over a snapshot of blocks: given a viewport
//! transform and a container size, compute the subset of blocks worth
//! handing to a renderer, plus per-block visibility ratios in the detailed
//! mode. Pure and O(n) per call; callers may memoize externally.

use euclid::default::{Point2D, Rect, Size2D};
use serde::{Deserialize, Serialize};

use crate::layout::{self, LayoutConstants};
use crate::model::block::{Block, BlockId};

pub mod spatial_index;

/// Canvas pan/zoom transform: screen = canvas * zoom + (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, zoom: f32) -> Self {
        Self { x, y, zoom }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, zoom: 1.0 }
    }
}

/// Per-block visibility in the detailed culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockVisibility {
    pub id: BlockId,
    /// Intersection area with the visible rectangle divided by the block's
    /// own area.
    pub intersection_ratio: f32,
    pub fully_visible: bool,
    pub partially_visible: bool,
}

/// How much a culling pass cut from the render set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CullingReport {
    pub total: usize,
    pub visible: usize,
}

impl CullingReport {
    pub fn new(total: usize, visible: usize) -> Self {
        Self { total, visible }
    }

    /// Fraction of blocks removed from consideration; 1.0 for an empty
    /// canvas.
    pub fn efficiency(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            1.0 - self.visible as f32 / self.total as f32
        }
    }
}

/// Canvas-space rectangle currently visible, expanded by `margin` screen
/// pixels on every side. `None` when the container is degenerate or the
/// zoom is not a positive finite number.
pub fn visible_canvas_rect(
    viewport: &Viewport,
    container: Size2D<f32>,
    margin: f32,
) -> Option<Rect<f32>> {
    if !(container.width > 0.0 && container.height > 0.0) {
        return None;
    }
    if !viewport.zoom.is_finite() || viewport.zoom <= 0.0 {
        return None;
    }
    Some(Rect::new(
        Point2D::new(
            (-viewport.x - margin) / viewport.zoom,
            (-viewport.y - margin) / viewport.zoom,
        ),
        Size2D::new(
            (container.width + 2.0 * margin) / viewport.zoom,
            (container.height + 2.0 * margin) / viewport.zoom,
        ),
    ))
}

/// A block's canvas-space bounding box, falling back to the default size.
pub fn block_rect(block: &Block, constants: &LayoutConstants) -> Rect<f32> {
    Rect::new(block.position, layout::block_size(block, constants))
}

/// The subset of `blocks` whose bounding box intersects the margin-expanded
/// viewport rectangle. Degenerate viewports yield an empty set.
pub fn calculate_visible_blocks<'a>(
    blocks: impl IntoIterator<Item = &'a Block>,
    viewport: &Viewport,
    container: Size2D<f32>,
    constants: &LayoutConstants,
) -> Vec<&'a Block> {
    let Some(visible) = visible_canvas_rect(viewport, container, constants.culling_margin) else {
        return Vec::new();
    };
    blocks
        .into_iter()
        .filter(|block| block_rect(block, constants).intersects(&visible))
        .collect()
}

/// Per-block intersection ratios against the visible rectangle. A block is
/// `fully_visible` from a ratio of 0.99 and `partially_visible` for any
/// non-zero ratio. Degenerate viewports report every block as unseen.
pub fn calculate_block_visibility<'a>(
    blocks: impl IntoIterator<Item = &'a Block>,
    viewport: &Viewport,
    container: Size2D<f32>,
    constants: &LayoutConstants,
) -> Vec<BlockVisibility> {
    let visible = visible_canvas_rect(viewport, container, constants.culling_margin);
    blocks
        .into_iter()
        .map(|block| {
            let rect = block_rect(block, constants);
            let area = rect.size.area();
            let intersection = visible
                .and_then(|v| rect.intersection(&v))
                .map(|overlap| overlap.size.area())
                .unwrap_or(0.0);
            let intersection_ratio =
                if area > 0.0 { (intersection / area).clamp(0.0, 1.0) } else { 0.0 };
            BlockVisibility {
                id: block.id,
                intersection_ratio,
                fully_visible: intersection_ratio >= 0.99,
                partially_visible: intersection_ratio > 0.0,
            }
        })
        .collect()
}
