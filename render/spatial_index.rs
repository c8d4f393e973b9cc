/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Spatial index for connection-anchor hit-testing.
//!
//! Candidate anchors are indexed by their canvas-space rectangles so the
//! drag engine's snap search can use an efficient R*-tree range query
//! instead of a full O(n) anchor scan.

use euclid::default::{Point2D, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::layout::{self, LayoutConstants};
use crate::model::block::{Anchor, BlockGraph};

/// Read-only boundary to whatever knows where anchors are on screen.
///
/// The rendering layer (out of scope here) answers from live element
/// rectangles; headless and test contexts answer `None`, and callers fall
/// back to geometry computed from stored positions and the constants table.
pub trait SpatialQuery {
    fn anchor_rect(&self, graph: &BlockGraph, anchor: &Anchor) -> Option<Rect<f32>>;
}

/// Geometry-only implementation over stored positions and layout constants.
/// This is the implementation the core's own tests use.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutSpatialQuery {
    pub constants: LayoutConstants,
}

impl LayoutSpatialQuery {
    pub fn new(constants: LayoutConstants) -> Self {
        Self { constants }
    }
}

impl SpatialQuery for LayoutSpatialQuery {
    fn anchor_rect(&self, graph: &BlockGraph, anchor: &Anchor) -> Option<Rect<f32>> {
        layout::anchor_rect(graph, anchor, &self.constants)
    }
}

/// A query source with nothing rendered; every lookup is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSpatialQuery;

impl SpatialQuery for NullSpatialQuery {
    fn anchor_rect(&self, _graph: &BlockGraph, _anchor: &Anchor) -> Option<Rect<f32>> {
        None
    }
}

/// An anchor entry stored in the R*-tree.
struct IndexedAnchor {
    envelope: AABB<[f32; 2]>,
    anchor: Anchor,
    rect: Rect<f32>,
}

impl RTreeObject for IndexedAnchor {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Spatial index mapping canvas-space anchor rectangles to anchors.
///
/// Built per query from `(Anchor, rect)` pairs; queries operate in canvas
/// space.
pub(crate) struct AnchorSpatialIndex {
    tree: RTree<IndexedAnchor>,
}

impl AnchorSpatialIndex {
    /// Build the index from an iterator of `(anchor, canvas_rect)` pairs.
    pub fn build(anchors: impl IntoIterator<Item = (Anchor, Rect<f32>)>) -> Self {
        let entries: Vec<_> = anchors
            .into_iter()
            .map(|(anchor, rect)| IndexedAnchor {
                envelope: AABB::from_corners(
                    [rect.min_x(), rect.min_y()],
                    [rect.max_x(), rect.max_y()],
                ),
                anchor,
                rect,
            })
            .collect();
        Self { tree: RTree::bulk_load(entries) }
    }

    /// All anchors whose rectangle intersects the square of half-width
    /// `radius` around `center`.
    pub fn anchors_within(
        &self,
        center: Point2D<f32>,
        radius: f32,
    ) -> impl Iterator<Item = (&Anchor, Rect<f32>)> {
        let aabb = AABB::from_corners(
            [center.x - radius, center.y - radius],
            [center.x + radius, center.y + radius],
        );
        self.tree
            .locate_in_envelope_intersecting(&aabb)
            .map(|entry| (&entry.anchor, entry.rect))
    }
}
