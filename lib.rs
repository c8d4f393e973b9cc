/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Framework-agnostic block-canvas core.
//!
//! Three tightly coupled pieces form a small in-memory graph engine with
//! interactive-editing guarantees:
//!
//! - [`model::block::BlockGraph`]: canonical owner of all block entities
//!   and their relationship pointers (chains, loop interiors, value slots),
//!   with invariants that survive arbitrary connect/disconnect/delete
//!   sequences.
//! - [`interact::DragConnectionEngine`]: the drag-and-connect state machine
//!   that re-evaluates candidate attachment points on every movement sample
//!   and, on release, atomically commits a structural change plus a
//!   cascading re-layout, with full rollback on failure.
//! - [`render`]: viewport-based visibility culling that keeps the set of
//!   blocks considered for rendering bounded regardless of total block count.
//!
//! Rendering, styling, persistence, and event wiring are owned by hosts;
//! the boundary to the rendering layer is [`render::spatial_index::SpatialQuery`].

pub mod batch;
pub mod error;
pub mod interact;
pub mod layout;
pub mod model;
pub mod render;

pub use batch::{Batch, ReversibleOp};
pub use error::{BlockGraphError, ErrorSink, LogErrorSink};
pub use interact::{DragConnectionEngine, DragState, SnapTarget};
pub use layout::LayoutConstants;
pub use model::block::{
    Anchor, AnchorKind, Block, BlockGraph, BlockId, BlockKind, BlockPatch, ConnectionCapability,
    ContentData, ContentItem,
};
pub use render::spatial_index::{LayoutSpatialQuery, NullSpatialQuery, SpatialQuery};
pub use render::{BlockVisibility, CullingReport, Viewport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
