/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Error taxonomy for the block-canvas core.
//!
//! Validation failures are checked before any mutation and surfaced as
//! `bool`/`Option` returns across the public boundary; `Result` is reserved
//! for operations whose contract names an error (`update_block` on a missing
//! id). Invariant violations indicate a prior bug, are reported through an
//! [`ErrorSink`], and are never silently repaired.

use log::warn;

use crate::model::block::BlockId;

/// Errors from the block graph and the drag-connect engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockGraphError {
    /// An operation referenced a block id absent from the store.
    NotFound(BlockId),
    /// A proposed edge is illegal: self-connection, cycle, or an
    /// incompatible connection capability.
    Structural(String),
    /// A value connection targeted a content slot that already holds a block.
    SlotOccupied(BlockId),
    /// Defensive detection of a loop head/tail or bidirectional-link
    /// mismatch. Indicates a prior bug, not a caller mistake.
    InvariantViolation(String),
}

impl std::fmt::Display for BlockGraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockGraphError::NotFound(id) => write!(f, "block not found: {id}"),
            BlockGraphError::Structural(reason) => write!(f, "structural error: {reason}"),
            BlockGraphError::SlotOccupied(host) => {
                write!(f, "value slot on {host} is already occupied")
            },
            BlockGraphError::InvariantViolation(detail) => {
                write!(f, "internal invariant violation: {detail}")
            },
        }
    }
}

/// Optional reporting boundary for failure paths.
///
/// The core's return values remain fully meaningful without a sink; hosts
/// install one to drive toast/notification UI. The default sink forwards to
/// the `log` facade.
pub trait ErrorSink {
    fn report(&self, error: &BlockGraphError);
}

/// Default sink: forwards every report to `log::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, error: &BlockGraphError) {
        warn!("block graph: {error}");
    }
}
