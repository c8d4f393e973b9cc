/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Reversible-operation batches.
//!
//! A batch collects operations that were applied immediately (so
//! intermediate UI state stays consistent) and can replay their rollbacks in
//! strict reverse order, letting a composite structural edit (position
//! writes plus connection changes plus re-layout) be undone as one atomic
//! unit even though each step mutated shared state directly.

use log::debug;

/// An operation that can be applied to `S` and precisely undone.
///
/// Implementations record absolute before/after values at construction time,
/// which makes re-applying a batch's operations in the original order
/// idempotent.
pub trait ReversibleOp<S> {
    fn apply(&self, state: &mut S);
    fn rollback(&self, state: &mut S);
}

/// An ordered record of applied operations under one scope (e.g. one drag).
#[derive(Debug)]
pub struct Batch<O> {
    scope: String,
    ops: Vec<O>,
}

impl<O> Batch<O> {
    /// Open an empty batch for a scope.
    pub fn new(scope: impl Into<String>) -> Self {
        Self { scope: scope.into(), ops: Vec::new() }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Execute `op` against `state` immediately and record it.
    pub fn apply<S>(&mut self, state: &mut S, op: O)
    where
        O: ReversibleOp<S>,
    {
        op.apply(state);
        self.ops.push(op);
    }

    /// Keep every applied change and discard the record.
    pub fn commit(self) -> usize {
        debug!("batch {} committed ({} ops)", self.scope, self.ops.len());
        self.ops.len()
    }

    /// Undo every recorded operation in reverse order, then discard.
    pub fn rollback<S>(mut self, state: &mut S)
    where
        O: ReversibleOp<S>,
    {
        debug!("batch {} rolling back {} ops", self.scope, self.ops.len());
        while let Some(op) = self.ops.pop() {
            op.rollback(state);
        }
    }
}
