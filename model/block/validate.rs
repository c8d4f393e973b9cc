/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Pure connection-validation predicates.
//!
//! No stored state; every function reads the graph and answers a yes/no
//! question. All checks run before any mutation, so a rejected edge leaves
//! the graph untouched.

use std::collections::HashSet;

use super::{AnchorKind, BlockGraph, BlockId, ContentData};

/// Whether a proposed edge is legal.
pub fn connection_allowed(
    graph: &BlockGraph,
    parent: BlockId,
    child: BlockId,
    kind: AnchorKind,
) -> bool {
    let (Some(parent_block), Some(child_block)) = (graph.get_block(parent), graph.get_block(child))
    else {
        return false;
    };
    if parent == child {
        return false;
    }

    match kind {
        AnchorKind::ValueInput => {
            child_block.kind.is_value()
                && has_open_value_slot(graph, parent)
                && !value_host_chain_contains(graph, parent, child)
        },
        AnchorKind::Output | AnchorKind::LoopInterior => {
            if !parent_block.capability.can_parent() || !child_block.capability.can_child() {
                return false;
            }
            if kind == AnchorKind::LoopInterior && !parent_block.kind.is_loop() {
                return false;
            }
            // A loop's mouth takes any number of members; an ordinary output
            // is a single slot.
            if kind == AnchorKind::Output
                && let Some(existing) = parent_block.child
                && existing != child
            {
                return false;
            }
            !would_create_cycle(graph, parent, child)
        },
    }
}

/// Whether `host` owns at least one value slot holding nothing.
pub fn has_open_value_slot(graph: &BlockGraph, host: BlockId) -> bool {
    graph
        .get_block(host)
        .map(|block| block.open_value_slots().next().is_some())
        .unwrap_or(false)
}

/// Whether the named slot on `host` exists and holds nothing.
pub fn value_slot_open(graph: &BlockGraph, host: BlockId, item_id: &str) -> bool {
    graph
        .get_block(host)
        .map(|block| {
            block.content.iter().any(|item| {
                item.id == item_id && matches!(item.data, ContentData::Value { variable: None })
            })
        })
        .unwrap_or(false)
}

/// Cycle probe: walks the target's descendant chain forward and the
/// candidate child's ancestor chain backward, rejecting on mutual
/// reachability. O(chain length), visited-set guarded.
pub fn would_create_cycle(graph: &BlockGraph, parent: BlockId, child: BlockId) -> bool {
    // Forward: would `parent` end up beneath itself?
    let mut visited = HashSet::new();
    let mut worklist = vec![child];
    while let Some(current) = worklist.pop() {
        if current == parent {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(block) = graph.get_block(current) {
            if let Some(next) = block.child {
                worklist.push(next);
            }
            if let Some(head) = block.loop_first_child {
                worklist.push(head);
            }
        }
    }

    // Backward: is `child` already above `parent`?
    let mut visited = HashSet::new();
    let mut current = parent;
    while let Some(ancestor) = graph.get_block(current).and_then(|b| b.parent) {
        if ancestor == child {
            return true;
        }
        if !visited.insert(ancestor) {
            break;
        }
        current = ancestor;
    }
    false
}

/// Whether following value-host references upward from `host` reaches
/// `value`; guards against a plug that would nest a host inside its own
/// plugged block.
fn value_host_chain_contains(graph: &BlockGraph, host: BlockId, value: BlockId) -> bool {
    let mut visited = HashSet::new();
    let mut current = host;
    loop {
        if current == value {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }
        match graph.get_block(current).and_then(|b| b.value_target) {
            Some(next) => current = next,
            None => return false,
        }
    }
}
