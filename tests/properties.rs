//! Property tests: random mutation sequences must leave the graph with its
//! structural invariants intact, and a cancelled drag must be a perfect
//! identity on the whole graph.

use block_canvas::{
    BlockGraph, BlockId, BlockKind, ContentItem, DragConnectionEngine, LayoutConstants,
    LayoutSpatialQuery,
};
use euclid::default::{Point2D, Vector2D};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    CreateSlotHost,
    Connect(u8, u8, bool),
    PlugValue(u8, u8),
    Disconnect(u8),
    Delete(u8),
    RemoveWithChildren(u8),
}

fn kind_from(selector: u8) -> BlockKind {
    match selector % 5 {
        0 => BlockKind::Flag,
        1 => BlockKind::Works,
        2 => BlockKind::Move,
        3 => BlockKind::Value,
        _ => BlockKind::Loop,
    }
}

fn pick(ids: &[BlockId], selector: u8) -> Option<BlockId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[selector as usize % ids.len()])
    }
}

fn apply_op(graph: &mut BlockGraph, ids: &mut Vec<BlockId>, op: &Op) {
    let position = Point2D::new(ids.len() as f32 * 60.0, 0.0);
    match op {
        Op::Create(selector) => {
            ids.push(graph.create_block(kind_from(*selector), position));
        },
        Op::CreateSlotHost => {
            ids.push(graph.create_block_with_content(
                BlockKind::Move,
                position,
                vec![ContentItem::value_slot("s1")],
            ));
        },
        Op::Connect(parent, child, is_loop) => {
            if let (Some(parent), Some(child)) = (pick(ids, *parent), pick(ids, *child)) {
                // The validator owns legality; the return value is not the
                // property under test.
                let _ = graph.connect_blocks(parent, child, *is_loop);
            }
        },
        Op::PlugValue(host, value) => {
            if let (Some(host), Some(value)) = (pick(ids, *host), pick(ids, *value)) {
                let _ = graph.plug_value_block(host, value, "s1");
            }
        },
        Op::Disconnect(selector) => {
            if let Some(id) = pick(ids, *selector) {
                graph.disconnect_block(id);
            }
        },
        Op::Delete(selector) => {
            if let Some(id) = pick(ids, *selector) {
                graph.delete_block(id);
            }
        },
        Op::RemoveWithChildren(selector) => {
            if let Some(id) = pick(ids, *selector) {
                graph.remove_block_with_children(id);
            }
        },
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u8>().prop_map(Op::Create),
        1 => Just(Op::CreateSlotHost),
        4 => (any::<u8>(), any::<u8>(), any::<bool>())
            .prop_map(|(p, c, l)| Op::Connect(p, c, l)),
        1 => (any::<u8>(), any::<u8>()).prop_map(|(h, v)| Op::PlugValue(h, v)),
        1 => any::<u8>().prop_map(Op::Disconnect),
        1 => any::<u8>().prop_map(Op::Delete),
        1 => any::<u8>().prop_map(Op::RemoveWithChildren),
    ]
}

/// Canonical relationship + position snapshot for whole-graph equality.
fn snapshot(graph: &BlockGraph) -> Vec<String> {
    let mut rows: Vec<String> = graph
        .all_blocks()
        .map(|b| {
            format!(
                "{} p:{:?} c:{:?} lf:{:?} ll:{:?} vt:{:?} at:{:?},{:?}",
                b.id,
                b.parent,
                b.child,
                b.loop_first_child,
                b.loop_last_child,
                b.value_target,
                b.position.x.to_bits(),
                b.position.y.to_bits(),
            )
        })
        .collect();
    rows.sort();
    rows
}

proptest! {
    #[test]
    fn prop_random_mutation_sequences_preserve_invariants(
        ops in proptest::collection::vec(op_strategy(), 0..80)
    ) {
        let mut graph = BlockGraph::new();
        let mut ids = Vec::new();
        for op in &ops {
            apply_op(&mut graph, &mut ids, op);
        }
        prop_assert!(graph.check_invariants().is_ok(), "{:?}", graph.check_invariants());
    }

    #[test]
    fn prop_deleted_ids_never_linger(
        ops in proptest::collection::vec(op_strategy(), 1..60),
        victim in any::<u8>()
    ) {
        let mut graph = BlockGraph::new();
        let mut ids = Vec::new();
        for op in &ops {
            apply_op(&mut graph, &mut ids, op);
        }
        if let Some(id) = pick(&ids, victim) {
            graph.delete_block(id);
            for block in graph.all_blocks() {
                prop_assert_ne!(block.parent, Some(id));
                prop_assert_ne!(block.child, Some(id));
                prop_assert_ne!(block.loop_first_child, Some(id));
                prop_assert_ne!(block.loop_last_child, Some(id));
                prop_assert_ne!(block.value_target, Some(id));
                prop_assert!(block.plugged_values().all(|v| v != id));
            }
        }
    }

    #[test]
    fn prop_cancelled_drag_is_identity(
        ops in proptest::collection::vec(op_strategy(), 1..50),
        dragged in any::<u8>(),
        dx in -2000.0f32..2000.0,
        dy in -2000.0f32..2000.0
    ) {
        let mut graph = BlockGraph::new();
        let mut ids = Vec::new();
        for op in &ops {
            apply_op(&mut graph, &mut ids, op);
        }
        let before = snapshot(&graph);

        let constants = LayoutConstants::default();
        let mut engine = DragConnectionEngine::new(constants);
        let spatial = LayoutSpatialQuery::new(constants);
        if let Some(id) = pick(&ids, dragged)
            && engine.start_drag(&mut graph, id, Vector2D::zero())
        {
            engine.update_drag_position(&mut graph, &spatial, Point2D::new(dx, dy));
            engine.clear_drag(&mut graph);
        }
        prop_assert_eq!(snapshot(&graph), before);
    }
}
