//! End-to-end scenarios over the public surface: store, validator, drag
//! engine, and culling working together.

use block_canvas::{
    Anchor, AnchorKind, BlockGraph, BlockKind, BlockPatch, ConnectionCapability, ContentItem,
    CullingReport, DragConnectionEngine, LayoutConstants, LayoutSpatialQuery, SpatialQuery,
    Viewport,
};
use euclid::default::{Point2D, Size2D, Vector2D};

#[test]
fn scenarios_smoke_version_is_set() {
    assert!(!block_canvas::VERSION.is_empty());
}

fn setup_engine() -> (BlockGraph, DragConnectionEngine, LayoutSpatialQuery, LayoutConstants) {
    let constants = LayoutConstants::default();
    (
        BlockGraph::new(),
        DragConnectionEngine::new(constants),
        LayoutSpatialQuery::new(constants),
        constants,
    )
}

#[test]
fn ordinary_connect_links_both_directions() {
    let mut graph = BlockGraph::new();
    let a = graph.create_block(BlockKind::Works, Point2D::new(0.0, 0.0));
    let b = graph.create_block(BlockKind::Works, Point2D::new(240.0, 120.0));
    graph
        .update_block(a, BlockPatch { capability: Some(ConnectionCapability::Output), ..Default::default() })
        .unwrap();
    graph
        .update_block(b, BlockPatch { capability: Some(ConnectionCapability::Input), ..Default::default() })
        .unwrap();

    assert!(graph.connect_blocks(a, b, false));
    assert_eq!(graph.get_block(a).unwrap().child, Some(b));
    assert_eq!(graph.get_block(b).unwrap().parent, Some(a));
    graph.check_invariants().unwrap();
}

#[test]
fn cycle_closing_edge_is_rejected() {
    let mut graph = BlockGraph::new();
    let a = graph.create_block(BlockKind::Works, Point2D::new(0.0, 0.0));
    let b = graph.create_block(BlockKind::Works, Point2D::new(0.0, 60.0));
    let c = graph.create_block(BlockKind::Works, Point2D::new(0.0, 120.0));
    assert!(graph.connect_blocks(a, b, false));
    assert!(graph.connect_blocks(b, c, false));

    assert!(!graph.validate_block_connection(c, a, AnchorKind::Output));
    assert!(!graph.connect_blocks(c, a, false));
    // The chain is untouched by the rejected edge.
    assert_eq!(graph.get_block(c).unwrap().child, None);
    graph.check_invariants().unwrap();
}

#[test]
fn loop_members_splice_in_connection_order() {
    let mut graph = BlockGraph::new();
    let l = graph.create_block(BlockKind::Loop, Point2D::new(0.0, 0.0));
    let x = graph.create_block(BlockKind::Works, Point2D::new(300.0, 0.0));
    let y = graph.create_block(BlockKind::Works, Point2D::new(300.0, 60.0));

    assert!(graph.connect_blocks(l, x, true));
    assert!(graph.connect_blocks(l, y, true));

    let loop_block = graph.get_block(l).unwrap();
    assert_eq!(loop_block.loop_first_child, Some(x));
    assert_eq!(loop_block.loop_last_child, Some(y));
    assert_eq!(graph.get_block(x).unwrap().child, Some(y));
    graph.check_invariants().unwrap();
}

#[test]
fn drag_connect_plugs_value_into_slot() {
    let (mut graph, mut engine, spatial, constants) = setup_engine();
    let target = graph.create_block_with_content(
        BlockKind::Move,
        Point2D::new(0.0, 0.0),
        vec![ContentItem::text("label", "move"), ContentItem::value_slot("s1")],
    );
    let value = graph.create_block(BlockKind::Value, Point2D::new(600.0, 600.0));

    assert!(engine.start_drag(&mut graph, value, Vector2D::zero()));
    let slot_rect = spatial
        .anchor_rect(&graph, &Anchor::value_input(target, "s1"))
        .expect("slot anchor");
    engine.update_drag_position(&mut graph, &spatial, slot_rect.origin);
    assert!(engine.end_drag(&mut graph, None));

    assert!(graph.get_block(target).unwrap().plugged_values().any(|v| v == value));
    assert_eq!(graph.get_block(value).unwrap().value_target, Some(target));
    assert_eq!(
        graph.get_block(value).unwrap().position,
        Point2D::new(0.0, 0.0) + block_canvas::layout::value_slot_offset(1, &constants)
    );
    graph.check_invariants().unwrap();
}

#[test]
fn ten_thousand_blocks_cull_to_the_handful_on_screen() {
    let constants = LayoutConstants::default();
    let mut graph = BlockGraph::new();
    // Twenty blocks inside a 1920x1080 viewport at zoom 1.0; the rest far
    // outside the margin-expanded rectangle.
    for i in 0..20 {
        graph.create_block(
            BlockKind::Works,
            Point2D::new(50.0 + (i % 5) as f32 * 300.0, 50.0 + (i / 5) as f32 * 220.0),
        );
    }
    for i in 0..9_980u32 {
        let column = (i % 200) as f32;
        let row = (i / 200) as f32;
        graph.create_block(
            BlockKind::Works,
            Point2D::new(10_000.0 + column * 400.0, 10_000.0 + row * 400.0),
        );
    }

    let visible = block_canvas::render::calculate_visible_blocks(
        graph.all_blocks(),
        &Viewport::new(0.0, 0.0, 1.0),
        Size2D::new(1920.0, 1080.0),
        &constants,
    );
    assert_eq!(visible.len(), 20);
    let report = CullingReport::new(graph.block_count(), visible.len());
    assert!(report.efficiency() > 0.9);
}

#[test]
fn drop_in_empty_space_closes_gap_and_keeps_position() {
    let (mut graph, mut engine, spatial, _) = setup_engine();
    let parent = graph.create_block(BlockKind::Flag, Point2D::new(0.0, 0.0));
    let dragged = graph.create_block(BlockKind::Works, Point2D::new(0.0, 48.0));
    graph.connect_blocks(parent, dragged, false);

    assert!(engine.start_drag(&mut graph, dragged, Vector2D::zero()));
    engine.update_drag_position(&mut graph, &spatial, Point2D::new(2_000.0, 1_500.0));
    assert!(engine.end_drag(&mut graph, None));

    assert_eq!(graph.get_block(parent).unwrap().child, None);
    assert_eq!(graph.get_block(dragged).unwrap().parent, None);
    assert_eq!(
        graph.get_block(dragged).unwrap().position,
        Point2D::new(2_000.0, 1_500.0)
    );
    graph.check_invariants().unwrap();
}

#[test]
fn failed_drop_restores_the_exact_pre_drag_state() {
    let (mut graph, mut engine, spatial, _) = setup_engine();
    let flag = graph.create_block(BlockKind::Flag, Point2D::new(0.0, 0.0));
    let occupant = graph.create_block(BlockKind::Works, Point2D::new(0.0, 48.0));
    graph.connect_blocks(flag, occupant, false);
    let dragged = graph.create_block(BlockKind::Works, Point2D::new(500.0, 100.0));

    assert!(engine.start_drag(&mut graph, dragged, Vector2D::zero()));
    engine.update_drag_position(&mut graph, &spatial, Point2D::new(520.0, 180.0));

    let stale = block_canvas::SnapTarget {
        anchor: Anchor::output(flag),
        rect: spatial
            .anchor_rect(&graph, &Anchor::output(flag))
            .expect("anchor rect"),
        distance: 0.0,
        overlap: 0.0,
        valid: true,
    };
    assert!(!engine.end_drag(&mut graph, Some(stale)));

    assert_eq!(graph.get_block(dragged).unwrap().position, Point2D::new(500.0, 100.0));
    assert_eq!(graph.get_block(dragged).unwrap().parent, None);
    assert_eq!(graph.get_block(flag).unwrap().child, Some(occupant));
    graph.check_invariants().unwrap();
}

#[test]
fn block_snapshots_round_trip_through_serde() {
    let mut graph = BlockGraph::new();
    let host = graph.create_block_with_content(
        BlockKind::Move,
        Point2D::new(12.5, -4.0),
        vec![ContentItem::text("label", "move"), ContentItem::value_slot("s1")],
    );
    let value = graph.create_block(BlockKind::Value, Point2D::new(40.0, 8.0));
    graph.plug_value_block(host, value, "s1");

    let block = graph.get_block(host).unwrap();
    let json = serde_json::to_string(block).unwrap();
    let restored: block_canvas::Block = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.id, block.id);
    assert_eq!(restored.position, block.position);
    assert_eq!(restored.content, block.content);
}
