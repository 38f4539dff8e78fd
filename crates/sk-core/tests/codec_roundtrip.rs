//! Integration tests: node codec and snapshots against the in-memory engine.
//!
//! Covers the encode fallback chain end to end and the record-level
//! guarantees the history and clipboard rely on.

use pretty_assertions::assert_eq;
use sk_core::codec::{Placement, Tier, decode, encode, encode_with_tier};
use sk_core::engine::SceneEngine;
use sk_core::id::NodeId;
use sk_core::memory::{MemoryEngine, NativeMode};
use sk_core::model::{NodeKind, SceneNodeRecord};
use sk_core::snapshot;

fn nested_group() -> SceneNodeRecord {
    SceneNodeRecord::new(NodeKind::Group)
        .at(200.0, 120.0)
        .with_id(NodeId::intern("outer"))
        .with_children(vec![
            SceneNodeRecord::new(NodeKind::Rect).with_size(50.0, 30.0).with_fill("#0ea5e9"),
            SceneNodeRecord::new(NodeKind::Group).with_children(vec![
                SceneNodeRecord::new(NodeKind::Text).with_text("deep"),
                SceneNodeRecord::new(NodeKind::Line).at(3.0, 4.0),
            ]),
        ])
}

// ─── Round-trip ─────────────────────────────────────────────────────────

#[test]
fn duplicate_round_trip_matches_modulo_offset_and_ids() {
    let mut engine = MemoryEngine::new();
    let handle = engine.add(&nested_group());
    let record = encode(&engine, handle);

    let copy = decode(&mut engine, &record, Placement::Duplicate { dx: 10.0, dy: 10.0 }).unwrap();
    let mut copied = encode(&engine, copy);
    assert_eq!(copied.geometry.x, 210.0);
    assert_eq!(copied.geometry.y, 130.0);

    copied.geometry.x = record.geometry.x;
    copied.geometry.y = record.geometry.y;
    strip_ids(&mut copied);
    let mut expected = record.clone();
    strip_ids(&mut expected);
    assert_eq!(copied, expected);
}

fn strip_ids(record: &mut SceneNodeRecord) {
    record.id = None;
    for child in &mut record.children {
        strip_ids(child);
    }
}

#[test]
fn nested_groups_keep_shape() {
    let mut engine = MemoryEngine::new();
    let handle = engine.add(&nested_group());
    let record = encode(&engine, handle);

    assert_eq!(record.subtree_len(), 5);
    assert_eq!(record.children[1].children[0].text.as_deref(), Some("deep"));

    let rebuilt = decode(&mut engine, &record, Placement::Restore).unwrap();
    let inner = engine.children(rebuilt)[1];
    assert_eq!(engine.children(inner).len(), 2);
    assert_eq!(encode(&engine, rebuilt), record);
}

// ─── Fallback chain ─────────────────────────────────────────────────────

#[test]
fn every_failure_mode_still_yields_one_record() {
    let mut engine = MemoryEngine::new();
    let healthy = engine.add(&SceneNodeRecord::new(NodeKind::Rect).with_size(9.0, 9.0));
    let garbled = engine.add(&SceneNodeRecord::new(NodeKind::Ellipse));
    let unreadable = engine.add(&SceneNodeRecord::new(NodeKind::Image).at(12.0, 0.0));
    engine.set_native_mode(garbled, NativeMode::Garbled);
    engine.set_native_mode(unreadable, NativeMode::Fails);
    engine.set_fields_fail(unreadable, true);

    let tiers: Vec<Tier> = [healthy, garbled, unreadable]
        .into_iter()
        .map(|h| encode_with_tier(&engine, h).1)
        .collect();
    assert_eq!(tiers, vec![Tier::Native, Tier::Fields, Tier::Placeholder]);

    let snapshot = snapshot::capture(&engine);
    assert_eq!(snapshot.len(), 3);
    let kinds: Vec<_> = snapshot.nodes().iter().map(|r| r.known_kind()).collect();
    assert_eq!(
        kinds,
        vec![Some(NodeKind::Rect), Some(NodeKind::Ellipse), Some(NodeKind::Image)]
    );
}

#[test]
fn snapshot_with_placeholder_restores_in_order() {
    let mut engine = MemoryEngine::new();
    engine.add(&SceneNodeRecord::new(NodeKind::Rect).with_id(NodeId::intern("a")));
    let broken = engine.add(&SceneNodeRecord::new(NodeKind::Text).with_id(NodeId::intern("b")));
    engine.add(&SceneNodeRecord::new(NodeKind::Circle).with_id(NodeId::intern("c")));
    engine.set_native_mode(broken, NativeMode::Fails);
    engine.set_fields_fail(broken, true);

    let payload = snapshot::capture(&engine).payload().to_string();
    let mut target = MemoryEngine::new();
    snapshot::restore(&mut target, &payload).unwrap();

    assert_eq!(
        target.top_level_ids(),
        vec![
            Some(NodeId::intern("a")),
            Some(NodeId::intern("b")),
            Some(NodeId::intern("c")),
        ]
    );
    let middle = encode(&target, target.top_level()[1]);
    assert!(middle.is_placeholder());
    assert!(!middle.geometry.visible);
    assert!(middle.selectable);
}

#[test]
fn values_past_single_precision_survive_a_snapshot() {
    let mut engine = MemoryEngine::new();
    engine.add_custom(
        "rect",
        serde_json::json!({ "x": 16_777_217.0, "y": 123.456_789_012, "width": 1e300 }),
    );
    let payload = snapshot::capture(&engine).payload().to_string();

    let mut target = MemoryEngine::new();
    snapshot::restore(&mut target, &payload).unwrap();
    let record = encode(&target, target.top_level()[0]);
    assert_eq!(record.geometry.x, 16_777_217.0);
    assert_eq!(record.geometry.y, 123.456_789_012);
    assert_eq!(record.width, Some(1e300));
}
