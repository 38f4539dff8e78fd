//! Integration tests: snapshot history driven through `EditorSession`.
//!
//! Events flow from the in-memory engine through the coalescer into the
//! history, the same way a host application would wire them.

use pretty_assertions::assert_eq;
use sk_core::engine::{MutationEvent, SceneEngine};
use sk_core::id::NodeId;
use sk_core::memory::MemoryEngine;
use sk_core::model::{NodeKind, SceneNodeRecord};
use sk_core::snapshot;
use sk_editor::{CaptureOutcome, EditorSession, HistoryConfig, HistoryStatus, SessionConfig};
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn start_empty() -> (MemoryEngine, EditorSession) {
    init_logging();
    let mut engine = MemoryEngine::new();
    let mut session = EditorSession::default();
    assert_eq!(session.start(&mut engine), CaptureOutcome::Pushed { evicted: 0 });
    (engine, session)
}

// ─── Gesture scenario ───────────────────────────────────────────────────

#[test]
fn drag_then_text_undo_redo_round_trip() {
    let (mut engine, mut session) = start_empty();
    let t0 = Instant::now();
    let baseline = session.snapshot(&engine);

    // Drop a rectangle and drag it: one debounced capture for the gesture.
    let rect = engine.add(
        &SceneNodeRecord::new(NodeKind::Rect)
            .with_size(80.0, 40.0)
            .with_id(NodeId::intern("card")),
    );
    let mut captures = 0;
    for frame in 0..12u64 {
        engine.move_by(rect, 3.0, 1.0);
        if session.pump(&mut engine, t0 + ms(frame * 16)).is_some() {
            captures += 1;
        }
    }
    let drag_end = t0 + ms(11 * 16);
    assert_eq!(session.pump(&mut engine, drag_end + ms(50)), None);
    assert_eq!(
        session.pump(&mut engine, drag_end + ms(100)),
        Some(CaptureOutcome::Pushed { evicted: 0 })
    );
    captures += 1;
    assert_eq!(captures, 1);

    // Add a text node and edit it: the edit captures immediately.
    let t1 = drag_end + ms(1_000);
    let label = engine.add(
        &SceneNodeRecord::new(NodeKind::Text)
            .with_text("draft")
            .with_id(NodeId::intern("label")),
    );
    engine.set_prop(label, "text", "final".into());
    assert_eq!(
        session.pump(&mut engine, t1),
        Some(CaptureOutcome::Pushed { evicted: 0 })
    );
    // The add's debounce lane fires later and finds nothing new.
    assert_eq!(
        session.pump(&mut engine, t1 + ms(100)),
        Some(CaptureOutcome::Duplicate)
    );
    let edited = session.snapshot(&engine);
    assert_eq!(session.history().undo_depth(), 3);

    assert!(matches!(session.undo(&mut engine), HistoryStatus::Restored));
    assert!(matches!(session.undo(&mut engine), HistoryStatus::Restored));
    assert!(engine.is_empty());
    assert_eq!(session.snapshot(&engine), baseline);
    assert!(!session.can_undo());

    assert!(matches!(session.redo(&mut engine), HistoryStatus::Restored));
    assert!(matches!(session.redo(&mut engine), HistoryStatus::Restored));
    assert_eq!(session.snapshot(&engine), edited);
    assert_eq!(
        engine.top_level_ids(),
        vec![Some(NodeId::intern("card")), Some(NodeId::intern("label"))]
    );
    let x = engine.prop(engine.top_level()[0], "x").and_then(|v| v.as_f64());
    assert_eq!(x, Some(36.0));
}

// ─── Guard ──────────────────────────────────────────────────────────────

#[test]
fn restore_never_schedules_a_capture() {
    let (mut engine, mut session) = start_empty();
    let t0 = Instant::now();
    engine.add(&SceneNodeRecord::new(NodeKind::Circle));
    engine.add(&SceneNodeRecord::new(NodeKind::Ellipse));
    session.pump(&mut engine, t0);
    session.pump(&mut engine, t0 + ms(100));
    assert_eq!(session.history().undo_depth(), 2);

    assert!(matches!(session.undo(&mut engine), HistoryStatus::Restored));
    for step in 0..10u64 {
        assert_eq!(session.pump(&mut engine, t0 + ms(200 + step * 100)), None);
    }
    assert_eq!(session.history().undo_depth(), 1);
    assert!(session.can_redo());

    assert!(matches!(session.redo(&mut engine), HistoryStatus::Restored));
    assert_eq!(session.pump(&mut engine, t0 + ms(5_000)), None);
    assert_eq!(engine.len(), 2);
    assert!(!session.can_redo());
}

#[test]
fn deferred_restore_drops_events_until_finished() {
    let (mut engine, mut session) = start_empty();
    engine.add(&SceneNodeRecord::new(NodeKind::Rect));
    session.capture(&engine);
    engine.drain_events();

    engine.set_deferred_loads(true);
    assert!(matches!(session.undo(&mut engine), HistoryStatus::Pending));
    assert!(!session.is_recording());
    assert!(!session.can_undo());
    assert!(!session.can_redo());
    assert!(matches!(session.redo(&mut engine), HistoryStatus::Busy));

    // The engine keeps streaming events while it finishes the load.
    let now = Instant::now();
    assert_eq!(session.handle_event(MutationEvent::Added, now), None);
    assert_eq!(session.handle_event(MutationEvent::Modified, now), None);
    assert_eq!(session.tick(&engine, now + ms(500)), None);

    engine.complete_load();
    assert!(matches!(
        session.finish_restore(&mut engine, Ok(())),
        HistoryStatus::Restored
    ));
    assert!(session.is_recording());
    assert_eq!(session.history().undo_depth(), 1);
    assert_eq!(session.history().redo_depth(), 1);
    assert!(engine.is_empty());
}

// ─── Bounds and dedup ───────────────────────────────────────────────────

#[test]
fn identical_captures_are_not_stacked() {
    let (mut engine, mut session) = start_empty();
    engine.add(&SceneNodeRecord::new(NodeKind::Triangle));
    assert_eq!(session.capture(&engine), CaptureOutcome::Pushed { evicted: 0 });
    assert_eq!(session.capture(&engine), CaptureOutcome::Duplicate);
    assert_eq!(session.capture(&engine), CaptureOutcome::Duplicate);
    assert_eq!(session.history().undo_depth(), 2);
}

#[test]
fn history_depth_stays_bounded() {
    init_logging();
    let mut engine = MemoryEngine::new();
    let h = engine.add(&SceneNodeRecord::new(NodeKind::Rect));
    let mut session = EditorSession::new(SessionConfig {
        history: HistoryConfig {
            max_size: 20,
            trim_ratio: 0.8,
        },
        ..SessionConfig::default()
    });
    session.start(&mut engine);

    for _ in 0..100 {
        engine.move_by(h, 1.0, 1.0);
        session.capture(&engine);
        assert!(session.history().undo_depth() <= 20);
    }
    let mut undone = 0;
    while session.can_undo() {
        session.undo(&mut engine);
        undone += 1;
    }
    assert!(undone < 20);
    assert!(!engine.is_empty());
}

#[test]
fn undo_redo_is_an_inverse_pair() {
    let (mut engine, mut session) = start_empty();
    let a = engine.add(&SceneNodeRecord::new(NodeKind::Rect).with_size(10.0, 10.0));
    session.capture(&engine);
    engine.move_by(a, 15.0, 0.0);
    session.capture(&engine);
    engine.add(&SceneNodeRecord::new(NodeKind::Line));
    session.capture(&engine);

    let before = snapshot::capture(&engine);
    session.undo(&mut engine);
    assert_ne!(snapshot::capture(&engine), before);
    session.redo(&mut engine);
    assert_eq!(snapshot::capture(&engine), before);
}

// ─── Bulk load ──────────────────────────────────────────────────────────

#[test]
fn load_document_starts_a_fresh_history() {
    let mut source = MemoryEngine::new();
    source.add(&SceneNodeRecord::new(NodeKind::Image).with_size(64.0, 64.0));
    source.add(&SceneNodeRecord::new(NodeKind::Text).with_text("caption"));
    let payload = snapshot::capture(&source).payload().to_string();

    let (mut engine, mut session) = start_empty();
    engine.add(&SceneNodeRecord::new(NodeKind::Rect));
    session.capture(&engine);
    assert!(session.can_undo());

    assert!(matches!(
        session.load_document(&mut engine, &payload),
        HistoryStatus::Restored
    ));
    assert_eq!(engine.len(), 2);
    assert!(!session.can_undo());
    assert!(!session.can_redo());
    assert_eq!(session.pump(&mut engine, Instant::now() + ms(1_000)), None);

    assert!(session.load_document(&mut engine, "[]]").is_failed());
    assert_eq!(engine.len(), 2);
}
