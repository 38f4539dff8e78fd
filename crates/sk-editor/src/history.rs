//! Undo/Redo history over whole-document snapshots.
//!
//! Every checkpoint is a full `DocumentSnapshot`; undo and redo replace the
//! whole document in one step instead of replaying inverse mutations.
//!
//! Index 0 of the undo stack is the baseline and is never undone past. A
//! restore re-creates every node, and the engine reports those re-creations
//! as ordinary mutation events, so `recording` is dropped for the duration
//! of the restore. Captures arriving in that window are suppressed. When
//! the engine finishes a load asynchronously the window stays open until
//! `finish_restore` is called.

use serde::{Deserialize, Serialize};
use sk_core::engine::{LoadStatus, SceneEngine};
use sk_core::error::{EngineError, RestoreError};
use sk_core::snapshot::{self, DocumentSnapshot};
use std::collections::VecDeque;

/// Bounds of the undo stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo depth, baseline included.
    pub max_size: usize,
    /// Fraction of `max_size` kept when the stack overflows. Trimming in a
    /// batch keeps long sessions from paying the eviction on every capture.
    pub trim_ratio: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            trim_ratio: 0.8,
        }
    }
}

impl HistoryConfig {
    /// Depth left after an overflow trim (at least 1).
    pub fn trim_target(&self) -> usize {
        let target = (self.max_size as f64 * self.trim_ratio).floor() as usize;
        target.clamp(1, self.max_size.max(1))
    }
}

/// What a capture did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Recording is off (a restore is in flight).
    Suppressed,
    /// The document equals the current top entry.
    Duplicate,
    /// A new entry was pushed; `evicted` old entries were dropped.
    Pushed { evicted: usize },
}

/// Result of undo, redo, load, or a restore completion.
#[derive(Debug)]
pub enum HistoryStatus {
    /// Nothing to do: empty stack, or no restore was pending.
    Nothing,
    /// Another restore has not finished yet.
    Busy,
    /// The document was replaced.
    Restored,
    /// The engine is still loading; call `finish_restore` when it is done.
    Pending,
    /// The restore failed. Stacks are as they were before the call.
    Failed(RestoreError),
}

impl HistoryStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, HistoryStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreKind {
    Undo,
    Redo,
    Load,
}

/// Snapshot-based undo/redo stacks with a reentrancy guard.
#[derive(Debug)]
pub struct History {
    undo_stack: VecDeque<DocumentSnapshot>,
    redo_stack: VecDeque<DocumentSnapshot>,
    /// Off while a restore is in flight.
    recording: bool,
    pending: Option<RestoreKind>,
    config: HistoryConfig,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl History {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            undo_stack: VecDeque::with_capacity(config.max_size.min(256) + 1),
            redo_stack: VecDeque::new(),
            recording: true,
            pending: None,
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Snapshot the document and push it unless it equals the top entry.
    pub fn capture<E: SceneEngine>(&mut self, engine: &E) -> CaptureOutcome {
        if !self.recording {
            return CaptureOutcome::Suppressed;
        }
        self.push(snapshot::capture(engine))
    }

    /// Push an already-built snapshot with the same rules as `capture`.
    pub fn push(&mut self, snapshot: DocumentSnapshot) -> CaptureOutcome {
        if !self.recording {
            return CaptureOutcome::Suppressed;
        }
        if self.undo_stack.back() == Some(&snapshot) {
            return CaptureOutcome::Duplicate;
        }

        self.undo_stack.push_back(snapshot);
        self.redo_stack.clear();

        let mut evicted = 0;
        if self.undo_stack.len() > self.config.max_size.max(1) {
            let keep = self.config.trim_target();
            evicted = self.undo_stack.len() - keep;
            self.undo_stack.drain(..evicted);
            log::debug!("history overflow: evicted {evicted} oldest entries");
        }
        log::trace!(
            "history capture: depth {} (redo cleared)",
            self.undo_stack.len()
        );
        CaptureOutcome::Pushed { evicted }
    }

    /// Step back one entry.
    pub fn undo<E: SceneEngine>(&mut self, engine: &mut E) -> HistoryStatus {
        if self.pending.is_some() {
            return HistoryStatus::Busy;
        }
        if self.undo_stack.len() <= 1 {
            return HistoryStatus::Nothing;
        }
        let Some(top) = self.undo_stack.pop_back() else {
            return HistoryStatus::Nothing;
        };
        self.redo_stack.push_back(top);
        let Some(target) = self.undo_stack.back().cloned() else {
            return HistoryStatus::Nothing;
        };
        self.restore(engine, &target, RestoreKind::Undo)
    }

    /// Step forward one entry.
    pub fn redo<E: SceneEngine>(&mut self, engine: &mut E) -> HistoryStatus {
        if self.pending.is_some() {
            return HistoryStatus::Busy;
        }
        let Some(next) = self.redo_stack.pop_back() else {
            return HistoryStatus::Nothing;
        };
        self.undo_stack.push_back(next.clone());
        self.restore(engine, &next, RestoreKind::Redo)
    }

    /// Replace the document with `payload` and make it the new baseline.
    pub fn load<E: SceneEngine>(&mut self, engine: &mut E, payload: &str) -> HistoryStatus {
        if self.pending.is_some() {
            return HistoryStatus::Busy;
        }
        let target = match DocumentSnapshot::from_payload(payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("refusing to load document: {e}");
                return HistoryStatus::Failed(e.into());
            }
        };
        match self.restore(engine, &target, RestoreKind::Load) {
            HistoryStatus::Restored => {
                self.rebase(engine);
                HistoryStatus::Restored
            }
            other => other,
        }
    }

    fn restore<E: SceneEngine>(
        &mut self,
        engine: &mut E,
        target: &DocumentSnapshot,
        kind: RestoreKind,
    ) -> HistoryStatus {
        self.recording = false;
        match snapshot::restore(engine, target.payload()) {
            Ok(LoadStatus::Complete) => {
                self.recording = true;
                HistoryStatus::Restored
            }
            Ok(LoadStatus::Pending) => {
                self.pending = Some(kind);
                HistoryStatus::Pending
            }
            Err(e) => {
                log::warn!("{kind:?} failed, history left unchanged: {e}");
                self.rollback(kind);
                self.recording = true;
                HistoryStatus::Failed(e)
            }
        }
    }

    /// Report completion of a load that `end_load` left pending.
    pub fn finish_restore<E: SceneEngine>(
        &mut self,
        engine: &E,
        result: Result<(), EngineError>,
    ) -> HistoryStatus {
        let Some(kind) = self.pending.take() else {
            return HistoryStatus::Nothing;
        };
        self.recording = true;
        match result {
            Ok(()) => {
                if kind == RestoreKind::Load {
                    self.rebase(engine);
                }
                HistoryStatus::Restored
            }
            Err(e) => {
                log::warn!("{kind:?} failed while loading, history left unchanged: {e}");
                self.rollback(kind);
                HistoryStatus::Failed(RestoreError::Engine(e))
            }
        }
    }

    fn rollback(&mut self, kind: RestoreKind) {
        match kind {
            RestoreKind::Undo => {
                if let Some(entry) = self.redo_stack.pop_back() {
                    self.undo_stack.push_back(entry);
                }
            }
            RestoreKind::Redo => {
                if let Some(entry) = self.undo_stack.pop_back() {
                    self.redo_stack.push_back(entry);
                }
            }
            RestoreKind::Load => {}
        }
    }

    fn rebase<E: SceneEngine>(&mut self, engine: &E) {
        self.reset();
        self.capture(engine);
        log::info!("history rebased on loaded document");
    }

    /// Drop both stacks. The next capture becomes the baseline.
    pub fn reset(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.recording = true;
        self.pending = None;
        log::info!("history reset");
    }

    pub fn can_undo(&self) -> bool {
        self.pending.is_none() && self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        self.pending.is_none() && !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_restoring(&self) -> bool {
        self.pending.is_some()
    }

    /// The entry the document currently corresponds to.
    pub fn current(&self) -> Option<&DocumentSnapshot> {
        self.undo_stack.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sk_core::memory::MemoryEngine;
    use sk_core::model::{NodeKind, SceneNodeRecord};

    fn rect(x: f64) -> SceneNodeRecord {
        SceneNodeRecord::new(NodeKind::Rect).with_size(10.0, 10.0).at(x, 0.0)
    }

    #[test]
    fn capture_twice_is_deduplicated() {
        let mut engine = MemoryEngine::new();
        engine.add(&rect(0.0));
        let mut history = History::default();

        assert_eq!(history.capture(&engine), CaptureOutcome::Pushed { evicted: 0 });
        assert_eq!(history.capture(&engine), CaptureOutcome::Duplicate);
        assert_eq!(history.undo_depth(), 1);
    }

    #[test]
    fn baseline_is_never_undone() {
        let engine_doc = rect(0.0);
        let mut engine = MemoryEngine::new();
        engine.add(&engine_doc);
        let mut history = History::default();
        history.capture(&engine);

        assert!(!history.can_undo());
        assert!(matches!(history.undo(&mut engine), HistoryStatus::Nothing));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn undo_then_redo_restores_latest() {
        let mut engine = MemoryEngine::new();
        let mut history = History::default();
        history.capture(&engine);
        let h = engine.add(&rect(0.0));
        history.capture(&engine);
        engine.move_by(h, 25.0, 5.0);
        history.capture(&engine);
        let latest = history.current().cloned().unwrap();

        assert!(matches!(history.undo(&mut engine), HistoryStatus::Restored));
        assert!(matches!(history.undo(&mut engine), HistoryStatus::Restored));
        assert!(engine.is_empty());
        assert_eq!(history.redo_depth(), 2);

        assert!(matches!(history.redo(&mut engine), HistoryStatus::Restored));
        assert!(matches!(history.redo(&mut engine), HistoryStatus::Restored));
        assert_eq!(snapshot::capture(&engine), latest);
        assert!(!history.can_redo());
        assert!(matches!(history.redo(&mut engine), HistoryStatus::Nothing));
    }

    #[test]
    fn new_capture_clears_redo() {
        let mut engine = MemoryEngine::new();
        let mut history = History::default();
        history.capture(&engine);
        engine.add(&rect(0.0));
        history.capture(&engine);

        history.undo(&mut engine);
        assert!(history.can_redo());

        engine.add(&rect(50.0));
        history.capture(&engine);
        assert!(!history.can_redo());
    }

    #[test]
    fn overflow_trims_to_ratio_oldest_first() {
        let mut engine = MemoryEngine::new();
        let h = engine.add(&rect(0.0));
        let mut history = History::new(HistoryConfig {
            max_size: 10,
            trim_ratio: 0.8,
        });

        let mut captured = Vec::new();
        for _ in 0..13 {
            engine.move_by(h, 1.0, 0.0);
            history.capture(&engine);
            captured.push(history.current().cloned().unwrap());
        }

        assert!(history.undo_depth() <= 10);
        // 11th push overflowed to 8, then two more.
        assert_eq!(history.undo_depth(), 10);
        let mut undone = 0;
        while history.can_undo() {
            history.undo(&mut engine);
            undone += 1;
        }
        assert_eq!(undone, 9);
        assert_eq!(history.current(), Some(&captured[3]));
    }

    #[test]
    fn trim_target_never_drops_below_one() {
        let config = HistoryConfig {
            max_size: 1,
            trim_ratio: 0.1,
        };
        assert_eq!(config.trim_target(), 1);
        assert_eq!(HistoryConfig::default().trim_target(), 40);
    }

    #[test]
    fn deferred_load_keeps_guard_until_finished() {
        let mut engine = MemoryEngine::new();
        let mut history = History::default();
        history.capture(&engine);
        engine.add(&rect(0.0));
        history.capture(&engine);

        engine.set_deferred_loads(true);
        assert!(matches!(history.undo(&mut engine), HistoryStatus::Pending));
        assert!(!history.is_recording());
        assert_eq!(history.capture(&engine), CaptureOutcome::Suppressed);
        assert!(matches!(history.redo(&mut engine), HistoryStatus::Busy));

        engine.complete_load();
        assert!(matches!(
            history.finish_restore(&engine, Ok(())),
            HistoryStatus::Restored
        ));
        assert!(history.is_recording());
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.redo_depth(), 1);
        assert!(matches!(
            history.finish_restore(&engine, Ok(())),
            HistoryStatus::Nothing
        ));
    }

    #[test]
    fn failed_restore_leaves_stacks_untouched() {
        let mut engine = MemoryEngine::new();
        let mut history = History::default();
        history.capture(&engine);
        engine.add(&rect(0.0));
        history.capture(&engine);

        engine.fail_next_load("document locked");
        let status = history.undo(&mut engine);
        assert!(matches!(
            status,
            HistoryStatus::Failed(RestoreError::Engine(EngineError::Load(_)))
        ));
        assert!(history.is_recording());
        assert_eq!(history.undo_depth(), 2);
        assert_eq!(history.redo_depth(), 0);

        // A later undo works normally.
        assert!(matches!(history.undo(&mut engine), HistoryStatus::Restored));
        assert!(engine.is_empty());
    }

    #[test]
    fn deferred_failure_rolls_back_redo() {
        let mut engine = MemoryEngine::new();
        let mut history = History::default();
        history.capture(&engine);
        engine.add(&rect(0.0));
        history.capture(&engine);
        history.undo(&mut engine);

        engine.set_deferred_loads(true);
        assert!(matches!(history.redo(&mut engine), HistoryStatus::Pending));
        let status = history.finish_restore(&engine, Err(EngineError::Load("gpu lost".into())));
        assert!(status.is_failed());
        assert_eq!(history.undo_depth(), 1);
        assert_eq!(history.redo_depth(), 1);
    }

    #[test]
    fn reset_drops_everything_and_keeps_recording() {
        let mut engine = MemoryEngine::new();
        let mut history = History::default();
        history.capture(&engine);
        engine.add(&rect(0.0));
        history.capture(&engine);
        history.undo(&mut engine);

        history.reset();
        assert_eq!(history.undo_depth(), 0);
        assert_eq!(history.redo_depth(), 0);
        assert!(history.is_recording());
        assert_eq!(history.capture(&engine), CaptureOutcome::Pushed { evicted: 0 });
    }

    #[test]
    fn load_rebases_history() {
        let mut source = MemoryEngine::new();
        source.add(&rect(5.0));
        source.add(&rect(15.0));
        let payload = snapshot::capture(&source).payload().to_string();

        let mut engine = MemoryEngine::new();
        let mut history = History::default();
        history.capture(&engine);
        engine.add(&rect(0.0));
        history.capture(&engine);

        assert!(matches!(history.load(&mut engine, &payload), HistoryStatus::Restored));
        assert_eq!(engine.len(), 2);
        assert_eq!(history.undo_depth(), 1);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn load_rejects_malformed_payload() {
        let mut engine = MemoryEngine::new();
        engine.add(&rect(0.0));
        let mut history = History::default();
        history.capture(&engine);

        let status = history.load(&mut engine, "{not json");
        assert!(matches!(status, HistoryStatus::Failed(RestoreError::Malformed(_))));
        assert_eq!(engine.len(), 1);
        assert_eq!(history.undo_depth(), 1);
    }
}
