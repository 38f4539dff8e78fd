//! One editing session over one document.
//!
//! `EditorSession` owns the history, the clipboard and the coalescer and
//! routes engine mutation events between them. The host drives it from a
//! single thread: forward events (or call `pump`), call `tick` when the
//! deadline from `next_deadline` passes, and call `finish_restore` when the
//! engine completes a load it reported as pending.
//!
//! While the history is restoring, every engine event is dropped and any
//! pending capture is cancelled, so a restore never schedules a capture of
//! its own result.

use crate::clipboard::{ClipStore, Clipboard, ClipboardConfig, MemoryClipStore};
use crate::coalescer::{Coalescer, CoalescerConfig, Lane};
use crate::error::ClipboardError;
use crate::history::{CaptureOutcome, History, HistoryConfig, HistoryStatus};
use serde::{Deserialize, Serialize};
use sk_core::engine::{MutationEvent, SceneEngine};
use sk_core::error::EngineError;
use sk_core::snapshot::{self, DocumentSnapshot};
use smallvec::SmallVec;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub history: HistoryConfig,
    pub coalescer: CoalescerConfig,
    pub clipboard: ClipboardConfig,
}

#[derive(Debug)]
pub struct EditorSession<S: ClipStore = MemoryClipStore> {
    history: History,
    clipboard: Clipboard<S>,
    coalescer: Coalescer,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl EditorSession {
    /// Session with a process-local clip slot.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_store(MemoryClipStore::new(), config)
    }
}

impl<S: ClipStore> EditorSession<S> {
    pub fn with_store(store: S, config: SessionConfig) -> Self {
        Self {
            history: History::new(config.history),
            clipboard: Clipboard::new(store, config.clipboard),
            coalescer: Coalescer::new(config.coalescer),
        }
    }

    /// Begin tracking `engine`: forget earlier events and history, then
    /// capture the baseline.
    pub fn start<E: SceneEngine>(&mut self, engine: &mut E) -> CaptureOutcome {
        let stale = engine.drain_events().len();
        if stale > 0 {
            log::debug!("dropping {stale} events from before the session started");
        }
        self.coalescer.cancel_all();
        self.history.reset();
        self.history.capture(&*engine)
    }

    // ─── Event routing ───────────────────────────────────────────────────

    /// Feed one mutation event. Dropped while a restore is in flight.
    pub fn handle_event(&mut self, event: MutationEvent, now: Instant) -> Option<Lane> {
        if !self.history.is_recording() {
            log::trace!("ignoring {event:?} during restore");
            return None;
        }
        self.coalescer.on_event(event, now)
    }

    /// Capture if a coalescer lane is due at `now`.
    pub fn tick<E: SceneEngine>(&mut self, engine: &E, now: Instant) -> Option<CaptureOutcome> {
        if !self.history.is_recording() {
            self.coalescer.cancel_all();
            return None;
        }
        if self.coalescer.poll(now) {
            Some(self.history.capture(engine))
        } else {
            None
        }
    }

    /// Drain the engine's queued events into the coalescer, then `tick`.
    pub fn pump<E: SceneEngine>(&mut self, engine: &mut E, now: Instant) -> Option<CaptureOutcome> {
        for event in engine.drain_events() {
            self.handle_event(event, now);
        }
        self.tick(&*engine, now)
    }

    /// When the host should call `tick` next.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.coalescer.next_deadline(now)
    }

    // ─── History ─────────────────────────────────────────────────────────

    /// Capture right away. Pending coalesced captures are covered by it.
    pub fn capture<E: SceneEngine>(&mut self, engine: &E) -> CaptureOutcome {
        self.coalescer.cancel_all();
        self.history.capture(engine)
    }

    pub fn undo<E: SceneEngine>(&mut self, engine: &mut E) -> HistoryStatus {
        self.flush(engine);
        let status = self.history.undo(engine);
        self.settle(engine, &status);
        status
    }

    pub fn redo<E: SceneEngine>(&mut self, engine: &mut E) -> HistoryStatus {
        self.flush(engine);
        let status = self.history.redo(engine);
        self.settle(engine, &status);
        status
    }

    /// Report that the engine finished a load it left pending.
    pub fn finish_restore<E: SceneEngine>(
        &mut self,
        engine: &mut E,
        result: Result<(), EngineError>,
    ) -> HistoryStatus {
        self.discard_events(engine);
        self.history.finish_restore(&*engine, result)
    }

    /// Replace the document with a serialized snapshot and start a new
    /// history from it.
    pub fn load_document<E: SceneEngine>(&mut self, engine: &mut E, payload: &str) -> HistoryStatus {
        self.discard_events(engine);
        let status = self.history.load(engine, payload);
        self.settle(engine, &status);
        if matches!(status, HistoryStatus::Restored) {
            log::info!("loaded document with {} top-level nodes", engine.top_level().len());
        }
        status
    }

    /// Drop both stacks and every pending capture.
    pub fn reset(&mut self) {
        self.coalescer.cancel_all();
        self.history.reset();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_recording(&self) -> bool {
        self.history.is_recording()
    }

    /// Snapshot of the live document, outside the history.
    pub fn snapshot<E: SceneEngine>(&self, engine: &E) -> DocumentSnapshot {
        snapshot::capture(engine)
    }

    /// Turn edits the engine already made into a capture before the stacks
    /// move, so undo steps back over them rather than past them.
    fn flush<E: SceneEngine>(&mut self, engine: &mut E) {
        if !self.history.is_recording() {
            self.discard_events(engine);
            return;
        }
        let now = Instant::now();
        for event in engine.drain_events() {
            self.coalescer.on_event(event, now);
        }
        if self.coalescer.has_pending() {
            log::debug!("flushing pending capture before history step");
            self.capture(&*engine);
        }
    }

    /// Drop events produced by a restore. Whatever the status, the engine
    /// may have queued removals and re-creations.
    fn settle<E: SceneEngine>(&mut self, engine: &mut E, status: &HistoryStatus) {
        match status {
            HistoryStatus::Nothing | HistoryStatus::Busy => {}
            HistoryStatus::Restored | HistoryStatus::Pending | HistoryStatus::Failed(_) => {
                self.discard_events(engine);
            }
        }
    }

    fn discard_events<E: SceneEngine>(&mut self, engine: &mut E) {
        let dropped = engine.drain_events().len();
        if dropped > 0 {
            log::trace!("discarded {dropped} restore events");
        }
        self.coalescer.cancel_all();
    }

    // ─── Clipboard ───────────────────────────────────────────────────────

    pub fn copy<E: SceneEngine>(
        &mut self,
        engine: &E,
        handles: &[E::Handle],
    ) -> Result<usize, ClipboardError> {
        self.clipboard.copy(engine, handles)
    }

    pub fn cut<E: SceneEngine>(
        &mut self,
        engine: &mut E,
        handles: &[E::Handle],
    ) -> Result<usize, ClipboardError> {
        self.clipboard.cut(engine, handles)
    }

    pub fn paste<E: SceneEngine>(
        &mut self,
        engine: &mut E,
    ) -> Result<SmallVec<[E::Handle; 4]>, ClipboardError> {
        self.clipboard.paste(engine)
    }

    pub fn duplicate<E: SceneEngine>(
        &mut self,
        engine: &mut E,
        handles: &[E::Handle],
    ) -> SmallVec<[E::Handle; 4]> {
        self.clipboard.duplicate(engine, handles)
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clipboard(&self) -> &Clipboard<S> {
        &self.clipboard
    }

    pub fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }
}
