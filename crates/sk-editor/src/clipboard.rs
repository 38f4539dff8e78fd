//! Copy, cut, paste and duplicate on top of the node codec.
//!
//! The clipboard never holds live nodes. A copy encodes the selection into
//! records and writes them to a [`ClipStore`]; a paste reads them back and
//! decodes fresh nodes with [`Placement::Duplicate`], so pasted nodes get new
//! ids and an offset. Repeated pastes of one payload walk down and to the
//! right instead of stacking on the same spot.

use crate::error::ClipboardError;
use serde::{Deserialize, Serialize};
use sk_core::codec::{self, Placement};
use sk_core::engine::SceneEngine;
use sk_core::error::EngineError;
use sk_core::model::SceneNodeRecord;
use smallvec::SmallVec;
use std::path::{Path, PathBuf};

/// Name of the clip slot, used as the file stem by [`FileClipStore`].
pub const CLIP_SLOT_KEY: &str = "scenekeep.clipboard";

// ─── Payload ─────────────────────────────────────────────────────────────

/// Contents of the clip slot.
///
/// A single node is stored bare and a multi-node selection as an array, so
/// `Many` has to be tried first when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClipPayload {
    Many(Vec<SceneNodeRecord>),
    Single(SceneNodeRecord),
}

impl ClipPayload {
    fn from_records(mut records: Vec<SceneNodeRecord>) -> Self {
        if records.len() == 1
            && let Some(record) = records.pop()
        {
            return ClipPayload::Single(record);
        }
        ClipPayload::Many(records)
    }

    pub fn records(&self) -> &[SceneNodeRecord] {
        match self {
            ClipPayload::Many(records) => records,
            ClipPayload::Single(record) => std::slice::from_ref(record),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

// ─── Stores ──────────────────────────────────────────────────────────────

/// Backing storage for the clip slot.
pub trait ClipStore {
    /// Current payload, `None` when nothing was ever copied.
    fn load(&self) -> Result<Option<ClipPayload>, ClipboardError>;

    /// Overwrite the slot.
    fn save(&mut self, payload: &ClipPayload) -> Result<(), ClipboardError>;
}

/// Process-local slot. Keeps the serialized text, like a browser's local
/// storage would.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipStore {
    slot: Option<String>,
}

impl MemoryClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw slot contents.
    pub fn raw(&self) -> Option<&str> {
        self.slot.as_deref()
    }

    /// Overwrite the raw slot contents, bypassing serialization.
    pub fn set_raw(&mut self, text: impl Into<String>) {
        self.slot = Some(text.into());
    }
}

impl ClipStore for MemoryClipStore {
    fn load(&self) -> Result<Option<ClipPayload>, ClipboardError> {
        match &self.slot {
            Some(text) => Ok(Some(serde_json::from_str(text)?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, payload: &ClipPayload) -> Result<(), ClipboardError> {
        self.slot = Some(serde_json::to_string(payload)?);
        Ok(())
    }
}

/// Slot persisted as a JSON file, shared across sessions and restarts.
#[derive(Debug, Clone)]
pub struct FileClipStore {
    path: PathBuf,
}

impl FileClipStore {
    /// Store the slot as `<dir>/scenekeep.clipboard.json`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::at(dir.as_ref().join(format!("{CLIP_SLOT_KEY}.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClipStore for FileClipStore {
    fn load(&self) -> Result<Option<ClipPayload>, ClipboardError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&mut self, payload: &ClipPayload) -> Result<(), ClipboardError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(payload)?)?;
        Ok(())
    }
}

// ─── Clipboard ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    pub offset_x: f64,
    pub offset_y: f64,
    /// Offset the n-th paste of one payload by `n` times the offset.
    pub cascade: bool,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        let (offset_x, offset_y) = codec::DEFAULT_DUPLICATE_OFFSET;
        Self {
            offset_x,
            offset_y,
            cascade: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct Clipboard<S: ClipStore = MemoryClipStore> {
    store: S,
    config: ClipboardConfig,
    /// Pastes since the slot was last written.
    paste_count: u32,
}

impl<S: ClipStore> Clipboard<S> {
    pub fn new(store: S, config: ClipboardConfig) -> Self {
        Self {
            store,
            config,
            paste_count: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ClipboardConfig {
        &self.config
    }

    /// Encode `handles` into the clip slot. Returns how many nodes were
    /// copied; an empty selection leaves the slot alone.
    pub fn copy<E: SceneEngine>(
        &mut self,
        engine: &E,
        handles: &[E::Handle],
    ) -> Result<usize, ClipboardError> {
        if handles.is_empty() {
            return Ok(0);
        }
        let records = handles.iter().map(|h| clip_record(engine, *h)).collect();
        let payload = ClipPayload::from_records(records);
        if let Err(e) = self.store.save(&payload) {
            log::warn!("could not write clip slot: {e}");
            return Err(e);
        }
        self.paste_count = 0;
        log::debug!("copied {} node(s)", handles.len());
        Ok(handles.len())
    }

    /// Copy, then remove the originals from the document.
    ///
    /// Every handle must be a top-level node; otherwise nothing is copied or
    /// removed. Once the slot is written, a removal the engine refuses is
    /// logged and the rest still go.
    pub fn cut<E: SceneEngine>(
        &mut self,
        engine: &mut E,
        handles: &[E::Handle],
    ) -> Result<usize, ClipboardError> {
        let top_level = engine.top_level();
        if let Some(missing) = handles.iter().find(|h| !top_level.contains(*h)) {
            log::warn!("cut aborted, {missing:?} is not a top-level node");
            return Err(EngineError::NodeNotFound(format!("{missing:?}")).into());
        }
        let copied = self.copy(&*engine, handles)?;
        let mut failed = 0;
        for handle in handles {
            if let Err(e) = engine.remove(*handle) {
                log::warn!("could not remove cut node {handle:?}: {e}");
                failed += 1;
            }
        }
        if failed > 0 {
            log::warn!("{failed} of {copied} cut node(s) are still in the document");
        }
        Ok(copied)
    }

    /// Insert copies of the clip slot contents and select them.
    pub fn paste<E: SceneEngine>(
        &mut self,
        engine: &mut E,
    ) -> Result<SmallVec<[E::Handle; 4]>, ClipboardError> {
        let payload = match self.store.load() {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(SmallVec::new()),
            Err(e) => {
                log::warn!("could not read clip slot: {e}");
                return Err(e);
            }
        };
        if payload.is_empty() {
            return Ok(SmallVec::new());
        }

        self.paste_count = self.paste_count.saturating_add(1);
        let step = if self.config.cascade {
            self.paste_count as f64
        } else {
            1.0
        };
        let pasted = self.place(engine, payload.records(), step);
        engine.set_selection(&pasted);
        Ok(pasted)
    }

    /// Clone `handles` in place with the configured offset. The clip slot
    /// is not touched.
    pub fn duplicate<E: SceneEngine>(
        &mut self,
        engine: &mut E,
        handles: &[E::Handle],
    ) -> SmallVec<[E::Handle; 4]> {
        let records: Vec<_> = handles.iter().map(|h| clip_record(&*engine, *h)).collect();
        let duplicated = self.place(engine, &records, 1.0);
        if !duplicated.is_empty() {
            engine.set_selection(&duplicated);
        }
        duplicated
    }

    fn place<E: SceneEngine>(
        &self,
        engine: &mut E,
        records: &[SceneNodeRecord],
        step: f64,
    ) -> SmallVec<[E::Handle; 4]> {
        let placement = Placement::Duplicate {
            dx: self.config.offset_x * step,
            dy: self.config.offset_y * step,
        };
        let mut placed = SmallVec::new();
        for record in records {
            let handle = match codec::decode(engine, record, placement) {
                Ok(handle) => handle,
                Err(e) => {
                    log::warn!("skipping clip record: {e}");
                    continue;
                }
            };
            match engine.insert(handle) {
                Ok(()) => placed.push(handle),
                Err(e) => log::warn!("could not insert pasted node: {e}"),
            }
        }
        placed
    }
}

/// Encode one node for the clip slot, substituting a placeholder when the
/// record would not survive the trip through JSON.
fn clip_record<E: SceneEngine>(engine: &E, handle: E::Handle) -> SceneNodeRecord {
    let record = codec::encode(engine, handle);
    if codec::is_sound(&record) {
        return record;
    }
    log::warn!("clip record for {handle:?} does not survive serialization, storing a placeholder");
    codec::encode_placeholder(engine, handle)
}
