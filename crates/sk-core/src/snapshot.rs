//! Whole-document snapshots.
//!
//! `capture` walks the top-level nodes in paint order and encodes each one;
//! `restore` hands a serialized snapshot back to the engine's load primitive
//! and re-creates every node through the codec. A single bad node never
//! aborts either direction.

use crate::codec::{self, Placement};
use crate::engine::{LoadStatus, SceneEngine};
use crate::error::RestoreError;
use crate::model::{CanvasMeta, SceneNodeRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SnapshotBody {
    canvas: CanvasMeta,
    nodes: Vec<SceneNodeRecord>,
}

/// One immutable document checkpoint.
///
/// The serialized payload is computed once at construction. Equality is
/// equality of payloads, so two captures of an unchanged document compare
/// equal no matter how they were produced.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    body: Arc<SnapshotBody>,
    payload: Arc<str>,
}

impl DocumentSnapshot {
    pub fn new(canvas: CanvasMeta, nodes: Vec<SceneNodeRecord>) -> Self {
        Self::from_body(SnapshotBody { canvas, nodes })
    }

    /// Parse a serialized snapshot. The payload is re-serialized so that
    /// equivalent inputs compare equal.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        let body: SnapshotBody = serde_json::from_str(payload)?;
        Ok(Self::from_body(body))
    }

    fn from_body(body: SnapshotBody) -> Self {
        let payload = serde_json::to_string(&body).unwrap_or_else(|e| {
            log::error!("snapshot serialization failed, storing empty document: {e}");
            String::from("{}")
        });
        Self {
            body: Arc::new(body),
            payload: payload.into(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn nodes(&self) -> &[SceneNodeRecord] {
        &self.body.nodes
    }

    pub fn canvas(&self) -> &CanvasMeta {
        &self.body.canvas
    }

    /// Number of top-level records.
    pub fn len(&self) -> usize {
        self.body.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.nodes.is_empty()
    }
}

impl PartialEq for DocumentSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for DocumentSnapshot {}

// ─── Builder ─────────────────────────────────────────────────────────────

/// Capture the whole document. Overlay nodes (guides, grid) are skipped.
pub fn capture<E: SceneEngine>(engine: &E) -> DocumentSnapshot {
    let handles = engine.top_level();
    let mut nodes = Vec::with_capacity(handles.len());
    for handle in handles {
        if engine.node_id(handle).is_some_and(|id| id.is_overlay()) {
            continue;
        }
        let record = codec::encode(engine, handle);
        if codec::is_sound(&record) {
            nodes.push(record);
        } else {
            log::warn!(
                "record for {handle:?} does not survive serialization, storing placeholder"
            );
            nodes.push(codec::encode_placeholder(engine, handle));
        }
    }
    log::trace!("captured {} top-level nodes", nodes.len());
    DocumentSnapshot::new(engine.canvas(), nodes)
}

/// Replace the live document with the one described by `payload`.
pub fn restore<E: SceneEngine>(engine: &mut E, payload: &str) -> Result<LoadStatus, RestoreError> {
    let snapshot = DocumentSnapshot::from_payload(payload)?;
    restore_snapshot(engine, &snapshot)
}

/// Replace the live document with `snapshot`. Nodes that cannot be
/// re-created are logged and skipped; the rest keep their order.
pub fn restore_snapshot<E: SceneEngine>(
    engine: &mut E,
    snapshot: &DocumentSnapshot,
) -> Result<LoadStatus, RestoreError> {
    engine.begin_load(snapshot.canvas())?;
    for (index, record) in snapshot.nodes().iter().enumerate() {
        let handle = match codec::decode(engine, record, Placement::Restore) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("skipping node {index} of snapshot: {e}");
                continue;
            }
        };
        if let Err(e) = engine.insert(handle) {
            log::warn!("could not insert node {index} of snapshot: {e}");
        }
    }
    Ok(engine.end_load())
}
