//! Contract with the external scene engine.
//!
//! The engine owns every live node; this crate only sees opaque `Handle`s
//! and reads/writes through the accessors below. Rendering, hit-testing and
//! transform math stay on the engine's side.

use crate::error::EngineError;
use crate::id::NodeId;
use crate::model::{CanvasMeta, SceneNodeRecord};
use std::fmt::Debug;

/// Whether a document load finished inside `end_load` or will finish later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Complete,
    /// The engine completes on its own schedule and reports back through
    /// the owner of the restore (see `History::finish_restore`).
    Pending,
}

/// Document mutation events emitted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationEvent {
    Added,
    Removed,
    Modified,
    Moving,
    Scaling,
    Rotating,
    PathFinished,
    SelectionCreated,
    SelectionUpdated,
    SelectionCleared,
    PointerUp { has_selection: bool },
}

/// Accessors the core needs from a rendering engine.
pub trait SceneEngine {
    type Handle: Copy + Eq + Debug;

    /// Top-level nodes in paint (z) order, back to front.
    fn top_level(&self) -> Vec<Self::Handle>;

    fn node_id(&self, handle: Self::Handle) -> Option<NodeId>;

    /// Runtime type name of the node (e.g. `"textbox"`, `"rect"`).
    fn type_tag(&self, handle: Self::Handle) -> Option<String>;

    /// The engine's own object serializer. May fail or be absent.
    fn native_serialize(&self, handle: Self::Handle) -> Result<serde_json::Value, EngineError>;

    /// Read one declared field. `Ok(None)` means the node has no such field.
    fn read_field(
        &self,
        handle: Self::Handle,
        field: &str,
    ) -> Result<Option<serde_json::Value>, EngineError>;

    /// Members of a composite node in paint order; empty for leaves.
    fn children(&self, handle: Self::Handle) -> Vec<Self::Handle>;

    fn canvas(&self) -> CanvasMeta;

    /// Create a detached leaf node from a fully defaulted record.
    fn create_node(&mut self, record: &SceneNodeRecord) -> Result<Self::Handle, EngineError>;

    /// Create a detached composite over already-created children.
    /// `record.children` is empty; the members are passed as handles.
    fn create_group(
        &mut self,
        record: &SceneNodeRecord,
        children: Vec<Self::Handle>,
    ) -> Result<Self::Handle, EngineError>;

    /// Attach a detached node at the top of the paint order.
    fn insert(&mut self, handle: Self::Handle) -> Result<(), EngineError>;

    fn remove(&mut self, handle: Self::Handle) -> Result<(), EngineError>;

    fn set_selection(&mut self, handles: &[Self::Handle]);

    /// Destroy every live document node and apply canvas metadata.
    fn begin_load(&mut self, canvas: &CanvasMeta) -> Result<(), EngineError>;

    /// Called once all nodes of a load were inserted.
    fn end_load(&mut self) -> LoadStatus;

    /// Take the mutation events emitted since the last call.
    fn drain_events(&mut self) -> Vec<MutationEvent>;
}
