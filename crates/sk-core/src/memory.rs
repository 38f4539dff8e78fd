//! In-memory `SceneEngine` for headless hosts and tests.
//!
//! Nodes are property bags keyed by the record's camelCase field names.
//! The engine can be told to misbehave per node (failing or garbled native
//! serializer, failing field reads) and to finish document loads later,
//! which is how the fallback and guard paths get exercised.

use crate::engine::{LoadStatus, MutationEvent, SceneEngine};
use crate::error::EngineError;
use crate::id::NodeId;
use crate::model::{CanvasMeta, NodeKind, SceneNodeRecord};
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemHandle(u32);

/// How a node's native serializer behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NativeMode {
    #[default]
    Normal,
    /// Returns an error.
    Fails,
    /// Returns a value that does not parse as a record.
    Garbled,
}

#[derive(Debug, Clone)]
struct MemNode {
    id: Option<NodeId>,
    type_tag: String,
    props: Map<String, Value>,
    children: Vec<MemHandle>,
    native: NativeMode,
    fields_fail: bool,
}

#[derive(Debug)]
pub struct MemoryEngine {
    nodes: HashMap<MemHandle, MemNode>,
    order: Vec<MemHandle>,
    selection: Vec<MemHandle>,
    canvas: CanvasMeta,
    events: Vec<MutationEvent>,
    next_handle: u32,
    defer_loads: bool,
    load_pending: bool,
    load_failure: Option<String>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_canvas(CanvasMeta::default())
    }

    pub fn with_canvas(canvas: CanvasMeta) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            selection: Vec::new(),
            canvas,
            events: Vec::new(),
            next_handle: 0,
            defer_loads: false,
            load_pending: false,
            load_failure: None,
        }
    }

    // ─── Building documents ──────────────────────────────────────────────

    /// Add a node (and its subtree) straight from a record, on top of the
    /// paint order. Emits `Added`.
    pub fn add(&mut self, record: &SceneNodeRecord) -> MemHandle {
        let handle = self.spawn(record);
        self.order.push(handle);
        self.events.push(MutationEvent::Added);
        handle
    }

    /// Add a node of an arbitrary runtime type with raw properties.
    pub fn add_custom(&mut self, type_tag: &str, props: Value) -> MemHandle {
        let props = match props {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let handle = self.alloc(MemNode {
            id: Some(NodeId::with_prefix(type_tag)),
            type_tag: type_tag.to_string(),
            props,
            children: Vec::new(),
            native: NativeMode::Normal,
            fields_fail: false,
        });
        self.order.push(handle);
        self.events.push(MutationEvent::Added);
        handle
    }

    fn spawn(&mut self, record: &SceneNodeRecord) -> MemHandle {
        let children = record.children.iter().map(|c| self.spawn(c)).collect();
        let node = node_from_record(record, children);
        self.alloc(node)
    }

    fn alloc(&mut self, node: MemNode) -> MemHandle {
        let handle = MemHandle(self.next_handle);
        self.next_handle += 1;
        self.nodes.insert(handle, node);
        handle
    }

    // ─── Interactive edits ───────────────────────────────────────────────

    /// Drag a node by `(dx, dy)`. Emits `Moving`.
    pub fn move_by(&mut self, handle: MemHandle, dx: f64, dy: f64) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            for (key, delta) in [("x", dx), ("y", dy)] {
                let current = node.props.get(key).and_then(Value::as_f64).unwrap_or(0.0);
                node.props.insert(key.to_string(), Value::from(current + delta));
            }
            self.events.push(MutationEvent::Moving);
        }
    }

    /// Overwrite one property. Emits `Modified`.
    pub fn set_prop(&mut self, handle: MemHandle, key: &str, value: Value) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.props.insert(key.to_string(), value);
            self.events.push(MutationEvent::Modified);
        }
    }

    pub fn prop(&self, handle: MemHandle, key: &str) -> Option<&Value> {
        self.nodes.get(&handle).and_then(|n| n.props.get(key))
    }

    // ─── Fault injection ─────────────────────────────────────────────────

    pub fn set_native_mode(&mut self, handle: MemHandle, mode: NativeMode) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.native = mode;
        }
    }

    pub fn set_fields_fail(&mut self, handle: MemHandle, fail: bool) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.fields_fail = fail;
        }
    }

    /// Make `end_load` report `Pending` until `complete_load` is called.
    pub fn set_deferred_loads(&mut self, defer: bool) {
        self.defer_loads = defer;
    }

    /// Make the next `begin_load` fail with `reason`.
    pub fn fail_next_load(&mut self, reason: &str) {
        self.load_failure = Some(reason.to_string());
    }

    pub fn load_pending(&self) -> bool {
        self.load_pending
    }

    /// Finish a deferred load. Returns false when none was pending.
    pub fn complete_load(&mut self) -> bool {
        std::mem::replace(&mut self.load_pending, false)
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn children_of(&self, handle: MemHandle) -> Vec<MemHandle> {
        self.nodes
            .get(&handle)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn selection(&self) -> &[MemHandle] {
        &self.selection
    }

    /// Top-level node with the given id.
    pub fn find(&self, id: NodeId) -> Option<MemHandle> {
        self.order
            .iter()
            .copied()
            .find(|h| self.nodes.get(h).and_then(|n| n.id) == Some(id))
    }

    /// Ids of the top-level nodes in paint order.
    pub fn top_level_ids(&self) -> Vec<Option<NodeId>> {
        self.order
            .iter()
            .map(|h| self.nodes.get(h).and_then(|n| n.id))
            .collect()
    }

    fn drop_subtree(&mut self, handle: MemHandle) {
        if let Some(node) = self.nodes.remove(&handle) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }

    fn native_value(&self, handle: MemHandle) -> Result<Value, EngineError> {
        let node = self.node(handle)?;
        let kind = NodeKind::guess(&node.type_tag)
            .map(|k| k.tag().to_string())
            .unwrap_or_else(|| node.type_tag.clone());
        match node.native {
            NativeMode::Fails => {
                return Err(EngineError::Serialize(format!(
                    "style runs out of sync on {kind}"
                )));
            }
            NativeMode::Garbled => {
                return Ok(serde_json::json!({ "kind": kind, "x": "NaN", "scaleX": [] }));
            }
            NativeMode::Normal => {}
        }

        let mut object = node.props.clone();
        object.insert("kind".to_string(), Value::String(kind));
        if let Some(id) = node.id {
            object.insert("id".to_string(), Value::String(id.as_str().to_string()));
        }
        if !node.children.is_empty() {
            let children = node
                .children
                .iter()
                .map(|c| self.native_value(*c))
                .collect::<Result<Vec<_>, _>>()?;
            object.insert("children".to_string(), Value::Array(children));
        }
        Ok(Value::Object(object))
    }

    fn node(&self, handle: MemHandle) -> Result<&MemNode, EngineError> {
        self.nodes
            .get(&handle)
            .ok_or_else(|| EngineError::NodeNotFound(format!("{handle:?}")))
    }
}

fn node_from_record(record: &SceneNodeRecord, children: Vec<MemHandle>) -> MemNode {
    let mut props = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    props.remove("kind");
    props.remove("id");
    props.remove("children");
    MemNode {
        id: record.id,
        type_tag: record.kind.as_str().to_string(),
        props,
        children,
        native: NativeMode::Normal,
        fields_fail: false,
    }
}

impl SceneEngine for MemoryEngine {
    type Handle = MemHandle;

    fn top_level(&self) -> Vec<MemHandle> {
        self.order.clone()
    }

    fn node_id(&self, handle: MemHandle) -> Option<NodeId> {
        self.nodes.get(&handle).and_then(|n| n.id)
    }

    fn type_tag(&self, handle: MemHandle) -> Option<String> {
        self.nodes.get(&handle).map(|n| n.type_tag.clone())
    }

    fn native_serialize(&self, handle: MemHandle) -> Result<Value, EngineError> {
        self.native_value(handle)
    }

    fn read_field(&self, handle: MemHandle, field: &str) -> Result<Option<Value>, EngineError> {
        let node = self.node(handle)?;
        if node.fields_fail {
            return Err(EngineError::Field {
                field: field.to_string(),
                reason: "accessor threw".to_string(),
            });
        }
        Ok(node.props.get(field).cloned())
    }

    fn children(&self, handle: MemHandle) -> Vec<MemHandle> {
        self.children_of(handle)
    }

    fn canvas(&self) -> CanvasMeta {
        self.canvas.clone()
    }

    fn create_node(&mut self, record: &SceneNodeRecord) -> Result<MemHandle, EngineError> {
        Ok(self.alloc(node_from_record(record, Vec::new())))
    }

    fn create_group(
        &mut self,
        record: &SceneNodeRecord,
        children: Vec<MemHandle>,
    ) -> Result<MemHandle, EngineError> {
        if let Some(missing) = children.iter().find(|c| !self.nodes.contains_key(c)) {
            return Err(EngineError::Create(format!("unknown member {missing:?}")));
        }
        Ok(self.alloc(node_from_record(record, children)))
    }

    fn insert(&mut self, handle: MemHandle) -> Result<(), EngineError> {
        self.node(handle)?;
        self.order.push(handle);
        self.events.push(MutationEvent::Added);
        Ok(())
    }

    fn remove(&mut self, handle: MemHandle) -> Result<(), EngineError> {
        let position = self
            .order
            .iter()
            .position(|h| *h == handle)
            .ok_or_else(|| EngineError::NodeNotFound(format!("{handle:?}")))?;
        self.order.remove(position);
        self.drop_subtree(handle);
        self.events.push(MutationEvent::Removed);
        if let Some(pos) = self.selection.iter().position(|h| *h == handle) {
            self.selection.remove(pos);
            if self.selection.is_empty() {
                self.events.push(MutationEvent::SelectionCleared);
            }
        }
        Ok(())
    }

    fn set_selection(&mut self, handles: &[MemHandle]) {
        let had_selection = !self.selection.is_empty();
        self.selection = handles.to_vec();
        self.events.push(match (had_selection, handles.is_empty()) {
            (_, true) => MutationEvent::SelectionCleared,
            (false, false) => MutationEvent::SelectionCreated,
            (true, false) => MutationEvent::SelectionUpdated,
        });
    }

    fn begin_load(&mut self, canvas: &CanvasMeta) -> Result<(), EngineError> {
        if let Some(reason) = self.load_failure.take() {
            return Err(EngineError::Load(reason));
        }
        for handle in std::mem::take(&mut self.order) {
            self.drop_subtree(handle);
            self.events.push(MutationEvent::Removed);
        }
        // Detached leftovers from earlier creates go too.
        self.nodes.clear();
        self.selection.clear();
        self.canvas = canvas.clone();
        Ok(())
    }

    fn end_load(&mut self) -> LoadStatus {
        if self.defer_loads {
            self.load_pending = true;
            LoadStatus::Pending
        } else {
            LoadStatus::Complete
        }
    }

    fn drain_events(&mut self) -> Vec<MutationEvent> {
        std::mem::take(&mut self.events)
    }
}
