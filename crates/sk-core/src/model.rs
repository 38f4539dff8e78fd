//! Serializable scene model: node records and canvas metadata.
//!
//! A `SceneNodeRecord` is the durable form of one live node. The format is
//! a flat superset object: every record carries the common geometry block,
//! kind-specific fields are `Option`s populated only for the matching kind,
//! and any native property the model does not name is kept in `extra` so
//! opaque engine data survives a round-trip. Missing fields always merge
//! with defaults on deserialization; nothing is ever serialized as `null`.

use crate::id::NodeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ─── Kinds ───────────────────────────────────────────────────────────────

/// The closed set of node kinds the codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text,
    Rect,
    Circle,
    Triangle,
    Ellipse,
    Line,
    Image,
    Group,
}

impl NodeKind {
    pub const ALL: [NodeKind; 8] = [
        NodeKind::Text,
        NodeKind::Rect,
        NodeKind::Circle,
        NodeKind::Triangle,
        NodeKind::Ellipse,
        NodeKind::Line,
        NodeKind::Image,
        NodeKind::Group,
    ];

    /// Canonical tag written into records.
    pub const fn tag(self) -> &'static str {
        match self {
            NodeKind::Text => "text",
            NodeKind::Rect => "rect",
            NodeKind::Circle => "circle",
            NodeKind::Triangle => "triangle",
            NodeKind::Ellipse => "ellipse",
            NodeKind::Line => "line",
            NodeKind::Image => "image",
            NodeKind::Group => "group",
        }
    }

    /// Exact match on a canonical tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Best guess from an engine runtime type tag. Accepts the canonical
    /// tags plus the aliases engines commonly use for the same thing.
    pub fn guess(type_tag: &str) -> Option<Self> {
        let lower = type_tag.trim().to_ascii_lowercase();
        if let Some(kind) = Self::from_tag(&lower) {
            return Some(kind);
        }
        match lower.as_str() {
            "textbox" | "i-text" | "itext" | "textnode" => Some(NodeKind::Text),
            "rectangle" | "square" => Some(NodeKind::Rect),
            "img" | "bitmap" => Some(NodeKind::Image),
            "polyline" | "segment" => Some(NodeKind::Line),
            "frame" | "composite" => Some(NodeKind::Group),
            _ => None,
        }
    }

    /// Rect, circle, triangle, ellipse.
    pub const fn is_shape(self) -> bool {
        matches!(
            self,
            NodeKind::Rect | NodeKind::Circle | NodeKind::Triangle | NodeKind::Ellipse
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The `kind` field as stored. Unrecognised tags are preserved verbatim
/// so that decode can reject them explicitly instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindTag {
    Known(NodeKind),
    Unknown(String),
}

impl KindTag {
    pub fn known(&self) -> Option<NodeKind> {
        match self {
            KindTag::Known(kind) => Some(*kind),
            KindTag::Unknown(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KindTag::Known(kind) => kind.tag(),
            KindTag::Unknown(tag) => tag,
        }
    }

    fn as_str_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self {
            KindTag::Unknown(tag) if tag.is_empty() => fallback,
            _ => self.as_str(),
        }
    }
}

impl Default for KindTag {
    /// A record without a `kind` is not coerced into any real kind.
    fn default() -> Self {
        KindTag::Unknown(String::new())
    }
}

impl From<NodeKind> for KindTag {
    fn from(kind: NodeKind) -> Self {
        KindTag::Known(kind)
    }
}

impl Serialize for KindTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for KindTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(match NodeKind::from_tag(&tag) {
            Some(kind) => KindTag::Known(kind),
            None => KindTag::Unknown(tag),
        })
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────

/// Position/transform block shared by every record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Rotation in degrees.
    pub angle: f64,
    pub opacity: f64,
    pub visible: bool,
    pub flip_x: bool,
    pub flip_y: bool,
    pub skew_x: f64,
    pub skew_y: f64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            opacity: 1.0,
            visible: true,
            flip_x: false,
            flip_y: false,
            skew_x: 0.0,
            skew_y: 0.0,
        }
    }
}

// ─── Text ────────────────────────────────────────────────────────────────

/// CSS-like font weight: either numeric (`700`) or named (`"bold"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FontWeight {
    Numeric(u16),
    Named(String),
}

impl Default for FontWeight {
    fn default() -> Self {
        FontWeight::Numeric(400)
    }
}

pub const DEFAULT_FONT_FAMILY: &str = "Inter";
pub const DEFAULT_FONT_SIZE: f64 = 14.0;
pub const DEFAULT_LINE_HEIGHT: f64 = 1.16;
pub const DEFAULT_FILL: &str = "#000000";

/// `extra` key marking a record produced by the last encode tier.
pub const PLACEHOLDER_FLAG: &str = "placeholder";

// ─── Records ─────────────────────────────────────────────────────────────

/// Serializable snapshot of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneNodeRecord {
    pub kind: KindTag,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,

    #[serde(flatten)]
    pub geometry: Geometry,

    pub selectable: bool,

    // Paint (shapes, text, lines)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,

    // Box dimensions (rect, triangle, image, text box)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    // Circle / ellipse
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ry: Option<f64>,

    // Line endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,

    // Text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<FontWeight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_align: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linethrough: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overline: Option<bool>,

    // Image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,

    /// Group members in paint order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneNodeRecord>,

    /// Native properties outside the modelled set.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for SceneNodeRecord {
    fn default() -> Self {
        Self {
            kind: KindTag::default(),
            id: None,
            geometry: Geometry::default(),
            selectable: true,
            fill: None,
            stroke: None,
            stroke_width: None,
            width: None,
            height: None,
            radius: None,
            rx: None,
            ry: None,
            x1: None,
            y1: None,
            x2: None,
            y2: None,
            text: None,
            font_family: None,
            font_size: None,
            font_weight: None,
            font_style: None,
            text_align: None,
            line_height: None,
            underline: None,
            linethrough: None,
            overline: None,
            src: None,
            children: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl SceneNodeRecord {
    /// A record of `kind` with every field at its default.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind: KindTag::Known(kind),
            ..Self::default()
        }
        .with_defaults()
    }

    /// The minimal stand-in used when nothing else about a node can be read:
    /// default geometry, zero size, hidden and not selectable. The record is
    /// flagged in `extra` so decode can tell it from a user-locked node.
    pub fn placeholder(kind: NodeKind, id: Option<NodeId>) -> Self {
        let mut record = Self::new(kind);
        record.id = id;
        record.geometry.visible = false;
        record.selectable = false;
        record
            .extra
            .insert(PLACEHOLDER_FLAG.to_string(), serde_json::Value::Bool(true));
        record
    }

    pub fn is_placeholder(&self) -> bool {
        self.extra.get(PLACEHOLDER_FLAG) == Some(&serde_json::Value::Bool(true))
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.geometry.x = x;
        self.geometry.y = y;
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_fill(mut self, fill: &str) -> Self {
        self.fill = Some(fill.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_children(mut self, children: Vec<SceneNodeRecord>) -> Self {
        self.children = children;
        self
    }

    pub fn known_kind(&self) -> Option<NodeKind> {
        self.kind.known()
    }

    /// Return a copy with every missing kind-specific field filled in.
    /// Applied recursively to group children. Unknown kinds are returned
    /// unchanged apart from their children.
    pub fn with_defaults(&self) -> Self {
        let mut out = self.clone();
        out.fill_defaults();
        out
    }

    fn fill_defaults(&mut self) {
        let Some(kind) = self.kind.known() else {
            return;
        };
        match kind {
            NodeKind::Text => {
                self.text.get_or_insert_with(String::new);
                self.font_family
                    .get_or_insert_with(|| DEFAULT_FONT_FAMILY.to_string());
                self.font_size.get_or_insert(DEFAULT_FONT_SIZE);
                self.font_weight.get_or_insert_with(FontWeight::default);
                self.font_style.get_or_insert_with(|| "normal".to_string());
                self.fill.get_or_insert_with(|| DEFAULT_FILL.to_string());
                self.text_align.get_or_insert_with(|| "left".to_string());
                self.line_height.get_or_insert(DEFAULT_LINE_HEIGHT);
                self.underline.get_or_insert(false);
                self.linethrough.get_or_insert(false);
                self.overline.get_or_insert(false);
            }
            NodeKind::Rect | NodeKind::Triangle => {
                self.width.get_or_insert(0.0);
                self.height.get_or_insert(0.0);
                self.fill.get_or_insert_with(|| DEFAULT_FILL.to_string());
                self.stroke_width.get_or_insert(1.0);
            }
            NodeKind::Circle => {
                self.radius.get_or_insert(0.0);
                self.fill.get_or_insert_with(|| DEFAULT_FILL.to_string());
                self.stroke_width.get_or_insert(1.0);
            }
            NodeKind::Ellipse => {
                self.rx.get_or_insert(0.0);
                self.ry.get_or_insert(0.0);
                self.fill.get_or_insert_with(|| DEFAULT_FILL.to_string());
                self.stroke_width.get_or_insert(1.0);
            }
            NodeKind::Line => {
                self.x1.get_or_insert(0.0);
                self.y1.get_or_insert(0.0);
                self.x2.get_or_insert(0.0);
                self.y2.get_or_insert(0.0);
                self.stroke.get_or_insert_with(|| DEFAULT_FILL.to_string());
                self.stroke_width.get_or_insert(1.0);
            }
            NodeKind::Image => {
                self.src.get_or_insert_with(String::new);
                self.width.get_or_insert(0.0);
                self.height.get_or_insert(0.0);
            }
            NodeKind::Group => {
                for child in &mut self.children {
                    child.fill_defaults();
                }
            }
        }
    }

    /// Shift the node's own position. Children of a group are positioned
    /// relative to it and are left alone.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.geometry.x += dx;
        self.geometry.y += dy;
    }

    /// Give this record and its whole subtree fresh ids.
    pub fn assign_fresh_ids(&mut self) {
        self.id = Some(NodeId::with_prefix(self.kind.as_str_or("node")));
        for child in &mut self.children {
            child.assign_fresh_ids();
        }
    }

    /// Name of the first numeric field in this subtree that is NaN or
    /// infinite. JSON cannot carry those, so such a record never survives
    /// its textual form.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        let g = &self.geometry;
        let required = [
            ("x", g.x),
            ("y", g.y),
            ("scaleX", g.scale_x),
            ("scaleY", g.scale_y),
            ("angle", g.angle),
            ("opacity", g.opacity),
            ("skewX", g.skew_x),
            ("skewY", g.skew_y),
        ];
        let optional = [
            ("strokeWidth", self.stroke_width),
            ("width", self.width),
            ("height", self.height),
            ("radius", self.radius),
            ("rx", self.rx),
            ("ry", self.ry),
            ("x1", self.x1),
            ("y1", self.y1),
            ("x2", self.x2),
            ("y2", self.y2),
            ("fontSize", self.font_size),
            ("lineHeight", self.line_height),
        ];
        required
            .into_iter()
            .chain(optional.into_iter().filter_map(|(name, v)| v.map(|v| (name, v))))
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| name)
            .or_else(|| self.children.iter().find_map(Self::first_non_finite))
    }

    /// Number of records in this subtree, including itself.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Self::subtree_len).sum::<usize>()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// ─── Canvas ──────────────────────────────────────────────────────────────

/// Document-level metadata frozen into every snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CanvasMeta {
    pub width: f64,
    pub height: f64,
    pub background: String,
}

impl Default for CanvasMeta {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            background: "#ffffff".to_string(),
        }
    }
}
