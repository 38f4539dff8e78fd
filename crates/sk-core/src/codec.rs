//! Node codec: live node ↔ `SceneNodeRecord`.
//!
//! Encoding never fails. It walks an ordered fallback chain and stops at
//! the first tier that succeeds:
//!
//! 1. **Native**: the engine's own serializer, accepted only if the value
//!    survives a trip through the record's textual form.
//! 2. **Fields**: a fixed allow-list of fields read one by one, for nodes
//!    whose native serializer is broken (interactively edited text is the
//!    usual culprit).
//! 3. **Placeholder**: default geometry with a best-guess kind, hidden and
//!    not selectable, so group indices and document order stay intact.
//!
//! Decoding is total over the record space: missing fields are defaulted
//! the same way tier 2 defaults them, and an unknown kind turns into a
//! visible fallback shape instead of aborting a paste or a restore.

use crate::engine::SceneEngine;
use crate::error::{CodecError, TierError};
use crate::id::NodeId;
use crate::model::{FontWeight, Geometry, KindTag, NodeKind, SceneNodeRecord};
use serde_json::Value;

/// Offset applied to pasted and duplicated nodes.
pub const DEFAULT_DUPLICATE_OFFSET: (f64, f64) = (10.0, 10.0);

/// Side length of the stand-in shape for records of unknown kind.
pub const FALLBACK_SHAPE_SIZE: f64 = 40.0;

/// Which encode tier produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Native,
    Fields,
    Placeholder,
}

/// How a decoded node is placed relative to its record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Undo/redo: same ids, same position.
    Restore,
    /// Paste/duplicate: fresh ids for the whole subtree and the top-level
    /// node shifted by `(dx, dy)`.
    Duplicate { dx: f64, dy: f64 },
}

impl Placement {
    pub fn duplicate() -> Self {
        let (dx, dy) = DEFAULT_DUPLICATE_OFFSET;
        Placement::Duplicate { dx, dy }
    }
}

// ─── Encode ──────────────────────────────────────────────────────────────

/// Encode a live node. Never fails.
pub fn encode<E: SceneEngine>(engine: &E, handle: E::Handle) -> SceneNodeRecord {
    encode_with_tier(engine, handle).0
}

/// Encode a live node and report which tier produced the record.
pub fn encode_with_tier<E: SceneEngine>(engine: &E, handle: E::Handle) -> (SceneNodeRecord, Tier) {
    match encode_native(engine, handle).and_then(sound) {
        Ok(record) => return (record, Tier::Native),
        Err(e) => log::debug!("native encode of {} failed: {e}", describe(engine, handle)),
    }
    match encode_fields(engine, handle).and_then(sound) {
        Ok(record) => return (record, Tier::Fields),
        Err(e) => log::warn!(
            "field encode of {} failed, using placeholder: {e}",
            describe(engine, handle)
        ),
    }
    (encode_placeholder(engine, handle), Tier::Placeholder)
}

/// A record is sound when its textual form parses back to the same value.
/// Non-finite numbers are the usual offender: JSON writes them as `null`.
pub fn is_sound(record: &SceneNodeRecord) -> bool {
    record.first_non_finite().is_none()
        && record
            .to_json()
            .and_then(|text| SceneNodeRecord::from_json(&text))
            .is_ok_and(|parsed| parsed == *record)
}

fn sound(record: SceneNodeRecord) -> Result<SceneNodeRecord, TierError> {
    if let Some(field) = record.first_non_finite() {
        return Err(TierError::NonFinite(field));
    }
    let parsed = SceneNodeRecord::from_json(&record.to_json()?)?;
    if parsed != record {
        log::debug!("record normalised by its textual form");
    }
    Ok(parsed)
}

/// Tier 1: native serializer plus a textual round-trip.
pub fn encode_native<E: SceneEngine>(
    engine: &E,
    handle: E::Handle,
) -> Result<SceneNodeRecord, TierError> {
    let value = engine.native_serialize(handle)?;
    let text = serde_json::to_string(&value)?;
    let mut record = SceneNodeRecord::from_json(&text)?;
    if let Some(tag) = first_unknown_kind(&record) {
        return Err(TierError::UnknownKind(tag.to_string()));
    }
    if let Some(field) = record.first_non_finite() {
        return Err(TierError::NonFinite(field));
    }
    if record.id.is_none() {
        record.id = engine.node_id(handle);
    }
    Ok(record.with_defaults())
}

/// Tier 2: read the allow-listed fields for the node's kind.
pub fn encode_fields<E: SceneEngine>(
    engine: &E,
    handle: E::Handle,
) -> Result<SceneNodeRecord, TierError> {
    let tag = engine.type_tag(handle).unwrap_or_default();
    let kind = NodeKind::guess(&tag).ok_or_else(|| TierError::UnknownKind(tag.clone()))?;
    let fields = FieldReader { engine, handle };

    let mut record = SceneNodeRecord {
        kind: kind.into(),
        id: engine.node_id(handle),
        geometry: fields.geometry()?,
        selectable: fields.bool("selectable")?.unwrap_or(true),
        ..SceneNodeRecord::default()
    };

    match kind {
        NodeKind::Text => {
            record.text = fields.string("text")?;
            record.font_family = fields.string("fontFamily")?;
            record.font_size = fields.number("fontSize")?;
            record.font_weight = fields.font_weight("fontWeight")?;
            record.font_style = fields.string("fontStyle")?;
            record.fill = fields.string("fill")?;
            record.stroke = fields.string("stroke")?;
            record.text_align = fields.string("textAlign")?;
            record.line_height = fields.number("lineHeight")?;
            record.underline = fields.bool("underline")?;
            record.linethrough = fields.bool("linethrough")?;
            record.overline = fields.bool("overline")?;
            record.width = fields.number("width")?;
        }
        NodeKind::Rect | NodeKind::Triangle => {
            record.width = fields.number("width")?;
            record.height = fields.number("height")?;
            fields.paint(&mut record)?;
        }
        NodeKind::Circle => {
            record.radius = fields.number("radius")?;
            fields.paint(&mut record)?;
        }
        NodeKind::Ellipse => {
            record.rx = fields.number("rx")?;
            record.ry = fields.number("ry")?;
            fields.paint(&mut record)?;
        }
        NodeKind::Line => {
            record.x1 = fields.number("x1")?;
            record.y1 = fields.number("y1")?;
            record.x2 = fields.number("x2")?;
            record.y2 = fields.number("y2")?;
            record.stroke = fields.string("stroke")?;
            record.stroke_width = fields.number("strokeWidth")?;
        }
        NodeKind::Image => {
            record.src = fields.string("src")?;
            record.width = fields.number("width")?;
            record.height = fields.number("height")?;
        }
        NodeKind::Group => {
            // Each member gets the full fallback chain of its own.
            record.children = engine
                .children(handle)
                .into_iter()
                .map(|child| encode(engine, child))
                .collect();
        }
    }

    Ok(record.with_defaults())
}

/// Tier 3: geometry defaults and a best-guess kind. Cannot fail.
pub fn encode_placeholder<E: SceneEngine>(engine: &E, handle: E::Handle) -> SceneNodeRecord {
    let kind = engine
        .type_tag(handle)
        .as_deref()
        .and_then(NodeKind::guess)
        .unwrap_or(NodeKind::Rect);
    SceneNodeRecord::placeholder(kind, engine.node_id(handle))
}

fn first_unknown_kind(record: &SceneNodeRecord) -> Option<&str> {
    if let KindTag::Unknown(tag) = &record.kind {
        return Some(tag);
    }
    record.children.iter().find_map(first_unknown_kind)
}

fn describe<E: SceneEngine>(engine: &E, handle: E::Handle) -> String {
    match engine.node_id(handle) {
        Some(id) => format!("node {id}"),
        None => format!("node {handle:?}"),
    }
}

/// Typed field access for tier 2. Engine errors abort the tier; a missing
/// or mistyped value just yields `None` so the default applies.
struct FieldReader<'a, E: SceneEngine> {
    engine: &'a E,
    handle: E::Handle,
}

impl<E: SceneEngine> FieldReader<'_, E> {
    fn raw(&self, field: &str) -> Result<Option<Value>, TierError> {
        Ok(self.engine.read_field(self.handle, field)?)
    }

    fn typed<T>(&self, field: &str, convert: impl Fn(&Value) -> Option<T>) -> Result<Option<T>, TierError> {
        let Some(value) = self.raw(field)? else {
            return Ok(None);
        };
        let converted = convert(&value);
        if converted.is_none() && !value.is_null() {
            log::debug!("ignoring mistyped field `{field}`: {value}");
        }
        Ok(converted)
    }

    fn number(&self, field: &str) -> Result<Option<f64>, TierError> {
        self.typed(field, |v| v.as_f64().filter(|n| n.is_finite()))
    }

    fn bool(&self, field: &str) -> Result<Option<bool>, TierError> {
        self.typed(field, Value::as_bool)
    }

    fn string(&self, field: &str) -> Result<Option<String>, TierError> {
        self.typed(field, |v| v.as_str().map(str::to_string))
    }

    fn font_weight(&self, field: &str) -> Result<Option<FontWeight>, TierError> {
        self.typed(field, |v| match v {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(FontWeight::Numeric),
            Value::String(s) => Some(FontWeight::Named(s.clone())),
            _ => None,
        })
    }

    fn geometry(&self) -> Result<Geometry, TierError> {
        let d = Geometry::default();
        Ok(Geometry {
            x: self.number("x")?.unwrap_or(d.x),
            y: self.number("y")?.unwrap_or(d.y),
            scale_x: self.number("scaleX")?.unwrap_or(d.scale_x),
            scale_y: self.number("scaleY")?.unwrap_or(d.scale_y),
            angle: self.number("angle")?.unwrap_or(d.angle),
            opacity: self.number("opacity")?.unwrap_or(d.opacity),
            visible: self.bool("visible")?.unwrap_or(d.visible),
            flip_x: self.bool("flipX")?.unwrap_or(d.flip_x),
            flip_y: self.bool("flipY")?.unwrap_or(d.flip_y),
            skew_x: self.number("skewX")?.unwrap_or(d.skew_x),
            skew_y: self.number("skewY")?.unwrap_or(d.skew_y),
        })
    }

    fn paint(&self, record: &mut SceneNodeRecord) -> Result<(), TierError> {
        record.fill = self.string("fill")?;
        record.stroke = self.string("stroke")?;
        record.stroke_width = self.number("strokeWidth")?;
        Ok(())
    }
}

// ─── Decode ──────────────────────────────────────────────────────────────

/// Create a new live node from `record`. Unknown kinds become a visible
/// fallback shape. The input record is never modified.
pub fn decode<E: SceneEngine>(
    engine: &mut E,
    record: &SceneNodeRecord,
    placement: Placement,
) -> Result<E::Handle, CodecError> {
    build(engine, &prepare(record, placement), false)
}

/// Like [`decode`], but rejects any record (or group member) whose kind is
/// not recognised.
pub fn decode_strict<E: SceneEngine>(
    engine: &mut E,
    record: &SceneNodeRecord,
    placement: Placement,
) -> Result<E::Handle, CodecError> {
    build(engine, &prepare(record, placement), true)
}

fn prepare(record: &SceneNodeRecord, placement: Placement) -> SceneNodeRecord {
    let mut prepared = record.with_defaults();
    unlock_placeholders(&mut prepared);
    if let Placement::Duplicate { dx, dy } = placement {
        prepared.translate(dx, dy);
        prepared.assign_fresh_ids();
    }
    prepared
}

/// Placeholders come back hidden but selectable, so the user can still find
/// and delete them. Nodes the user locked keep `selectable: false`.
fn unlock_placeholders(record: &mut SceneNodeRecord) {
    if record.is_placeholder() {
        record.selectable = true;
        record.geometry.visible = false;
    }
    for child in &mut record.children {
        unlock_placeholders(child);
    }
}

fn build<E: SceneEngine>(
    engine: &mut E,
    record: &SceneNodeRecord,
    strict: bool,
) -> Result<E::Handle, CodecError> {
    let kind = match &record.kind {
        KindTag::Known(kind) => *kind,
        KindTag::Unknown(tag) if strict => {
            return Err(CodecError::UnknownKind {
                kind: tag.clone(),
                id: record.id,
            });
        }
        KindTag::Unknown(tag) => {
            log::warn!(
                "unknown node kind `{tag}` ({}), substituting fallback shape",
                record.id.map(|id| id.to_string()).unwrap_or_default()
            );
            return Ok(engine.create_node(&fallback_shape(record, tag))?);
        }
    };

    if kind == NodeKind::Group {
        let mut members = Vec::with_capacity(record.children.len());
        for child in &record.children {
            members.push(build(engine, child, strict)?);
        }
        return Ok(engine.create_group(&shell(record), members)?);
    }

    match engine.create_node(record) {
        Ok(handle) => Ok(handle),
        Err(e) if !strict => {
            log::warn!("engine rejected {kind} record, retrying as placeholder: {e}");
            let mut stand_in = SceneNodeRecord::placeholder(kind, record.id);
            stand_in.geometry = record.geometry;
            stand_in.geometry.visible = false;
            stand_in.selectable = true;
            Ok(engine.create_node(&stand_in)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// The group record minus its members, which `create_group` receives as
/// handles instead.
fn shell(record: &SceneNodeRecord) -> SceneNodeRecord {
    SceneNodeRecord {
        kind: record.kind.clone(),
        id: record.id,
        geometry: record.geometry,
        selectable: record.selectable,
        extra: record.extra.clone(),
        ..SceneNodeRecord::default()
    }
}

fn fallback_shape(record: &SceneNodeRecord, original_kind: &str) -> SceneNodeRecord {
    let mut shape = SceneNodeRecord::new(NodeKind::Rect)
        .with_size(
            record.width.unwrap_or(FALLBACK_SHAPE_SIZE),
            record.height.unwrap_or(FALLBACK_SHAPE_SIZE),
        )
        .with_fill("#d1d5db");
    shape.id = record.id.or_else(|| Some(NodeId::with_prefix("fallback")));
    shape.geometry = record.geometry;
    shape.geometry.visible = true;
    shape.stroke = Some("#ef4444".to_string());
    shape
        .extra
        .insert("fallbackFor".to_string(), Value::String(original_kind.to_string()));
    shape
}
