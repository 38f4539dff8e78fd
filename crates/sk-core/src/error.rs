//! Error types for the core crate.

use crate::id::NodeId;
use thiserror::Error;

/// Failures reported by the external scene engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("native serializer failed: {0}")]
    Serialize(String),

    #[error("reading field `{field}` failed: {reason}")]
    Field { field: String, reason: String },

    #[error("node creation failed: {0}")]
    Create(String),

    #[error("document load failed: {0}")]
    Load(String),
}

/// Why a single encode tier gave up. Never leaves the codec.
#[derive(Error, Debug)]
pub enum TierError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("record did not survive its textual form: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognised node kind `{0}`")]
    UnknownKind(String),

    #[error("field `{0}` is not a finite number")]
    NonFinite(&'static str),
}

/// Decode failure that survived the fallback shape.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unrecognised node kind `{kind}`")]
    UnknownKind { kind: String, id: Option<NodeId> },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Restoring a snapshot payload failed as a whole.
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("malformed snapshot payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
