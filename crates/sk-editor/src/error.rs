//! Error types for the editor crate.

use sk_core::error::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("clip slot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("clip slot holds malformed data: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
