pub mod codec;
pub mod engine;
pub mod error;
pub mod id;
pub mod memory;
pub mod model;
pub mod snapshot;

pub use codec::{Placement, Tier, decode, decode_strict, encode};
pub use engine::{LoadStatus, MutationEvent, SceneEngine};
pub use error::{CodecError, EngineError, RestoreError, TierError};
pub use id::NodeId;
pub use model::*;
pub use snapshot::DocumentSnapshot;
