pub mod clipboard;
pub mod coalescer;
pub mod error;
pub mod history;
pub mod session;

pub use clipboard::{ClipPayload, ClipStore, Clipboard, ClipboardConfig, FileClipStore, MemoryClipStore};
pub use coalescer::{Coalescer, CoalescerConfig, Lane};
pub use error::ClipboardError;
pub use history::{CaptureOutcome, History, HistoryConfig, HistoryStatus};
pub use session::{EditorSession, SessionConfig};
