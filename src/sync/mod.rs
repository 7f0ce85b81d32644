//! Incremental sync of conversation logs.
//!
//! - **Scan**: find `<session>.jsonl` files under the data directory
//! - **Normalize**: read both log line shapes into one [`Message`] record
//! - **Hash**: canonical SHA-256 of a session, comparable with the server's
//! - **Delta**: messages after the session's watermark
//! - **State**: per-session watermarks, saved atomically
//! - **Engine**: the run that ties these together
//!
//! # Example
//!
//! ```ignore
//! use history_sync::sync::{SyncEngine, SyncOptions};
//!
//! let engine = SyncEngine::new(&api, &credentials, options, cancel);
//! let summary = engine.run().await?;
//! println!("{} synced, {} skipped", summary.synced, summary.skipped);
//! ```

pub mod delta;
pub mod engine;
pub mod file;
pub mod hash;
pub mod normalize;
pub mod scanner;
pub mod state;
mod types;

pub use delta::extract_delta;
pub use engine::{SyncEngine, SyncEvent, SyncOptions};
pub use file::atomic_write;
pub use hash::{content_hash, has_changed, hash_session};
pub use normalize::{normalize_line, read_messages};
pub use scanner::scan;
pub use state::{SessionState, SyncState};
pub use types::{Delta, LogFile, Message, SyncError, SyncResult, SyncSummary};
