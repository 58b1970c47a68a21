//! Storage Engine Module
//!
//! The filesystem backend: where keys live on disk, how entries are
//! encoded, and the reaper that clears out expired ones.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        FileCache                            │
//! │   set / get / incr / hset ...                               │
//! │        │                    │                               │
//! │        ▼                    ▼                               │
//! │  ┌───────────┐       ┌────────────┐                         │
//! │  │  Sharder  │       │  Envelope  │                         │
//! │  │ key→path  │       │ bincode    │                         │
//! │  └───────────┘       └────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │          Reaper           │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Sharded Layout**: two levels of hex fan-out under the root (or bucket)
//! - **TTL Support**: entries carry their creation time and time-to-live
//! - **Lazy Expiry**: expired entries are deleted when read
//! - **Active Expiry**: the reaper deletes expired entries nobody reads
//! - **Buckets**: `<bucket>_<rest>` keys share a directory and can be cleared together

pub mod envelope;
pub mod file;
pub mod reaper;
pub mod sharder;
pub mod value;

// Re-export commonly used types
pub use envelope::Entry;
pub use file::FileCache;
pub use reaper::{Reaper, ReaperConfig, SweepStats};
pub use sharder::{bucket_of, check_bucket, path_for, BUCKET_DELIMITER};
pub use value::Value;
