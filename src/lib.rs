//! # FileKV - A Filesystem-Backed Key-Value Cache
//!
//! FileKV is a pluggable key/value cache. Backends implement the [`Cache`]
//! trait and are selected by name through a [`Registry`]; the built-in
//! `file` backend keeps one file per key under a root directory.
//!
//! ## Features
//!
//! - **Sharded Layout**: keys hash into a two-level directory fan-out
//! - **TTL Support**: entries expire after a per-key time-to-live
//! - **Buckets**: `users_42`-style keys are grouped and can be cleared together
//! - **Hash Emulation**: records are flattened into field maps for `hset`/`hget`
//! - **Background Reaper**: a Tokio task deletes expired entries on an interval
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               FileKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │  Registry   │───>│  Cache      │───>│ FileCache   │                  │
//! │  │ name→adapter│    │  (trait)    │    │             │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                         ┌─────────────────────┼──────────────────┐      │
//! │                         ▼                     ▼                  ▼      │
//! │                  ┌─────────────┐      ┌─────────────┐   ┌────────────┐  │
//! │                  │ Record Codec│      │ Path Sharder│   │  Envelope  │  │
//! │                  │ flatten     │      │ md5 fan-out │   │  bincode   │  │
//! │                  └─────────────┘      └─────────────┘   └────────────┘  │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │                  Reaper                         │ │
//! │                     │           (Background Tokio Task)               │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use filekv::{Cache, Options, Registry, Value};
//!
//! #[tokio::main]
//! async fn main() -> filekv::Result<()> {
//!     let registry = Registry::with_defaults();
//!     let cache = registry.open(&Options::default().with_root("./runtime/cache"))?;
//!
//!     cache.set("greeting", Value::from("hello"), 0)?;
//!     cache.set("users_42", Value::json(&serde_json::json!({"name": "Ann"}))?, 0)?;
//!
//!     println!("{}", cache.get("greeting")?);
//!     cache.clear("users")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`cache`]: the [`Cache`] trait, [`Options`] and the adapter [`Registry`]
//! - [`codec`]: flattening typed records into field maps and back
//! - [`storage`]: the filesystem backend and its reaper
//! - [`error`]: the [`CacheError`] taxonomy

pub mod cache;
pub mod codec;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use cache::{AdapterFactory, Cache, Options, Registry};
pub use codec::{flatten, unflatten, unflatten_strict, FieldTag, FlatRecord, Record};
pub use error::{CacheError, Result};
pub use storage::{Entry, FileCache, Reaper, ReaperConfig, SweepStats, Value};

/// Name of the built-in filesystem adapter
pub const DEFAULT_ADAPTER: &str = "file";

/// Default store root, relative to the working directory
pub const DEFAULT_ROOT: &str = "cache";

/// Default seconds between expiry sweeps
pub const DEFAULT_GC_INTERVAL: u64 = 60;

/// Version of FileKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Routes `tracing` output to the test harness. Set `RUST_LOG` to see it.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_test_writer()
        .try_init();
}
