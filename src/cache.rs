//! Cache Abstraction and Adapter Registry
//!
//! [`Cache`] is the operation set every backend implements. Backends are
//! looked up by name in a [`Registry`] that the application owns; there is
//! no process-wide adapter table.
//!
//! ## Example
//!
//! ```
//! use filekv::{Cache, Options, Registry, Value};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let registry = Registry::with_defaults();
//! let options = Options::default()
//!     .with_root(dir.path().join("cache"))
//!     .with_interval(0);
//!
//! let cache = registry.open(&options).unwrap();
//! cache.set("key", Value::from("is test"), 0).unwrap();
//! assert_eq!(cache.get("key").unwrap(), "is test");
//! ```

use crate::codec::{FlatRecord, Record};
use crate::error::{CacheError, Result};
use crate::storage::{FileCache, Value};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The operations a cache backend provides.
pub trait Cache: Send + Sync {
    /// Stores a value under `key` for `ttl` seconds (0 = forever).
    fn set(&self, key: &str, value: Value, ttl: u64) -> Result<()>;

    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<serde_json::Value>;

    /// Deletes `key`.
    fn del(&self, key: &str) -> Result<()>;

    /// Increments an integer counter and returns the new value.
    fn incr(&self, key: &str) -> Result<Value>;

    /// Decrements an integer counter and returns the new value.
    fn decr(&self, key: &str) -> Result<Value>;

    /// Returns true if `key` is present.
    fn exists(&self, key: &str) -> bool;

    /// Deletes everything.
    fn flush(&self) -> Result<()>;

    /// Stores a record as a field map.
    fn hmset(&self, key: &str, record: &dyn Record) -> Result<()>;

    /// Fills a record from a field map.
    fn hmscan(&self, fields: &FlatRecord, dst: &mut dyn Record) -> Result<()>;

    /// Returns the named fields of a field map.
    fn hmget(&self, key: &str, fields: &[&str]) -> Result<FlatRecord>;

    /// Returns one field of a field map.
    fn hget(&self, key: &str, field: &str) -> Result<String>;

    /// Merges fields into an existing field map.
    fn hset(&self, key: &str, fields: &FlatRecord) -> Result<bool>;

    /// Removes one field from a field map.
    fn hdel(&self, key: &str, field: &str) -> Result<()>;

    /// Returns a whole field map.
    fn hgetall(&self, key: &str) -> Result<FlatRecord>;

    /// Gives `key` a new time-to-live.
    fn expire(&self, key: &str, ttl: Duration) -> bool;

    /// Removes a bucket, or a single key.
    fn clear(&self, name: &str) -> Result<()>;

    /// Bytes used by a bucket.
    fn size(&self, bucket: &str) -> Result<u64>;
}

fn default_adapter() -> String {
    crate::DEFAULT_ADAPTER.to_string()
}

fn default_adapter_config() -> String {
    crate::DEFAULT_ROOT.to_string()
}

fn default_interval() -> u64 {
    crate::DEFAULT_GC_INTERVAL
}

/// Cache configuration.
///
/// Deserializable so an application can load it from its own config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Options {
    /// Adapter name (default: `file`)
    #[serde(default = "default_adapter")]
    pub adapter: String,

    /// Adapter-specific setting; for `file`, the store root (default: `cache`)
    #[serde(default = "default_adapter_config")]
    pub adapter_config: String,

    /// Seconds between expiry sweeps; 0 disables the reaper (default: 60)
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Whether the backend owns its whole keyspace. The file backend always
    /// owns its root and ignores this.
    #[serde(default)]
    pub occupy_mode: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            adapter_config: default_adapter_config(),
            interval: default_interval(),
            occupy_mode: false,
        }
    }
}

impl Options {
    /// Sets the store root.
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        self.adapter_config = root.as_ref().to_string_lossy().into_owned();
        self
    }

    /// Sets the sweep interval in seconds.
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Resolves the store root against the working directory.
    pub fn root_path(&self) -> Result<PathBuf> {
        if self.adapter_config.is_empty() {
            return Err(CacheError::Config("store root is empty".to_string()));
        }
        let spec = Path::new(&self.adapter_config);
        if spec.is_absolute() {
            return Ok(spec.to_path_buf());
        }
        let relative = spec.strip_prefix(".").unwrap_or(spec);
        Ok(std::env::current_dir()?.join(relative))
    }
}

/// Builds a backend from options.
pub type AdapterFactory = Box<dyn Fn(&Options) -> Result<Arc<dyn Cache>> + Send + Sync>;

/// Named cache adapters.
#[derive(Default)]
pub struct Registry {
    adapters: HashMap<String, AdapterFactory>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.adapters.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("adapters", &names).finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in `file` adapter.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.adapters.insert(
            crate::DEFAULT_ADAPTER.to_string(),
            Box::new(|options: &Options| -> Result<Arc<dyn Cache>> {
                let cache: Arc<dyn Cache> = FileCache::open(options)?;
                Ok(cache)
            }),
        );
        registry
    }

    /// Registers an adapter under `name`.
    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Options) -> Result<Arc<dyn Cache>> + Send + Sync + 'static,
    {
        if self.adapters.contains_key(name) {
            return Err(CacheError::DuplicateAdapter(name.to_string()));
        }
        self.adapters.insert(name.to_string(), Box::new(factory));
        debug!(adapter = name, "Registered cache adapter");
        Ok(())
    }

    /// Returns true if an adapter is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.adapters.contains_key(name)
    }

    /// Builds the adapter named in `options.adapter`.
    pub fn open(&self, options: &Options) -> Result<Arc<dyn Cache>> {
        let factory = self
            .adapters
            .get(&options.adapter)
            .ok_or_else(|| CacheError::UnknownAdapter(options.adapter.clone()))?;
        factory(options)
    }
}
