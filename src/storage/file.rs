//! Filesystem-Backed Cache Store
//!
//! Every key is one file under the store root, holding a bincode
//! [`Entry`] envelope. The file location comes from the
//! [`sharder`](crate::storage::sharder).
//!
//! ## Design Decisions
//!
//! 1. **One file per key**: writes replace the whole file, reads decode the whole file.
//!    A write goes to a dot-prefixed temp file in the shard directory and is
//!    renamed into place, so readers never see a half-written envelope.
//! 2. **Lazy Expiry**: reads that find an expired entry delete it on the spot.
//! 3. **Active Expiry**: the [`Reaper`] sweeps the tree for entries nobody reads.
//! 4. **Striped Locks**: read-modify-write operations on one key are serialized
//!    in-process. Nothing protects against other processes sharing the root.
//! 5. **Whole-Blob Hashes**: hash operations read the full field map, edit it in
//!    memory and write it back. There is no per-field storage.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FileCache                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │Stripe 0 │ │Stripe 1 │ │Stripe 2 │ │Stripe N │           │
//! │  │ Mutex   │ │ Mutex   │ │ Mutex   │ │ Mutex   │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! │        <root>/[bucket/]h0/h1/<md5 hex>  (one file per key)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A key maps to a stripe through its digest, so the reaper, which only
//! sees file names, takes the same stripe as callers working on that key.

use crate::cache::{Cache, Options};
use crate::codec::{flatten, unflatten, FlatRecord, Record};
use crate::error::{CacheError, Result};
use crate::storage::envelope::Entry;
use crate::storage::reaper::{self, Reaper, ReaperConfig, SweepStats};
use crate::storage::sharder::{self, BUCKET_DELIMITER};
use crate::storage::value::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Number of lock stripes.
const NUM_STRIPES: usize = 64;

/// Name prefix of in-flight writes. Walks skip these files.
const TEMP_PREFIX: &str = ".tmp";

/// The filesystem cache backend.
///
/// # Example
///
/// ```
/// use filekv::{Cache, FileCache, Value};
///
/// let dir = tempfile::tempdir().unwrap();
/// let cache = FileCache::new(dir.path()).unwrap();
///
/// cache.set("visits", Value::Uint(0), 0).unwrap();
/// cache.incr("visits").unwrap();
/// assert_eq!(cache.get("visits").unwrap(), "1");
/// ```
pub struct FileCache {
    root: PathBuf,
    stripes: Vec<Mutex<()>>,
    /// Reaper handle and its interval, set up once at open
    reaper: Mutex<Option<(Reaper, Duration)>>,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("root", &self.root)
            .field("stripes", &self.stripes.len())
            .field("reaper_interval", &self.reaper_interval())
            .finish()
    }
}

impl FileCache {
    /// Creates a store rooted at `root`, creating the directory if needed.
    ///
    /// No reaper is started; see [`FileCache::open`] and
    /// [`FileCache::start_reaper`].
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            stripes: (0..NUM_STRIPES).map(|_| Mutex::new(())).collect(),
            reaper: Mutex::new(None),
        })
    }

    /// Opens a store from [`Options`].
    ///
    /// The root is resolved against the working directory and a reaper is
    /// started when `interval` is at least one second. Starting a reaper
    /// requires a Tokio runtime.
    pub fn open(options: &Options) -> Result<Arc<Self>> {
        let root = options.root_path()?;
        let cache = Arc::new(Self::new(&root)?);

        if options.interval >= 1 {
            cache.start_reaper(Duration::from_secs(options.interval))?;
        }

        info!(
            root = %root.display(),
            interval = options.interval,
            "File cache opened"
        );
        Ok(cache)
    }

    /// Starts the background reaper. Replaces (and stops) any running one.
    pub fn start_reaper(self: &Arc<Self>, interval: Duration) -> Result<()> {
        let reaper = Reaper::start(Arc::downgrade(self), ReaperConfig { interval })?;
        let mut slot = self.reaper.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some((reaper, interval));
        Ok(())
    }

    /// Stops the background reaper, if one is running.
    pub fn stop_reaper(&self) {
        let mut slot = self.reaper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((reaper, _)) = slot.take() {
            reaper.stop();
        }
    }

    /// Interval of the running reaper.
    pub fn reaper_interval(&self) -> Option<Duration> {
        self.reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, interval)| *interval)
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file that backs `key`. Fails if the key's bucket is not a plain
    /// directory name.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        sharder::path_for(&self.root, key)
    }

    /// Runs one expiry sweep over the whole store.
    pub fn sweep_expired(&self) -> Result<SweepStats> {
        reaper::sweep(self)
    }

    /// Number of entry files currently on disk, expired or not.
    pub fn len(&self) -> Result<u64> {
        let mut count = 0u64;
        for_each_entry(&self.root, |_| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Returns true if the store holds no entry files.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Reads the stored value of a key with its type intact.
    pub fn get_value(&self, key: &str) -> Result<Value> {
        let _guard = self.lock_key(key);
        self.read_live(key).map(|entry| entry.value)
    }

    /// Locks the stripe owning a file name (a key digest).
    pub(crate) fn lock_digest(&self, digest: &str) -> MutexGuard<'_, ()> {
        let index = digest
            .get(..4)
            .and_then(|prefix| u16::from_str_radix(prefix, 16).ok())
            .map(|v| v as usize % NUM_STRIPES)
            .unwrap_or(0);
        self.stripes[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_key(&self, key: &str) -> MutexGuard<'_, ()> {
        self.lock_digest(&sharder::hash_key(key))
    }

    /// Reads and decodes the entry for `key`, expired or not.
    fn read_entry(&self, key: &str) -> Result<Entry> {
        let data = fs::read(self.path_for(key)?).map_err(|e| not_found_or(e, key))?;
        Entry::decode(&data)
    }

    /// Reads the entry for `key`, evicting it if it has expired.
    fn read_live(&self, key: &str) -> Result<Entry> {
        let entry = self.read_entry(key)?;
        if entry.has_expired() {
            remove_if_present(&self.path_for(key)?)?;
            debug!(key = key, "Evicted expired key on read");
            return Err(CacheError::NotFound(key.to_string()));
        }
        Ok(entry)
    }

    /// Writes a fresh entry for `key`. The caller holds the key's stripe.
    fn write(&self, key: &str, value: Value, ttl: u64) -> Result<()> {
        let path = self.path_for(key)?;
        let data = Entry::new(value, ttl).encode()?;
        let parent = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)?;

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)?;
        temp.write_all(&data)?;
        temp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    /// Loads the field map stored under `key`.
    fn read_hash(&self, key: &str) -> Result<FlatRecord> {
        match self.read_live(key)?.value.into_json() {
            serde_json::Value::Object(map) => Ok(map
                .into_iter()
                .map(|(field, value)| (field, json_to_text(value)))
                .collect()),
            other => Err(CacheError::ShapeMismatch(format!(
                "value of key '{key}' is not a field map: {other}"
            ))),
        }
    }

    fn write_hash(&self, key: &str, fields: &FlatRecord) -> Result<()> {
        self.write(key, Value::json(fields)?, 0)
    }
}

impl Cache for FileCache {
    /// Stores a value, replacing any previous entry. A `ttl` of zero never expires.
    fn set(&self, key: &str, value: Value, ttl: u64) -> Result<()> {
        let _guard = self.lock_key(key);
        self.write(key, value, ttl)
    }

    /// Returns the value for `key`.
    ///
    /// Structured values come back as JSON; scalars come back as a JSON string
    /// of their text form.
    fn get(&self, key: &str) -> Result<serde_json::Value> {
        self.get_value(key).map(Value::into_json)
    }

    fn del(&self, key: &str) -> Result<()> {
        let _guard = self.lock_key(key);
        fs::remove_file(self.path_for(key)?).map_err(|e| not_found_or(e, key))
    }

    /// Increments an integer value.
    ///
    /// The entry is rewritten with its original TTL and a new creation time,
    /// so every increment restarts the expiry countdown.
    fn incr(&self, key: &str) -> Result<Value> {
        let _guard = self.lock_key(key);
        let entry = self.read_live(key)?;
        let value = entry.value.incremented(key)?;
        self.write(key, value.clone(), entry.ttl)?;
        Ok(value)
    }

    /// Decrements an integer value. Unsigned values stop at zero with
    /// [`CacheError::Underflow`]. Restarts the TTL like [`Cache::incr`].
    fn decr(&self, key: &str) -> Result<Value> {
        let _guard = self.lock_key(key);
        let entry = self.read_live(key)?;
        let value = entry.value.decremented(key)?;
        self.write(key, value.clone(), entry.ttl)?;
        Ok(value)
    }

    /// Checks whether a file exists for `key`. Expiry is not consulted.
    fn exists(&self, key: &str) -> bool {
        self.path_for(key).is_ok_and(|path| path.exists())
    }

    fn flush(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => {
                info!(root = %self.root.display(), "Flushed file cache");
                Ok(())
            }
        }
    }

    fn hmset(&self, key: &str, record: &dyn Record) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("key is empty".to_string()));
        }
        let fields = flatten(record);
        let _guard = self.lock_key(key);
        self.write_hash(key, &fields)
    }

    fn hmscan(&self, fields: &FlatRecord, dst: &mut dyn Record) -> Result<()> {
        unflatten(fields, dst);
        Ok(())
    }

    fn hmget(&self, key: &str, fields: &[&str]) -> Result<FlatRecord> {
        let _guard = self.lock_key(key);
        let mut stored = self.read_hash(key)?;
        stored.retain(|field, _| fields.contains(&field.as_str()));
        Ok(stored)
    }

    fn hget(&self, key: &str, field: &str) -> Result<String> {
        let _guard = self.lock_key(key);
        self.read_hash(key)?
            .remove(field)
            .ok_or_else(|| CacheError::NotFound(format!("{key}[{field}]")))
    }

    /// Merges `fields` into the map stored under `key`.
    ///
    /// Returns `false` without writing if the key does not exist.
    fn hset(&self, key: &str, fields: &FlatRecord) -> Result<bool> {
        let _guard = self.lock_key(key);
        let mut stored = match self.read_hash(key) {
            Ok(stored) => stored,
            Err(CacheError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        stored.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_hash(key, &stored)?;
        Ok(true)
    }

    /// Removes one field. A missing key is not an error.
    fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let _guard = self.lock_key(key);
        let mut stored = match self.read_hash(key) {
            Ok(stored) => stored,
            Err(CacheError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        stored.remove(field);
        self.write_hash(key, &stored)
    }

    fn hgetall(&self, key: &str) -> Result<FlatRecord> {
        let _guard = self.lock_key(key);
        self.read_hash(key)
    }

    /// Rewrites the entry with a new TTL, restarting its countdown.
    ///
    /// Partial seconds round up, so a non-zero duration never becomes the
    /// zero TTL that means "never expires".
    fn expire(&self, key: &str, ttl: Duration) -> bool {
        if !self.exists(key) {
            return false;
        }
        let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
        let _guard = self.lock_key(key);
        match self.read_live(key) {
            Ok(entry) => self.write(key, entry.value, secs).is_ok(),
            Err(_) => false,
        }
    }

    /// Drops a whole bucket, or a single key.
    ///
    /// A name without the bucket delimiter is a bucket name: the subtree
    /// `<root>/<name>` is removed (a missing subtree is fine). A delimited
    /// name is a key and only its file is removed.
    fn clear(&self, name: &str) -> Result<()> {
        if !name.contains(BUCKET_DELIMITER) {
            sharder::check_bucket(name)?;
            return match fs::remove_dir_all(self.root.join(name)) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => {
                    debug!(bucket = name, "Cleared bucket");
                    Ok(())
                }
            };
        }
        self.del(name)
    }

    /// Total bytes stored under a bucket. An empty name measures the whole store.
    fn size(&self, bucket: &str) -> Result<u64> {
        let dir = if bucket.is_empty() {
            self.root.clone()
        } else {
            sharder::check_bucket(bucket)?;
            self.root.join(bucket)
        };
        let mut total = 0u64;
        for_each_entry(&dir, |entry| {
            total += entry.metadata().map_err(walk_error)?.len();
            Ok(())
        })?;
        Ok(total)
    }
}

/// Maps a missing file to [`CacheError::NotFound`].
fn not_found_or(err: std::io::Error, key: &str) -> CacheError {
    if err.kind() == ErrorKind::NotFound {
        CacheError::NotFound(key.to_string())
    } else {
        CacheError::Io(err)
    }
}

/// Removes a file, ignoring that it is already gone.
pub(crate) fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Calls `visit` for every entry file under `dir`.
///
/// Temp files of in-flight writes are skipped, as are paths that vanish
/// mid-walk (a missing `dir` is simply empty). Other walk errors abort.
pub(crate) fn for_each_entry(
    dir: &Path,
    mut visit: impl FnMut(&DirEntry) -> Result<()>,
) -> Result<()> {
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound) => continue,
            Err(e) => return Err(walk_error(e)),
        };
        if entry.file_type().is_file() && !entry.file_name().to_string_lossy().starts_with('.') {
            visit(&entry)?;
        }
    }
    Ok(())
}

pub(crate) fn walk_error(err: walkdir::Error) -> CacheError {
    let message = err.to_string();
    match err.into_io_error() {
        Some(io) => CacheError::Io(io),
        None => CacheError::Io(std::io::Error::other(message)),
    }
}

fn json_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldTag;
    use crate::storage::envelope::unix_now;
    use crate::impl_record;
    use std::thread;

    fn cache() -> (tempfile::TempDir, FileCache) {
        crate::init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache")).unwrap();
        (dir, cache)
    }

    fn fields(pairs: &[(&str, &str)]) -> FlatRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[derive(Debug, Default, PartialEq)]
    struct Profile {
        id: u64,
        name: String,
        admin: bool,
    }

    impl_record!(Profile {
        id: u64 => FieldTag::new("id"),
        name: String => FieldTag::new("name"),
        admin: bool => FieldTag::new("admin"),
    });

    #[test]
    fn test_set_and_get_scalars() {
        let (_dir, cache) = cache();

        let cases: Vec<(Value, &str)> = vec![
            (Value::Int(-7), "-7"),
            (Value::Uint(18_446_744_073_709_551_615), "18446744073709551615"),
            (Value::Float(3.5), "3.5"),
            (Value::Bool(false), "false"),
            (Value::from("is test"), "is test"),
        ];
        for (i, (value, text)) in cases.into_iter().enumerate() {
            let key = format!("key{i}");
            cache.set(&key, value, 0).unwrap();
            assert_eq!(cache.get(&key).unwrap(), serde_json::json!(text));
        }
    }

    #[test]
    fn test_set_and_get_structured() {
        let (_dir, cache) = cache();
        let doc = serde_json::json!({"name": "Ann", "tags": ["a", "b"]});

        cache.set("doc", Value::json(&doc).unwrap(), 0).unwrap();
        assert_eq!(cache.get("doc").unwrap(), doc);
    }

    #[test]
    fn test_set_overwrites() {
        let (_dir, cache) = cache();
        cache.set("key", Value::from("one"), 0).unwrap();
        cache.set("key", Value::Int(2), 0).unwrap();
        assert_eq!(cache.get_value("key").unwrap(), Value::Int(2));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let (_dir, cache) = cache();
        assert!(cache.get("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_expiry_removes_file() {
        let (_dir, cache) = cache();
        cache.set("session", Value::from("token"), 1).unwrap();
        let path = cache.path_for("session").unwrap();
        assert!(path.exists());

        thread::sleep(Duration::from_millis(1100));

        assert!(cache.get("session").unwrap_err().is_not_found());
        assert!(!path.exists());
    }

    #[test]
    fn test_exists_ignores_expiry() {
        let (_dir, cache) = cache();
        cache.set("session", Value::from("token"), 1).unwrap();
        thread::sleep(Duration::from_millis(1100));
        assert!(cache.exists("session"));
        assert!(!cache.exists("other"));
    }

    #[test]
    fn test_delete() {
        let (_dir, cache) = cache();
        cache.set("key", Value::from("value"), 0).unwrap();
        cache.del("key").unwrap();
        assert!(!cache.exists("key"));
        assert!(cache.del("key").unwrap_err().is_not_found());
    }

    #[test]
    fn test_incr_decr_unsigned() {
        let (_dir, cache) = cache();
        cache.set("counter", Value::Uint(0), 0).unwrap();

        assert_eq!(cache.incr("counter").unwrap(), Value::Uint(1));
        assert_eq!(cache.decr("counter").unwrap(), Value::Uint(0));
        assert!(matches!(
            cache.decr("counter"),
            Err(CacheError::Underflow(_))
        ));
        assert_eq!(cache.get_value("counter").unwrap(), Value::Uint(0));
    }

    #[test]
    fn test_incr_decr_signed() {
        let (_dir, cache) = cache();
        cache.set("counter", Value::Int(0), 0).unwrap();
        cache.decr("counter").unwrap();
        cache.decr("counter").unwrap();
        assert_eq!(cache.get("counter").unwrap(), "-2");
    }

    #[test]
    fn test_incr_type_mismatch() {
        let (_dir, cache) = cache();
        cache.set("name", Value::from("Ann"), 0).unwrap();
        assert!(matches!(
            cache.incr("name"),
            Err(CacheError::TypeMismatch(_))
        ));
        assert!(cache.incr("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_incr_keeps_ttl_and_restarts_countdown() {
        let (_dir, cache) = cache();
        let path = cache.path_for("hits").unwrap();
        let stale = Entry::at(Value::Int(0), unix_now() - 15, 20);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, stale.encode().unwrap()).unwrap();

        assert_eq!(cache.incr("hits").unwrap(), Value::Int(1));

        let entry = Entry::decode(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(entry.ttl, 20);
        assert!(entry.created_at >= unix_now() - 1);
    }

    #[test]
    fn test_expire() {
        let (_dir, cache) = cache();
        cache.set("blob", Value::json(&vec![1, 2, 3]).unwrap(), 0).unwrap();

        assert!(cache.expire("blob", Duration::from_secs(2)));
        assert!(!cache.expire("missing", Duration::from_secs(2)));

        // The value keeps its stored type.
        assert_eq!(cache.get("blob").unwrap(), serde_json::json!([1, 2, 3]));

        thread::sleep(Duration::from_millis(2100));
        assert!(cache.get("blob").unwrap_err().is_not_found());
    }

    #[test]
    fn test_expire_rounds_partial_seconds_up() {
        let (_dir, cache) = cache();
        cache.set("k", Value::from("v"), 0).unwrap();
        let path = cache.path_for("k").unwrap();
        let ttl_on_disk = || Entry::decode(&fs::read(&path).unwrap()).unwrap().ttl;

        assert!(cache.expire("k", Duration::from_millis(500)));
        assert_eq!(ttl_on_disk(), 1);

        assert!(cache.expire("k", Duration::from_millis(2001)));
        assert_eq!(ttl_on_disk(), 3);

        assert!(cache.expire("k", Duration::from_secs(4)));
        assert_eq!(ttl_on_disk(), 4);

        assert!(cache.expire("k", Duration::MAX));
        assert_eq!(ttl_on_disk(), u64::MAX);

        assert!(cache.expire("k", Duration::ZERO));
        assert_eq!(ttl_on_disk(), 0);
    }

    #[test]
    fn test_sub_second_expire_does_expire() {
        let (_dir, cache) = cache();
        cache.set("k", Value::from("v"), 0).unwrap();
        assert!(cache.expire("k", Duration::from_millis(500)));

        thread::sleep(Duration::from_millis(1100));
        assert!(cache.get("k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_huge_ttl_is_kept() {
        let (_dir, cache) = cache();
        cache.set("k", Value::from("v"), u64::MAX).unwrap();
        assert_eq!(cache.get("k").unwrap(), "v");
    }

    #[test]
    fn test_flush() {
        let (_dir, cache) = cache();
        cache.set("a", Value::Int(1), 0).unwrap();
        cache.set("users_1", Value::Int(1), 0).unwrap();

        cache.flush().unwrap();
        assert!(!cache.root().exists());
        assert!(cache.flush().is_ok());

        cache.set("a", Value::Int(2), 0).unwrap();
        assert_eq!(cache.get("a").unwrap(), "2");
    }

    #[test]
    fn test_clear_bucket() {
        let (_dir, cache) = cache();
        let user = serde_json::json!({"name": "Ann"});
        cache.set("users_42", Value::json(&user).unwrap(), 0).unwrap();
        cache.set("users_43", Value::from("Bo"), 0).unwrap();
        cache.set("orders_1", Value::Int(1), 0).unwrap();
        cache.set("plain", Value::Int(1), 0).unwrap();

        assert!(cache.path_for("users_42").unwrap().starts_with(cache.root().join("users")));

        cache.clear("users").unwrap();
        assert!(!cache.exists("users_42"));
        assert!(!cache.exists("users_43"));
        assert!(cache.exists("orders_1"));
        assert!(cache.exists("plain"));

        // Clearing an absent bucket is fine.
        cache.clear("users").unwrap();
    }

    #[test]
    fn test_bucket_names_stay_inside_root() {
        let (dir, cache) = cache();
        let sibling = dir.path().join("precious");
        fs::create_dir_all(&sibling).unwrap();
        fs::write(sibling.join("data.txt"), b"keep").unwrap();

        for name in ["..", ".", "precious/..", "/tmp"] {
            assert!(
                matches!(cache.clear(name), Err(CacheError::InvalidArgument(_))),
                "clear({name:?}) should be rejected"
            );
        }
        assert!(sibling.join("data.txt").exists());
        assert!(cache.root().exists());

        let outside = format!("{}_x", sibling.display());
        assert!(matches!(
            cache.set(&outside, Value::Int(1), 0),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.set("../precious_x", Value::Int(1), 0),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.set("a/b_x", Value::Int(1), 0),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.get("../precious_x"),
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(!cache.exists("../precious_x"));
        assert!(matches!(
            cache.size(".."),
            Err(CacheError::InvalidArgument(_))
        ));

        // Nothing was written anywhere.
        assert_eq!(cache.len().unwrap(), 0);
        assert_eq!(fs::read_dir(&sibling).unwrap().count(), 1);
    }

    #[test]
    fn test_clear_single_key() {
        let (_dir, cache) = cache();
        cache.set("users_1", Value::Int(1), 0).unwrap();
        cache.set("users_2", Value::Int(2), 0).unwrap();

        cache.clear("users_1").unwrap();
        assert!(!cache.exists("users_1"));
        assert!(cache.exists("users_2"));
        assert!(cache.clear("").is_err());
    }

    #[test]
    fn test_size() {
        let (_dir, cache) = cache();
        assert_eq!(cache.size("users").unwrap(), 0);

        cache.set("users_1", Value::from("Ann"), 0).unwrap();
        let one = fs::metadata(cache.path_for("users_1").unwrap()).unwrap().len();
        assert_eq!(cache.size("users").unwrap(), one);

        cache.set("plain", Value::from("x"), 0).unwrap();
        let two = fs::metadata(cache.path_for("plain").unwrap()).unwrap().len();
        assert_eq!(cache.size("").unwrap(), one + two);
    }

    #[test]
    fn test_hash_set_and_delete() {
        let (_dir, cache) = cache();

        // HSet on a missing key writes nothing.
        assert!(!cache.hset("h", &fields(&[("a", "1")])).unwrap());
        assert!(!cache.exists("h"));

        cache.hmset("h", &Profile::default()).unwrap();
        cache.hdel("h", "id").unwrap();
        cache.hdel("h", "admin").unwrap();
        assert_eq!(cache.hgetall("h").unwrap(), FlatRecord::new());

        assert!(cache.hset("h", &fields(&[("a", "1")])).unwrap());
        assert_eq!(cache.hgetall("h").unwrap(), fields(&[("a", "1")]));

        cache.hdel("h", "a").unwrap();
        assert_eq!(cache.hgetall("h").unwrap(), FlatRecord::new());

        // Deleting from a missing key is a no-op.
        cache.hdel("nothing", "a").unwrap();
    }

    #[test]
    fn test_hmset_and_scan() {
        let (_dir, cache) = cache();
        let profile = Profile {
            id: 42,
            name: "Ann".into(),
            admin: true,
        };
        cache.hmset("users_42", &profile).unwrap();

        let stored = cache.hgetall("users_42").unwrap();
        assert_eq!(
            stored,
            fields(&[("admin", "true"), ("id", "42"), ("name", "Ann")])
        );

        let mut restored = Profile::default();
        cache.hmscan(&stored, &mut restored).unwrap();
        assert_eq!(restored, profile);

        assert!(matches!(
            cache.hmset("", &profile),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_hmget_and_hget() {
        let (_dir, cache) = cache();
        cache
            .hmset(
                "p",
                &Profile {
                    id: 1,
                    name: "Bo".into(),
                    admin: false,
                },
            )
            .unwrap();

        assert_eq!(
            cache.hmget("p", &["name", "id", "nope"]).unwrap(),
            fields(&[("id", "1"), ("name", "Bo")])
        );
        assert_eq!(cache.hget("p", "name").unwrap(), "Bo");
        assert!(cache.hget("p", "nope").unwrap_err().is_not_found());
        assert!(cache.hget("q", "name").unwrap_err().is_not_found());
        assert!(cache.hmget("q", &["name"]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_hset_merges_fields() {
        let (_dir, cache) = cache();
        cache
            .hmset(
                "p",
                &Profile {
                    id: 1,
                    name: "Bo".into(),
                    admin: false,
                },
            )
            .unwrap();

        assert!(cache
            .hset("p", &fields(&[("name", "Cy"), ("city", "Oslo")]))
            .unwrap());
        assert_eq!(
            cache.hgetall("p").unwrap(),
            fields(&[
                ("admin", "false"),
                ("city", "Oslo"),
                ("id", "1"),
                ("name", "Cy")
            ])
        );
    }

    #[test]
    fn test_hash_on_scalar_is_shape_mismatch() {
        let (_dir, cache) = cache();
        cache.set("s", Value::from("text"), 0).unwrap();
        assert!(matches!(
            cache.hgetall("s"),
            Err(CacheError::ShapeMismatch(_))
        ));

        cache
            .set("list", Value::json(&vec!["a"]).unwrap(), 0)
            .unwrap();
        assert!(matches!(
            cache.hget("list", "a"),
            Err(CacheError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_hgetall_stringifies_json_values() {
        let (_dir, cache) = cache();
        let doc = serde_json::json!({"n": 5, "ok": true, "s": "x"});
        cache.set("h", Value::json(&doc).unwrap(), 0).unwrap();
        assert_eq!(
            cache.hgetall("h").unwrap(),
            fields(&[("n", "5"), ("ok", "true"), ("s", "x")])
        );
    }

    #[test]
    fn test_writes_leave_no_temp_files() {
        let (_dir, cache) = cache();
        for i in 0..20 {
            cache.set("users_1", Value::Int(i), 0).unwrap();
        }
        let shard = cache.path_for("users_1").unwrap();
        let names: Vec<_> = fs::read_dir(shard.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![shard.file_name().unwrap().to_os_string()]);
        assert_eq!(cache.get_value("users_1").unwrap(), Value::Int(19));
    }

    #[test]
    fn test_len_and_size_skip_temp_files() {
        let (_dir, cache) = cache();
        cache.set("users_1", Value::from("Ann"), 0).unwrap();
        let path = cache.path_for("users_1").unwrap();
        let one = fs::metadata(&path).unwrap().len();

        // A write interrupted before its rename.
        fs::write(path.with_file_name(".tmpXYZ123"), b"\x01half").unwrap();

        assert_eq!(cache.len().unwrap(), 1);
        assert!(!cache.is_empty().unwrap());
        assert_eq!(cache.size("users").unwrap(), one);
    }

    #[test]
    fn test_len_after_flush() {
        let (_dir, cache) = cache();
        cache.set("a", Value::Int(1), 0).unwrap();
        cache.flush().unwrap();
        assert_eq!(cache.len().unwrap(), 0);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_corrupt_entry_is_decode_error() {
        let (_dir, cache) = cache();
        cache.set("key", Value::from("value"), 0).unwrap();
        fs::write(cache.path_for("key").unwrap(), b"\x09garbage").unwrap();
        assert!(matches!(cache.get("key"), Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_concurrent_incr_loses_no_updates() {
        let (_dir, cache) = cache();
        let cache = Arc::new(cache);
        cache.set("counter", Value::Uint(0), 0).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..25 {
                        cache.incr("counter").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.get_value("counter").unwrap(), Value::Uint(200));
    }
}
