//! Path Sharder
//!
//! Maps a logical key to its file under the store root:
//!
//! ```text
//! <root>[/<bucket>]/<h0>/<h1>/<hex>
//! ```
//!
//! `<hex>` is the MD5 digest of the whole key. The first two hex digits
//! become two directory levels so no single directory grows unbounded.
//! Keys of the form `<bucket>_<rest>` live under a `<bucket>` directory,
//! which is what lets `clear` drop a whole bucket at once.
//!
//! A bucket must be a single plain path segment. Anything that would climb
//! out of the root (`..`, an absolute path, a separator) is rejected.

use crate::error::{CacheError, Result};
use md5::{Digest, Md5};
use std::path::{Component, Path, PathBuf};

/// Separates the bucket from the rest of a key.
pub const BUCKET_DELIMITER: char = '_';

/// Returns the bucket of a key, if it has one.
pub fn bucket_of(key: &str) -> Option<&str> {
    key.split_once(BUCKET_DELIMITER).map(|(bucket, _)| bucket)
}

/// Checks that a bucket name is one plain directory name.
pub fn check_bucket(bucket: &str) -> Result<()> {
    let mut components = Path::new(bucket).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == bucket => Ok(()),
        _ => Err(CacheError::InvalidArgument(format!(
            "invalid bucket name {bucket:?}"
        ))),
    }
}

/// Hex-encoded MD5 digest of a key.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes the file path for a key. Pure; performs no I/O.
///
/// An empty bucket (a key starting with the delimiter) stays at the root.
pub fn path_for(root: &Path, key: &str) -> Result<PathBuf> {
    let hash = hash_key(key);
    let base = match bucket_of(key) {
        Some(bucket) if !bucket.is_empty() => {
            check_bucket(bucket)?;
            root.join(bucket)
        }
        _ => root.to_path_buf(),
    };
    Ok(base.join(&hash[..1]).join(&hash[1..2]).join(&hash))
}
