//! Entry Envelope
//!
//! The unit written to disk for every key: the value, the second it was
//! created and its time-to-live. The envelope is plain bincode with no
//! header, so a change to [`Entry`] is not readable by older builds.

use crate::error::Result;
use crate::storage::value::Value;
use serde::{Deserialize, Serialize};

/// A stored value together with its expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The stored value
    pub value: Value,
    /// Creation time in unix seconds
    pub created_at: i64,
    /// Time-to-live in seconds (0 = never expires)
    pub ttl: u64,
}

impl Entry {
    /// Creates an entry stamped with the current time.
    pub fn new(value: Value, ttl: u64) -> Self {
        Self::at(value, unix_now(), ttl)
    }

    /// Creates an entry with an explicit creation time.
    pub fn at(value: Value, created_at: i64, ttl: u64) -> Self {
        Self {
            value,
            created_at,
            ttl,
        }
    }

    /// Checks whether this entry has expired at `now` (unix seconds).
    ///
    /// A TTL beyond `i64::MAX` seconds can never elapse.
    #[inline]
    pub fn is_expired(&self, now: i64) -> bool {
        self.ttl > 0
            && i64::try_from(self.ttl)
                .is_ok_and(|ttl| now.saturating_sub(self.created_at) >= ttl)
    }

    /// Checks whether this entry has expired right now.
    #[inline]
    pub fn has_expired(&self) -> bool {
        self.is_expired(unix_now())
    }

    /// Serializes the envelope.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes an envelope.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Current time in unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
