//! Record Codec
//!
//! Bridges typed records and the flat `tag -> text` maps that hash-style
//! cache operations store.
//!
//! ```text
//!  User                        flatten        FlatRecord
//!  ├─ base (embedded)       ────────────>    { "id":   "42",
//!  │  ├─ id                                    "name": "Ann",
//!  │  └─ name                                  "age":  "30" }
//!  ├─ name                  <────────────
//!  └─ age                      unflatten
//! ```
//!
//! Field metadata is declared with [`impl_record!`](crate::impl_record).

pub mod flat;
pub mod record;

pub use flat::{flatten, is_supported, unflatten, unflatten_strict, FlatRecord};
pub use record::{
    Field, FieldDescriptor, FieldKind, FieldTag, Record, Scalar, Slot, SlotMut, TIMESTAMP_FORMAT,
};
