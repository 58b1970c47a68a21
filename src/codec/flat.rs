//! Flattening records into field maps and back.
//!
//! Hash-style operations store a whole record as one map of field tag to
//! text. Flattening is best-effort: fields without a tag, nested records
//! that are not embedded and empty values are skipped. Embedded records
//! are merged into their parent; when two fields resolve to the same tag
//! the later one wins.
//!
//! [`unflatten`] is lenient the same way: numbers that do not parse become
//! zero, unparseable timestamps are left alone and unsupported fields are
//! logged and skipped. [`unflatten_strict`] walks identically but reports
//! the first such problem as an error.

use crate::codec::record::{FieldDescriptor, FieldKind, Record, Slot, SlotMut};
use crate::error::{CacheError, Result};
use std::collections::BTreeMap;
use tracing::warn;

/// Field tag to text value.
pub type FlatRecord = BTreeMap<String, String>;

/// Flattens a record into a [`FlatRecord`].
pub fn flatten(record: &dyn Record) -> FlatRecord {
    let mut flat = FlatRecord::new();
    flatten_into(record, &mut flat);
    flat
}

fn flatten_into(record: &dyn Record, flat: &mut FlatRecord) {
    record.visit_fields(&mut |descriptor, slot| match slot {
        Slot::Record(inner) if descriptor.tag.is_embedded() => flatten_into(inner, flat),
        Slot::Record(_) => {}
        Slot::Scalar(scalar) => {
            let Some(tag) = descriptor.tag.resolve() else {
                return;
            };
            if let Some(text) = scalar.render().filter(|text| !text.is_empty()) {
                flat.insert(tag.to_string(), text);
            }
        }
    });
}

/// Fills `record` from a [`FlatRecord`], leniently.
///
/// Fields whose tag is missing or empty in `flat` keep their current value.
pub fn unflatten(flat: &FlatRecord, record: &mut dyn Record) {
    // Lenient mode never fails.
    let _ = unflatten_with(flat, record, false);
}

/// Fills `record` from a [`FlatRecord`], failing on the first value that
/// does not parse or field that cannot be filled.
pub fn unflatten_strict(flat: &FlatRecord, record: &mut dyn Record) -> Result<()> {
    unflatten_with(flat, record, true)
}

fn unflatten_with(flat: &FlatRecord, record: &mut dyn Record, strict: bool) -> Result<()> {
    let mut outcome = Ok(());
    record.visit_fields_mut(&mut |descriptor, slot| {
        if outcome.is_err() {
            return;
        }
        outcome = fill_field(flat, descriptor, slot, strict);
    });
    outcome
}

fn fill_field(
    flat: &FlatRecord,
    descriptor: &FieldDescriptor,
    slot: SlotMut<'_>,
    strict: bool,
) -> Result<()> {
    match slot {
        SlotMut::Record(inner) if descriptor.tag.is_embedded() => {
            unflatten_with(flat, inner, strict)
        }
        SlotMut::Record(_) => {
            let Some(tag) = descriptor.tag.resolve() else {
                return Ok(());
            };
            if !flat.contains_key(tag) {
                return Ok(());
            }
            warn!(
                field = descriptor.name,
                kind = ?descriptor.kind,
                "field type not supported, skipping"
            );
            if strict {
                return Err(CacheError::ShapeMismatch(format!(
                    "field '{}' is a nested record",
                    descriptor.name
                )));
            }
            Ok(())
        }
        SlotMut::Scalar(scalar) => {
            let Some(tag) = descriptor.tag.resolve() else {
                return Ok(());
            };
            let Some(text) = flat.get(tag).filter(|text| !text.is_empty()) else {
                return Ok(());
            };
            if !scalar.parse(text) && strict {
                return Err(CacheError::FieldParse {
                    field: descriptor.name.to_string(),
                    value: text.clone(),
                });
            }
            Ok(())
        }
    }
}

/// Returns true if the kind is handled by [`flatten`] and [`unflatten`].
pub fn is_supported(kind: FieldKind) -> bool {
    kind != FieldKind::Record
}
