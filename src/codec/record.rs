//! Record Field Descriptors
//!
//! A record type describes its fields once, at compile time, through
//! [`impl_record!`](crate::impl_record). The macro emits a const table of
//! [`FieldDescriptor`]s and two visitors that pair each descriptor with a
//! borrowed view of the field. The flattening code in [`super::flat`] only
//! ever talks to these views; it never inspects types at runtime.
//!
//! ## Example
//!
//! ```
//! use filekv::codec::{flatten, FieldTag};
//! use filekv::impl_record;
//!
//! #[derive(Debug, Default)]
//! struct Audit {
//!     created_by: String,
//! }
//!
//! impl_record!(Audit {
//!     created_by: String => FieldTag::legacy("column:created_by;size:64"),
//! });
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     audit: Audit,
//!     id: u64,
//!     name: String,
//!     password: String,
//! }
//!
//! impl_record!(User {
//!     audit: Audit => FieldTag::embedded(),
//!     id: u64 => FieldTag::new("id"),
//!     name: String => FieldTag::new("name"),
//!     password: String => FieldTag::none(),
//! });
//!
//! let user = User { id: 7, name: "Ann".into(), ..Default::default() };
//! let flat = flatten(&user);
//! assert_eq!(flat.get("id").map(String::as_str), Some("7"));
//! assert!(!flat.contains_key("password"));
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};

/// Text layout used for timestamp fields.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What kind of data a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Uint,
    Float,
    Bool,
    Str,
    Bytes,
    Timestamp,
    /// Another record; flattened only when the field is embedded
    Record,
}

/// Naming metadata for a field.
///
/// The explicit tag wins. Without one, the `column:` segment of a legacy
/// ORM-style tag such as `"column:user_name;type:varchar(64)"` is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTag {
    tag: Option<&'static str>,
    legacy: Option<&'static str>,
    embedded: bool,
}

impl FieldTag {
    /// A field stored under `tag`.
    pub const fn new(tag: &'static str) -> Self {
        Self {
            tag: Some(tag),
            legacy: None,
            embedded: false,
        }
    }

    /// A field named only by a legacy ORM tag.
    pub const fn legacy(legacy: &'static str) -> Self {
        Self {
            tag: None,
            legacy: Some(legacy),
            embedded: false,
        }
    }

    /// A field that is never stored.
    pub const fn none() -> Self {
        Self {
            tag: None,
            legacy: None,
            embedded: false,
        }
    }

    /// An embedded record whose fields are merged into the parent.
    pub const fn embedded() -> Self {
        Self {
            tag: None,
            legacy: None,
            embedded: true,
        }
    }

    /// Adds a legacy tag used when the explicit tag is absent or empty.
    pub const fn or_legacy(self, legacy: &'static str) -> Self {
        Self {
            legacy: Some(legacy),
            ..self
        }
    }

    /// Returns true if the field is an embedded record.
    pub const fn is_embedded(&self) -> bool {
        self.embedded
    }

    /// Resolves the name the field is stored under.
    pub fn resolve(&self) -> Option<&'static str> {
        match self.tag {
            Some(tag) if !tag.is_empty() => Some(tag),
            _ => self.legacy.and_then(legacy_column),
        }
    }
}

/// Extracts the column name from a legacy ORM tag.
fn legacy_column(spec: &'static str) -> Option<&'static str> {
    spec.split(';')
        .filter_map(|part| part.trim().strip_prefix("column:"))
        .map(str::trim)
        .find(|name| !name.is_empty())
}

/// Static metadata for one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Rust field name
    pub name: &'static str,
    pub kind: FieldKind,
    pub tag: FieldTag,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldKind, tag: FieldTag) -> Self {
        Self { name, kind, tag }
    }
}

/// A record that can be flattened into a [`FlatRecord`](super::FlatRecord).
///
/// Implemented by [`impl_record!`](crate::impl_record); the visitors walk
/// fields in declaration order.
pub trait Record {
    /// The field table, in declaration order.
    fn descriptors(&self) -> &'static [FieldDescriptor];

    /// Calls `visit` for each field with a read-only view.
    fn visit_fields(&self, visit: &mut dyn FnMut(&FieldDescriptor, Slot<'_>));

    /// Calls `visit` for each field with a writable view.
    fn visit_fields_mut(&mut self, visit: &mut dyn FnMut(&FieldDescriptor, SlotMut<'_>));
}

/// Read-only view of a field.
pub enum Slot<'a> {
    Scalar(&'a dyn Scalar),
    Record(&'a dyn Record),
}

/// Writable view of a field.
pub enum SlotMut<'a> {
    Scalar(&'a mut dyn Scalar),
    Record(&'a mut dyn Record),
}

/// A type usable as a record field.
pub trait Field {
    const KIND: FieldKind;

    fn slot(&self) -> Slot<'_>;

    fn slot_mut(&mut self) -> SlotMut<'_>;
}

/// A field value with a text form.
pub trait Scalar {
    /// Text form of the value, or `None` when there is nothing to store.
    fn render(&self) -> Option<String>;

    /// Sets the value from text. Returns false if the text did not parse
    /// cleanly; the field then holds its lenient fallback.
    fn parse(&mut self, text: &str) -> bool;
}

macro_rules! scalar_field {
    ($kind:ident: $($t:ty),*) => {
        $(
            impl Field for $t {
                const KIND: FieldKind = FieldKind::$kind;

                fn slot(&self) -> Slot<'_> {
                    Slot::Scalar(self)
                }

                fn slot_mut(&mut self) -> SlotMut<'_> {
                    SlotMut::Scalar(self)
                }
            }
        )*
    };
}

// Numbers that fail to parse become zero.
macro_rules! numeric_scalar {
    ($($t:ty),*) => {
        $(
            impl Scalar for $t {
                fn render(&self) -> Option<String> {
                    Some(self.to_string())
                }

                fn parse(&mut self, text: &str) -> bool {
                    match text.parse::<$t>() {
                        Ok(v) => {
                            *self = v;
                            true
                        }
                        Err(_) => {
                            *self = <$t>::default();
                            false
                        }
                    }
                }
            }
        )*
    };
}

scalar_field!(Int: i8, i16, i32, i64, isize);
scalar_field!(Uint: u8, u16, u32, u64, usize);
scalar_field!(Float: f32, f64);
scalar_field!(Bool: bool);
scalar_field!(Str: String);
scalar_field!(Bytes: Vec<u8>);
scalar_field!(Timestamp: NaiveDateTime, DateTime<Utc>);

numeric_scalar!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Scalar for bool {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn parse(&mut self, text: &str) -> bool {
        *self = text == "true";
        *self || text == "false"
    }
}

impl Scalar for String {
    fn render(&self) -> Option<String> {
        Some(self.clone())
    }

    fn parse(&mut self, text: &str) -> bool {
        *self = text.to_string();
        true
    }
}

impl Scalar for Vec<u8> {
    fn render(&self) -> Option<String> {
        Some(String::from_utf8_lossy(self).into_owned())
    }

    fn parse(&mut self, text: &str) -> bool {
        *self = text.as_bytes().to_vec();
        true
    }
}

/// Parses the date-time part of a timestamp, dropping any `+hh:mm` suffix.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let datetime = text.split('+').next().unwrap_or(text).trim();
    NaiveDateTime::parse_from_str(datetime, TIMESTAMP_FORMAT).ok()
}

impl Scalar for NaiveDateTime {
    fn render(&self) -> Option<String> {
        Some(self.format(TIMESTAMP_FORMAT).to_string())
    }

    // Unparseable text leaves the field untouched.
    fn parse(&mut self, text: &str) -> bool {
        match parse_timestamp(text) {
            Some(ts) => {
                *self = ts;
                true
            }
            None => false,
        }
    }
}

impl Scalar for DateTime<Utc> {
    fn render(&self) -> Option<String> {
        Some(self.format(TIMESTAMP_FORMAT).to_string())
    }

    fn parse(&mut self, text: &str) -> bool {
        match parse_timestamp(text) {
            Some(ts) => {
                *self = ts.and_utc();
                true
            }
            None => false,
        }
    }
}

impl<T: Scalar + Default> Scalar for Option<T> {
    fn render(&self) -> Option<String> {
        self.as_ref().and_then(Scalar::render)
    }

    fn parse(&mut self, text: &str) -> bool {
        let mut value = T::default();
        let clean = value.parse(text);
        *self = Some(value);
        clean
    }
}

impl<T: Field + Scalar + Default> Field for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn slot(&self) -> Slot<'_> {
        Slot::Scalar(self)
    }

    fn slot_mut(&mut self) -> SlotMut<'_> {
        SlotMut::Scalar(self)
    }
}

/// Implements [`Record`] and [`Field`] for a struct.
///
/// Each entry names a field, its type, and a [`FieldTag`] expression.
/// Listed fields are walked in the order given; unlisted fields are
/// invisible to the codec.
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($field:ident : $fty:ty => $tag:expr),* $(,)? }) => {
        impl $crate::codec::Record for $ty {
            fn descriptors(&self) -> &'static [$crate::codec::FieldDescriptor] {
                const FIELDS: &[$crate::codec::FieldDescriptor] = &[
                    $(
                        $crate::codec::FieldDescriptor::new(
                            stringify!($field),
                            <$fty as $crate::codec::Field>::KIND,
                            $tag,
                        ),
                    )*
                ];
                FIELDS
            }

            #[allow(unused_variables, unused_mut)]
            fn visit_fields(
                &self,
                visit: &mut dyn FnMut(&$crate::codec::FieldDescriptor, $crate::codec::Slot<'_>),
            ) {
                let mut fields = $crate::codec::Record::descriptors(self).iter();
                $(
                    if let Some(descriptor) = fields.next() {
                        visit(descriptor, <$fty as $crate::codec::Field>::slot(&self.$field));
                    }
                )*
            }

            #[allow(unused_variables, unused_mut)]
            fn visit_fields_mut(
                &mut self,
                visit: &mut dyn FnMut(&$crate::codec::FieldDescriptor, $crate::codec::SlotMut<'_>),
            ) {
                let mut fields = $crate::codec::Record::descriptors(self).iter();
                $(
                    if let Some(descriptor) = fields.next() {
                        visit(descriptor, <$fty as $crate::codec::Field>::slot_mut(&mut self.$field));
                    }
                )*
            }
        }

        impl $crate::codec::Field for $ty {
            const KIND: $crate::codec::FieldKind = $crate::codec::FieldKind::Record;

            fn slot(&self) -> $crate::codec::Slot<'_> {
                $crate::codec::Slot::Record(self)
            }

            fn slot_mut(&mut self) -> $crate::codec::SlotMut<'_> {
                $crate::codec::SlotMut::Record(self)
            }
        }
    };
}
