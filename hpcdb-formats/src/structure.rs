//! Declarative descriptions of fixed-layout, version-gated records.
//!
//! Every record in the formats has a fixed layout for a given minor version. New minor versions
//! only ever append fields at higher offsets, so a record is fully described by a single table of
//! `(name, minimum version, offset, type)` entries. [`VersionedStructure`] holds such a table and
//! decodes records into a [`Record`] containing exactly the fields the file's version defines.

use std::fmt;

use hpcdb_common::{
    read_f64, read_i16, read_i32, read_i64, read_i8, read_u16, read_u32, read_u64, read_u8,
};
use indexmap::IndexMap;

use crate::error::{FormatError, FormatErrorKind};

/// The primitive type of a [`Field`].
///
/// Only fixed-width little-endian types exist in the formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// IEEE-754 double precision float.
    F64,
}

impl FieldType {
    /// The width of this type in bytes.
    pub const fn size(self) -> u64 {
        match self {
            FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 => 4,
            FieldType::U64 | FieldType::I64 | FieldType::F64 => 8,
        }
    }

    fn read(self, buf: &[u8], offset: u64) -> Option<Value> {
        Some(match self {
            FieldType::U8 => Value::U8(read_u8(buf, offset)?),
            FieldType::U16 => Value::U16(read_u16(buf, offset)?),
            FieldType::U32 => Value::U32(read_u32(buf, offset)?),
            FieldType::U64 => Value::U64(read_u64(buf, offset)?),
            FieldType::I8 => Value::I8(read_i8(buf, offset)?),
            FieldType::I16 => Value::I16(read_i16(buf, offset)?),
            FieldType::I32 => Value::I32(read_i32(buf, offset)?),
            FieldType::I64 => Value::I64(read_i64(buf, offset)?),
            FieldType::F64 => Value::F64(read_f64(buf, offset)?),
        })
    }
}

/// One named field of a [`VersionedStructure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// The name of the field.
    pub name: &'static str,
    /// The minor version that introduced the field.
    pub min_version: u8,
    /// The byte offset of the field from the start of the record.
    pub offset: u64,
    /// The primitive type of the field.
    pub ty: FieldType,
}

impl Field {
    /// Creates a new field description.
    pub const fn new(name: &'static str, min_version: u8, offset: u64, ty: FieldType) -> Self {
        Field {
            name,
            min_version,
            offset,
            ty,
        }
    }

    const fn end(&self) -> u64 {
        self.offset + self.ty.size()
    }
}

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// See [`FieldType::U8`].
    U8(u8),
    /// See [`FieldType::U16`].
    U16(u16),
    /// See [`FieldType::U32`].
    U32(u32),
    /// See [`FieldType::U64`].
    U64(u64),
    /// See [`FieldType::I8`].
    I8(i8),
    /// See [`FieldType::I16`].
    I16(i16),
    /// See [`FieldType::I32`].
    I32(i32),
    /// See [`FieldType::I64`].
    I64(i64),
    /// See [`FieldType::F64`].
    F64(f64),
}

impl Value {
    /// Returns the value as `u64` if it is an unsigned integer.
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::U64(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it is a signed integer.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Value::I8(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the value if it is a float.
    pub fn as_f64(self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::U8(v) => write!(f, "{v:#x}"),
            Value::U16(v) => write!(f, "{v:#x}"),
            Value::U32(v) => write!(f, "{v:#x}"),
            Value::U64(v) => write!(f, "{v:#x}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
        }
    }
}

/// The fields of one decoded record, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<&'static str, Value>,
}

impl Record {
    /// Returns the value of the named field, or `None` if the record's version does not define it.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.get(name).copied()
    }

    /// Returns `true` if the record's version defines the named field.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The number of decoded fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no fields were decoded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Value)> + '_ {
        self.fields.iter().map(|(name, value)| (*name, *value))
    }

    /// Returns a required unsigned field, widened to `u64`.
    pub fn u64(&self, name: &'static str) -> Result<u64, FormatError> {
        self.get(name)
            .and_then(Value::as_u64)
            .ok_or_else(|| FormatErrorKind::MissingField(name).into())
    }

    /// Returns a required unsigned field that must fit into `u32`.
    pub fn u32(&self, name: &'static str) -> Result<u32, FormatError> {
        self.narrow(name)
    }

    /// Returns a required unsigned field that must fit into `u16`.
    pub fn u16(&self, name: &'static str) -> Result<u16, FormatError> {
        self.narrow(name)
    }

    /// Returns a required unsigned field that must fit into `u8`.
    pub fn u8(&self, name: &'static str) -> Result<u8, FormatError> {
        self.narrow(name)
    }

    fn narrow<T: TryFrom<u64>>(&self, name: &'static str) -> Result<T, FormatError> {
        T::try_from(self.u64(name)?).map_err(|_| FormatErrorKind::MissingField(name).into())
    }
}

/// A fixed-layout record whose fields are gated by minor version.
///
/// # Example
///
/// ```
/// use hpcdb_formats::structure::{Field, FieldType, Value, VersionedStructure};
///
/// const PAIR: VersionedStructure = VersionedStructure::new(&[
///     Field::new("foo", 0, 0, FieldType::U8),
///     Field::new("bar", 1, 1, FieldType::U8),
/// ]);
///
/// assert_eq!(PAIR.size(0), 1);
/// assert_eq!(PAIR.size(1), 2);
///
/// let record = PAIR.decode(0, &[0x10, 0x20], 0).unwrap();
/// assert_eq!(record.get("foo"), Some(Value::U8(0x10)));
/// assert_eq!(record.get("bar"), None);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct VersionedStructure {
    fields: &'static [Field],
}

impl VersionedStructure {
    /// Creates a structure from its field table.
    pub const fn new(fields: &'static [Field]) -> Self {
        VersionedStructure { fields }
    }

    /// Returns all fields, regardless of version.
    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    fn fields_at(&self, version: u8) -> impl Iterator<Item = &'static Field> {
        self.fields
            .iter()
            .filter(move |field| field.min_version <= version)
    }

    /// The size in bytes of the record at the given minor version.
    ///
    /// This is the smallest size that covers every field defined at `version`.
    pub fn size(&self, version: u8) -> u64 {
        self.fields_at(version).map(Field::end).max().unwrap_or(0)
    }

    /// Decodes the record starting at `offset` in `buf`.
    ///
    /// Fails with [`FormatErrorKind::TruncatedStructure`] if fewer than
    /// [`size(version)`](Self::size) bytes are available at `offset`.
    pub fn decode(&self, version: u8, buf: &[u8], offset: u64) -> Result<Record, FormatError> {
        let required = self.size(version);
        let available = (buf.len() as u64).saturating_sub(offset);
        if offset > buf.len() as u64 || available < required {
            return Err(FormatErrorKind::TruncatedStructure {
                offset,
                required,
                available,
            }
            .into());
        }

        let mut fields = IndexMap::with_capacity(self.fields.len());
        for field in self.fields_at(version) {
            // The size check above covers every field defined at this version.
            let value = field.ty.read(buf, offset + field.offset).ok_or(
                FormatErrorKind::TruncatedStructure {
                    offset,
                    required,
                    available,
                },
            )?;
            fields.insert(field.name, value);
        }

        Ok(Record { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::error::ErrorCategory;

    const FOO_BAR: VersionedStructure = VersionedStructure::new(&[
        Field::new("foo", 0, 0, FieldType::U8),
        Field::new("bar", 1, 1, FieldType::U8),
    ]);

    #[test]
    fn test_size_per_version() {
        assert_eq!(FOO_BAR.size(0), 1);
        assert_eq!(FOO_BAR.size(1), 2);
        assert_eq!(FOO_BAR.size(200), 2);
    }

    #[test]
    fn test_decode_v0() {
        let record = FOO_BAR.decode(0, &[0x10], 0).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("foo"), Some(Value::U8(0x10)));
        assert!(!record.contains("bar"));
    }

    #[test]
    fn test_decode_v1() {
        let record = FOO_BAR.decode(1, &[0x10, 0x20], 0).unwrap();
        let fields: Vec<_> = record.iter().collect();
        assert_eq!(fields, vec![("foo", Value::U8(0x10)), ("bar", Value::U8(0x20))]);
    }

    #[test]
    fn test_decode_truncated() {
        let err = FOO_BAR.decode(1, &[0x10], 0).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TruncatedStructure);
        assert_eq!(
            err.kind(),
            FormatErrorKind::TruncatedStructure {
                offset: 0,
                required: 2,
                available: 1,
            }
        );

        let err = FOO_BAR.decode(0, &[0x10], 5).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TruncatedStructure);
    }

    #[test]
    fn test_decode_at_offset() {
        const MIXED: VersionedStructure = VersionedStructure::new(&[
            Field::new("ptr", 0, 0x00, FieldType::U64),
            Field::new("count", 0, 0x08, FieldType::U32),
            Field::new("delta", 0, 0x0c, FieldType::I16),
            Field::new("value", 0, 0x10, FieldType::F64),
        ]);
        assert_eq!(MIXED.size(0), 0x18);

        let mut buf = vec![0xaa; 3];
        buf.extend_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&(-3i16).to_le_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&2.5f64.to_le_bytes());

        let record = MIXED.decode(0, &buf, 3).unwrap();
        assert_eq!(record.u64("ptr").unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(record.u32("count").unwrap(), 7);
        assert_eq!(record.get("delta").and_then(Value::as_i64), Some(-3));
        assert_eq!(record.get("value").and_then(Value::as_f64), Some(2.5));
        assert_eq!(
            record.u8("ptr").unwrap_err().kind(),
            FormatErrorKind::MissingField("ptr")
        );
    }

    #[test]
    fn test_missing_field() {
        let record = FOO_BAR.decode(0, &[0x10, 0x20], 0).unwrap();
        assert_eq!(
            record.u8("bar").unwrap_err().kind(),
            FormatErrorKind::MissingField("bar")
        );
    }
}
