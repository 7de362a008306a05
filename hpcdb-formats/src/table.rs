//! Offset-keyed entity tables.
//!
//! Records in `meta.db` reference each other by the absolute offset of the target record. While a
//! section is decoded, its entities are pushed into an [`EntityTable`] under the offset they were
//! read from; later sections then turn stored offsets back into arena indices in O(1).

use std::collections::HashMap;

use crate::error::{EntityKind, FormatError, FormatErrorKind};

/// An ordered list of decoded entities plus an index from file offset to list position.
#[derive(Debug, Clone)]
pub struct EntityTable<T> {
    kind: EntityKind,
    items: Vec<T>,
    by_offset: HashMap<u64, usize>,
}

impl<T> EntityTable<T> {
    /// Creates an empty table for entities of the given kind.
    pub fn new(kind: EntityKind) -> Self {
        Self::with_capacity(kind, 0)
    }

    /// Creates an empty table with room for `capacity` entities.
    pub fn with_capacity(kind: EntityKind, capacity: usize) -> Self {
        EntityTable {
            kind,
            items: Vec::with_capacity(capacity),
            by_offset: HashMap::with_capacity(capacity),
        }
    }

    /// Appends an entity that was decoded from `offset` and returns its index.
    ///
    /// A record stride of 0 makes several entries share an offset; lookups then resolve to the
    /// first one.
    pub fn push(&mut self, offset: u64, item: T) -> usize {
        let index = self.items.len();
        self.items.push(item);
        self.by_offset.entry(offset).or_insert(index);
        index
    }

    /// Returns the index of the entity decoded from `offset`.
    pub fn resolve(&self, offset: u64) -> Result<usize, FormatError> {
        self.by_offset.get(&offset).copied().ok_or_else(|| {
            FormatErrorKind::DanglingReference {
                kind: self.kind,
                offset,
            }
            .into()
        })
    }

    /// Like [`resolve`](Self::resolve), but maps the null offset `0` to `None`.
    pub fn resolve_optional(&self, offset: u64) -> Result<Option<usize>, FormatError> {
        match offset {
            0 => Ok(None),
            offset => self.resolve(offset).map(Some),
        }
    }

    /// Returns the entity at `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// The number of entities in the table.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the table holds no entities.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consumes the table and returns the entities in decode order.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorCategory;

    #[test]
    fn test_resolve() {
        let mut table = EntityTable::new(EntityKind::File);
        assert_eq!(table.push(0x100, "a.c"), 0);
        assert_eq!(table.push(0x110, "b.c"), 1);

        assert_eq!(table.resolve(0x110).unwrap(), 1);
        assert_eq!(table.get(0), Some(&"a.c"));
        assert_eq!(table.resolve_optional(0).unwrap(), None);
        assert_eq!(table.resolve_optional(0x100).unwrap(), Some(0));
        assert_eq!(table.into_items(), vec!["a.c", "b.c"]);
    }

    #[test]
    fn test_dangling() {
        let table = EntityTable::<()>::new(EntityKind::Function);
        let err = table.resolve(0x42).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::DanglingReference);
        assert_eq!(
            err.kind(),
            FormatErrorKind::DanglingReference {
                kind: EntityKind::Function,
                offset: 0x42,
            }
        );
    }
}
