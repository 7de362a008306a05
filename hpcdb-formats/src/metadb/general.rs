//! General properties and identifier kind names of a `meta.db` file.

use hpcdb_common::read_u64;

use crate::error::{FormatError, FormatErrorKind};
use crate::structure::{Field, FieldType, VersionedStructure};
use crate::utils::{capacity_hint, check_array, read_string, scaled_range};

const GENERAL_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pTitle", 0, 0x00, FieldType::U64),
    Field::new("pDescription", 0, 0x08, FieldType::U64),
]);

const ID_NAMES_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("ppNames", 0, 0x00, FieldType::U64),
    Field::new("nKinds", 0, 0x08, FieldType::U8),
]);

/// Human-readable information about the measured program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GeneralProperties {
    /// A short title for the database.
    pub title: String,
    /// A longer, possibly multi-line description.
    pub description: String,
}

impl GeneralProperties {
    pub(crate) fn parse(version: u8, buf: &[u8], offset: u64) -> Result<Self, FormatError> {
        let section = GENERAL_SECTION.decode(version, buf, offset)?;
        Ok(GeneralProperties {
            title: read_string(buf, section.u64("pTitle")?)?,
            description: read_string(buf, section.u64("pDescription")?)?,
        })
    }
}

/// Names of the identifier kinds used in profile identifier tuples.
///
/// The kind stored in an identifier is an index into this list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IdentifierNames {
    /// The kind names, indexed by kind.
    pub names: Vec<String>,
}

impl IdentifierNames {
    pub(crate) fn parse(version: u8, buf: &[u8], offset: u64) -> Result<Self, FormatError> {
        let section = ID_NAMES_SECTION.decode(version, buf, offset)?;
        let start = section.u64("ppNames")?;
        let count = section.u64("nKinds")?;
        check_array(buf, start, count, 8)?;

        let mut names = Vec::with_capacity(capacity_hint(buf, count, 8));
        for ptr in scaled_range(start, count, 8) {
            let name = read_u64(buf, ptr).ok_or(FormatErrorKind::TruncatedStructure {
                offset: ptr,
                required: 8,
                available: (buf.len() as u64).saturating_sub(ptr),
            })?;
            names.push(read_string(buf, name)?);
        }

        Ok(IdentifierNames { names })
    }

    /// Returns the name of the given identifier kind.
    pub fn get(&self, kind: u8) -> Option<&str> {
        self.names.get(usize::from(kind)).map(String::as_str)
    }
}
