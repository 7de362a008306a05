//! Support for `profile.db`, the per-profile metric values.
//!
//! Every application thread or process that was measured produces one profile. A profile is
//! named by a hierarchical identifier tuple, for example `NODE 3, RANK 0, THREAD 12`, and holds
//! a sparse map from context id to metric id to value. A single summary profile without an
//! identifier tuple holds the summary statistics over all other profiles.

use std::collections::BTreeMap;

use hpcdb_common::read_u16;

use crate::error::{FormatError, FormatErrorKind};
use crate::header::{FileFormat, FileHeader, SectionDef};
use crate::sparse::{decode_block, BlockRef};
use crate::structure::{Field, FieldType, VersionedStructure};
use crate::utils::{capacity_hint, check_array, scaled_range, version_flags};

/// The newest `profile.db` minor version this crate knows about.
pub const MAX_MINOR_VERSION: u8 = 0;

/// The `profile.db` container format.
pub const FORMAT: FileFormat = FileFormat {
    code: *b"prof",
    footer: *b"_prof.db",
    max_minor_version: MAX_MINOR_VERSION,
    sections: &[
        SectionDef::new("ProfileInfos", 0),
        SectionDef::new("IdTuples", 0),
    ],
};

const PROFILE_INFOS_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pProfiles", 0, 0x00, FieldType::U64),
    Field::new("nProfiles", 0, 0x08, FieldType::U32),
    Field::new("szProfile", 0, 0x0c, FieldType::U8),
]);

const PROFILE: VersionedStructure = VersionedStructure::new(&[
    Field::new("nValues", 0, 0x00, FieldType::U64),
    Field::new("pValues", 0, 0x08, FieldType::U64),
    Field::new("nCtxs", 0, 0x10, FieldType::U32),
    Field::new("pCtxIndices", 0, 0x18, FieldType::U64),
    Field::new("pIdTuple", 0, 0x20, FieldType::U64),
    Field::new("flags", 0, 0x28, FieldType::U32),
]);

const IDENTIFIER: VersionedStructure = VersionedStructure::new(&[
    Field::new("kind", 0, 0x00, FieldType::U8),
    Field::new("flags", 0, 0x02, FieldType::U16),
    Field::new("logicalId", 0, 0x04, FieldType::U32),
    Field::new("physicalId", 0, 0x08, FieldType::U64),
]);

/// Identifiers start after the `nIds` field, padded to 8 bytes.
const IDENTIFIERS_OFFSET: u64 = 0x08;
const IDENTIFIER_SIZE: u64 = 0x10;

version_flags! {
    /// Flags of a [`Profile`].
    pub struct ProfileFlags: u32 {
        /// The profile holds summary statistics over all other profiles.
        const IS_SUMMARY = 0, since 0;
    }
}

version_flags! {
    /// Flags of an [`Identifier`].
    pub struct IdentifierFlags: u16 {
        /// The physical id carries a meaningful hardware id.
        const IS_PHYSICAL = 0, since 0;
    }
}

/// One level of a hierarchical profile identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Identifier {
    /// The identifier kind, an index into the `meta.db` identifier names.
    pub kind: u8,
    /// Flags, see [`IdentifierFlags`].
    pub flags: IdentifierFlags,
    /// The logical id, for example an MPI rank.
    pub logical_id: u32,
    /// The physical id, for example a hardware thread id.
    pub physical_id: u64,
}

/// An identifier tuple, ordered from the outermost to the innermost level.
pub type IdentifierTuple = Vec<Identifier>;

/// Metric values of a single profile.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Profile {
    /// The identifier of the profile, `None` for the summary profile.
    pub id_tuple: Option<IdentifierTuple>,
    /// Flags, see [`ProfileFlags`].
    pub flags: ProfileFlags,
    /// Values by context id and metric id.
    pub values: BTreeMap<u32, BTreeMap<u16, f64>>,
}

impl Profile {
    /// Returns `true` if this is the summary profile.
    ///
    /// Summary profiles use summary statistic ids instead of propagated metric ids.
    pub fn is_summary(&self) -> bool {
        self.flags.contains(ProfileFlags::IS_SUMMARY) || self.id_tuple.is_none()
    }

    /// Returns the values of the given context, keyed by metric id.
    pub fn context_values(&self, ctx_id: u32) -> Option<&BTreeMap<u16, f64>> {
        self.values.get(&ctx_id)
    }
}

/// A decoded `profile.db` file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProfileDb {
    minor_version: u8,
    profiles: Vec<Profile>,
}

impl ProfileDb {
    /// Returns whether the buffer starts like a `profile.db` file.
    pub fn test(data: &[u8]) -> bool {
        data.starts_with(b"HPCTOOLKITprof")
    }

    /// Parses a `profile.db` file.
    #[tracing::instrument(level = "trace", name = "ProfileDb::parse", skip_all)]
    pub fn parse(buf: &[u8]) -> Result<Self, FormatError> {
        let header = FileHeader::parse(buf, &FORMAT)?;
        let version = header.minor_version;

        let section = PROFILE_INFOS_SECTION.decode(
            version,
            buf,
            header.section("ProfileInfos")?.offset,
        )?;
        let count = section.u64("nProfiles")?;
        let stride = section.u64("szProfile")?;

        let mut profiles = Vec::with_capacity(capacity_hint(buf, count, stride));
        for offset in scaled_range(section.u64("pProfiles")?, count, stride) {
            let profile = tracing::trace_span!("Profile::parse", offset)
                .in_scope(|| parse_profile(version, buf, offset))?;
            profiles.push(profile);
        }

        tracing::debug!(profiles = profiles.len(), "decoded profile.db");
        Ok(ProfileDb {
            minor_version: version,
            profiles,
        })
    }

    /// The minor version of the file.
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    /// All profiles, in file order. Profile indices in `cct.db` and `trace.db` refer to this list.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Returns the profile at `index`.
    pub fn profile(&self, index: u32) -> Option<&Profile> {
        self.profiles.get(index as usize)
    }

    /// Returns the summary profile, if the database has one.
    pub fn summary(&self) -> Option<&Profile> {
        self.profiles.iter().find(|profile| profile.is_summary())
    }
}

fn parse_profile(version: u8, buf: &[u8], offset: u64) -> Result<Profile, FormatError> {
    let record = PROFILE.decode(version, buf, offset)?;

    let id_tuple = match record.u64("pIdTuple")? {
        0 => None,
        ptr => Some(parse_id_tuple(version, buf, ptr)?),
    };

    let values = decode_block::<u32, u16>(
        buf,
        BlockRef {
            n_values: record.u64("nValues")?,
            p_values: record.u64("pValues")?,
            n_index: record.u64("nCtxs")?,
            p_index: record.u64("pCtxIndices")?,
        },
    )?;

    Ok(Profile {
        id_tuple,
        flags: ProfileFlags::from_bits_versioned(version, record.u32("flags")?),
        values,
    })
}

fn parse_id_tuple(version: u8, buf: &[u8], offset: u64) -> Result<IdentifierTuple, FormatError> {
    let count = read_u16(buf, offset).ok_or(FormatErrorKind::TruncatedStructure {
        offset,
        required: IDENTIFIERS_OFFSET,
        available: (buf.len() as u64).saturating_sub(offset),
    })?;
    let start = offset + IDENTIFIERS_OFFSET;
    check_array(buf, start, count.into(), IDENTIFIER_SIZE)?;

    scaled_range(start, count.into(), IDENTIFIER_SIZE)
        .map(|offset| {
            let record = IDENTIFIER.decode(version, buf, offset)?;
            Ok(Identifier {
                kind: record.u8("kind")?,
                flags: IdentifierFlags::from_bits_versioned(version, record.u16("flags")?),
                logical_id: record.u32("logicalId")?,
                physical_id: record.u64("physicalId")?,
            })
        })
        .collect()
}
