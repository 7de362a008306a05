//! Support for `cct.db`, the per-context metric values.
//!
//! `cct.db` is the transpose of `profile.db`. For every context id it stores, per metric, the
//! values of all profiles that have one. Contexts are listed by id, so the i-th entry of the
//! `CtxInfos` section belongs to context id `i`.

use std::collections::BTreeMap;

use crate::error::FormatError;
use crate::header::{FileFormat, FileHeader, SectionDef};
use crate::sparse::{decode_block, BlockRef};
use crate::structure::{Field, FieldType, VersionedStructure};
use crate::utils::{capacity_hint, scaled_range};

/// The newest `cct.db` minor version this crate knows about.
pub const MAX_MINOR_VERSION: u8 = 0;

/// The `cct.db` container format.
pub const FORMAT: FileFormat = FileFormat {
    code: *b"ctxt",
    footer: *b"__ctx.db",
    max_minor_version: MAX_MINOR_VERSION,
    sections: &[SectionDef::new("CtxInfos", 0)],
};

const CTX_INFOS_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pCtxs", 0, 0x00, FieldType::U64),
    Field::new("nCtxs", 0, 0x08, FieldType::U32),
    Field::new("szCtx", 0, 0x0c, FieldType::U8),
]);

const CTX_INFO: VersionedStructure = VersionedStructure::new(&[
    Field::new("nValues", 0, 0x00, FieldType::U64),
    Field::new("pValues", 0, 0x08, FieldType::U64),
    Field::new("nMetrics", 0, 0x10, FieldType::U16),
    Field::new("pMetricIndices", 0, 0x18, FieldType::U64),
]);

/// The values of one context, by metric id and profile index.
pub type PerContextValues = BTreeMap<u16, BTreeMap<u32, f64>>;

/// A decoded `cct.db` file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ContextDb {
    minor_version: u8,
    contexts: Vec<PerContextValues>,
}

impl ContextDb {
    /// Returns whether the buffer starts like a `cct.db` file.
    pub fn test(data: &[u8]) -> bool {
        data.starts_with(b"HPCTOOLKITctxt")
    }

    /// Parses a `cct.db` file.
    #[tracing::instrument(level = "trace", name = "ContextDb::parse", skip_all)]
    pub fn parse(buf: &[u8]) -> Result<Self, FormatError> {
        let header = FileHeader::parse(buf, &FORMAT)?;
        let version = header.minor_version;

        let section =
            CTX_INFOS_SECTION.decode(version, buf, header.section("CtxInfos")?.offset)?;
        let count = section.u64("nCtxs")?;
        let stride = section.u64("szCtx")?;

        let contexts = tracing::trace_span!("ContextDb::values").in_scope(|| {
            let mut contexts = Vec::with_capacity(capacity_hint(buf, count, stride));
            for offset in scaled_range(section.u64("pCtxs")?, count, stride) {
                let record = CTX_INFO.decode(version, buf, offset)?;
                let values = decode_block::<u16, u32>(
                    buf,
                    BlockRef {
                        n_values: record.u64("nValues")?,
                        p_values: record.u64("pValues")?,
                        n_index: record.u64("nMetrics")?,
                        p_index: record.u64("pMetricIndices")?,
                    },
                )?;
                contexts.push(values);
            }
            Ok::<_, FormatError>(contexts)
        })?;

        tracing::debug!(contexts = contexts.len(), "decoded cct.db");
        Ok(ContextDb {
            minor_version: version,
            contexts,
        })
    }

    /// The minor version of the file.
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    /// Returns the values of the given context id.
    pub fn values(&self, ctx_id: u32) -> Option<&PerContextValues> {
        self.contexts.get(ctx_id as usize)
    }

    /// Iterates over `(context id, values)` for every context with at least one value.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &PerContextValues)> + '_ {
        self.contexts
            .iter()
            .enumerate()
            .filter(|(_, values)| !values.is_empty())
            .map(|(ctx_id, values)| (ctx_id as u32, values))
    }

    /// The number of context slots, one past the highest context id.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if the file lists no contexts.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
