//! Support for `trace.db`, the per-profile context timelines.
//!
//! Every traced profile has one line of `(timestamp, context id)` samples saying which context
//! was executing from that point in time on. Timestamps are nanoseconds since the epoch.

use hpcdb_common::{read_u32, read_u64};

use crate::error::{FormatError, FormatErrorKind};
use crate::header::{FileFormat, FileHeader, SectionDef};
use crate::structure::{Field, FieldType, VersionedStructure};
use crate::utils::{capacity_hint, check_array, scaled_range};

/// The newest `trace.db` minor version this crate knows about.
pub const MAX_MINOR_VERSION: u8 = 0;

/// The `trace.db` container format.
pub const FORMAT: FileFormat = FileFormat {
    code: *b"trce",
    footer: *b"trace.db",
    max_minor_version: MAX_MINOR_VERSION,
    sections: &[SectionDef::new("CtxTraces", 0)],
};

const CTX_TRACES_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pTraces", 0, 0x00, FieldType::U64),
    Field::new("nTraces", 0, 0x08, FieldType::U32),
    Field::new("szTrace", 0, 0x0c, FieldType::U8),
    Field::new("minTimestamp", 0, 0x10, FieldType::U64),
    Field::new("maxTimestamp", 0, 0x18, FieldType::U64),
]);

const TRACE_HEADER: VersionedStructure = VersionedStructure::new(&[
    Field::new("profIndex", 0, 0x00, FieldType::U32),
    Field::new("pStart", 0, 0x08, FieldType::U64),
    Field::new("pEnd", 0, 0x10, FieldType::U64),
]);

const ELEMENT_SIZE: u64 = 12;

/// A single trace sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TraceElement {
    /// The time of the sample in nanoseconds since the epoch.
    pub timestamp: u64,
    /// The context executing from `timestamp` on.
    pub ctx_id: u32,
}

/// The inclusive range of timestamps over all traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TimestampRange {
    /// The earliest timestamp.
    pub min: u64,
    /// The latest timestamp.
    pub max: u64,
}

/// The timeline of a single profile.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ContextTrace {
    /// The index of the profile in `profile.db`.
    pub prof_index: u32,
    line: Vec<TraceElement>,
}

impl ContextTrace {
    /// The samples in timestamp order.
    pub fn line(&self) -> &[TraceElement] {
        &self.line
    }
}

/// A decoded `trace.db` file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TraceDb {
    minor_version: u8,
    timestamp_range: TimestampRange,
    traces: Vec<ContextTrace>,
}

impl TraceDb {
    /// Returns whether the buffer starts like a `trace.db` file.
    pub fn test(data: &[u8]) -> bool {
        data.starts_with(b"HPCTOOLKITtrce")
    }

    /// Parses a `trace.db` file.
    #[tracing::instrument(level = "trace", name = "TraceDb::parse", skip_all)]
    pub fn parse(buf: &[u8]) -> Result<Self, FormatError> {
        let header = FileHeader::parse(buf, &FORMAT)?;
        let version = header.minor_version;

        let section =
            CTX_TRACES_SECTION.decode(version, buf, header.section("CtxTraces")?.offset)?;
        let count = section.u64("nTraces")?;
        let stride = section.u64("szTrace")?;
        let timestamp_range = TimestampRange {
            min: section.u64("minTimestamp")?,
            max: section.u64("maxTimestamp")?,
        };

        let mut traces = Vec::with_capacity(capacity_hint(buf, count, stride));
        for offset in scaled_range(section.u64("pTraces")?, count, stride) {
            let trace = tracing::trace_span!("ContextTrace::parse", offset)
                .in_scope(|| parse_trace(version, buf, offset))?;
            traces.push(trace);
        }

        tracing::debug!(traces = traces.len(), "decoded trace.db");
        Ok(TraceDb {
            minor_version: version,
            timestamp_range,
            traces,
        })
    }

    /// The minor version of the file.
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    /// The range of timestamps over all traces.
    pub fn timestamp_range(&self) -> TimestampRange {
        self.timestamp_range
    }

    /// All traces, in file order.
    pub fn traces(&self) -> &[ContextTrace] {
        &self.traces
    }
}

fn parse_trace(version: u8, buf: &[u8], offset: u64) -> Result<ContextTrace, FormatError> {
    let record = TRACE_HEADER.decode(version, buf, offset)?;
    let start = record.u64("pStart")?;
    let end = record.u64("pEnd")?;

    if end < start {
        return Err(FormatErrorKind::InvariantViolation("trace ends before it starts").into());
    }
    let size = end - start;
    if size % ELEMENT_SIZE != 0 {
        return Err(FormatErrorKind::InvariantViolation(
            "trace size is not a multiple of the element size",
        )
        .into());
    }

    let count = size / ELEMENT_SIZE;
    check_array(buf, start, count, ELEMENT_SIZE)?;

    let mut line: Vec<TraceElement> = Vec::with_capacity(count as usize);
    for offset in scaled_range(start, count, ELEMENT_SIZE) {
        // The array check above covers every element.
        let (Some(timestamp), Some(ctx_id)) = (read_u64(buf, offset), read_u32(buf, offset + 8))
        else {
            return Err(FormatErrorKind::TruncatedStructure {
                offset,
                required: ELEMENT_SIZE,
                available: (buf.len() as u64).saturating_sub(offset),
            }
            .into());
        };
        if line.last().is_some_and(|prev| timestamp < prev.timestamp) {
            return Err(FormatErrorKind::InvariantViolation("trace timestamps decrease").into());
        }
        line.push(TraceElement { timestamp, ctx_id });
    }

    Ok(ContextTrace {
        prof_index: record.u32("profIndex")?,
        line,
    })
}
