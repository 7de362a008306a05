//! Sparse value blocks shared by `profile.db` and `cct.db`.
//!
//! A block is two packed arrays. The index array holds `(outer key, start)` pairs, the value
//! array holds `(inner key, f64)` pairs. The values of an outer key run from its start to the
//! start of the next index entry, or to the end of the value array for the last entry.
//!
//! | file         | outer key       | inner key          |
//! |--------------|-----------------|--------------------|
//! | `profile.db` | `ctxId: u32`    | `metricId: u16`    |
//! | `cct.db`     | `metricId: u16` | `profIndex: u32`   |

use std::collections::BTreeMap;

use hpcdb_common::{read_f64, read_u16, read_u32, read_u64};

use crate::error::{FormatError, FormatErrorKind};
use crate::utils::check_array;

/// A key stored in front of a 64-bit value in a packed array.
pub(crate) trait PackedKey: Copy + Ord {
    const SIZE: u64;

    fn read(buf: &[u8], offset: u64) -> Option<Self>;
}

impl PackedKey for u16 {
    const SIZE: u64 = 2;

    fn read(buf: &[u8], offset: u64) -> Option<Self> {
        read_u16(buf, offset)
    }
}

impl PackedKey for u32 {
    const SIZE: u64 = 4;

    fn read(buf: &[u8], offset: u64) -> Option<Self> {
        read_u32(buf, offset)
    }
}

/// The location of a sparse value block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockRef {
    pub n_values: u64,
    pub p_values: u64,
    pub n_index: u64,
    pub p_index: u64,
}

fn truncated(buf: &[u8], offset: u64, required: u64) -> FormatError {
    FormatErrorKind::TruncatedStructure {
        offset,
        required,
        available: (buf.len() as u64).saturating_sub(offset),
    }
    .into()
}

/// Decodes a sparse value block into nested ordered maps.
///
/// Fails with [`FormatErrorKind::InvariantViolation`] if start indices decrease, exceed the
/// number of values, or a key repeats.
pub(crate) fn decode_block<O: PackedKey, I: PackedKey>(
    buf: &[u8],
    block: BlockRef,
) -> Result<BTreeMap<O, BTreeMap<I, f64>>, FormatError> {
    let index_stride = O::SIZE + 8;
    let value_stride = I::SIZE + 8;
    check_array(buf, block.p_index, block.n_index, index_stride)?;
    check_array(buf, block.p_values, block.n_values, value_stride)?;

    let mut index = Vec::new();
    for i in 0..block.n_index {
        let offset = block.p_index + i * index_stride;
        let key = O::read(buf, offset).ok_or_else(|| truncated(buf, offset, index_stride))?;
        let start = read_u64(buf, offset + O::SIZE)
            .ok_or_else(|| truncated(buf, offset, index_stride))?;
        index.push((key, start));
    }

    let mut result = BTreeMap::new();
    for (i, &(key, start)) in index.iter().enumerate() {
        let end = index.get(i + 1).map_or(block.n_values, |(_, next)| *next);
        if start > end || end > block.n_values {
            return Err(FormatErrorKind::InvariantViolation(
                "value block start indices are not ordered",
            )
            .into());
        }

        let mut values = BTreeMap::new();
        for v in start..end {
            let offset = block.p_values + v * value_stride;
            let inner = I::read(buf, offset).ok_or_else(|| truncated(buf, offset, value_stride))?;
            let value = read_f64(buf, offset + I::SIZE)
                .ok_or_else(|| truncated(buf, offset, value_stride))?;
            if values.insert(inner, value).is_some() {
                return Err(
                    FormatErrorKind::InvariantViolation("duplicate key in value block").into(),
                );
            }
        }

        if result.insert(key, values).is_some() {
            return Err(FormatErrorKind::InvariantViolation("duplicate key in value index").into());
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::error::ErrorCategory;

    fn block(index: &[(u32, u64)], values: &[(u16, f64)]) -> (Vec<u8>, BlockRef) {
        let mut buf = Vec::new();
        for (metric, value) in values {
            buf.extend_from_slice(&metric.to_le_bytes());
            buf.extend_from_slice(&value.to_le_bytes());
        }
        let p_index = buf.len() as u64;
        for (ctx, start) in index {
            buf.extend_from_slice(&ctx.to_le_bytes());
            buf.extend_from_slice(&start.to_le_bytes());
        }
        let block = BlockRef {
            n_values: values.len() as u64,
            p_values: 0,
            n_index: index.len() as u64,
            p_index,
        };
        (buf, block)
    }

    #[test]
    fn test_ranges() {
        let (buf, block) = block(&[(1, 0), (7, 2), (9, 2)], &[(0, 1.0), (3, 2.5), (0, 4.0)]);
        let decoded = decode_block::<u32, u16>(&buf, block).unwrap();

        let expected = BTreeMap::from([
            (1, BTreeMap::from([(0, 1.0), (3, 2.5)])),
            (7, BTreeMap::new()),
            (9, BTreeMap::from([(0, 4.0)])),
        ]);
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_empty() {
        let (buf, block) = block(&[], &[]);
        assert!(decode_block::<u32, u16>(&buf, block).unwrap().is_empty());
    }

    #[test]
    fn test_decreasing_start() {
        let (buf, block) = block(&[(1, 1), (2, 0)], &[(0, 1.0)]);
        let err = decode_block::<u32, u16>(&buf, block).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvariantViolation);
    }

    #[test]
    fn test_start_past_end() {
        let (buf, block) = block(&[(1, 3)], &[(0, 1.0)]);
        let err = decode_block::<u32, u16>(&buf, block).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InvariantViolation);
    }

    #[test]
    fn test_truncated_values() {
        let (buf, mut block) = block(&[(1, 0)], &[(0, 1.0)]);
        block.n_values = 100;
        let err = decode_block::<u32, u16>(&buf, block).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TruncatedStructure);
    }
}
