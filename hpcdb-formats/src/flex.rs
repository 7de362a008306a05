//! Offsets of packed optional sub-fields.
//!
//! Context records end in a "flex" area that holds a flag-dependent subset of optional
//! sub-fields. Present sub-fields are packed first-fit in a fixed order, each naturally aligned
//! to its own size, with no padding between them beyond what alignment forces.

use crate::error::{FormatError, FormatErrorKind};

/// Assigns offsets to flex sub-fields in packing order.
///
/// One allocator is used per decoded record.
///
/// ```
/// use hpcdb_formats::flex::FlexAllocator;
///
/// let mut flex = FlexAllocator::new();
/// assert_eq!(flex.allocate(4).unwrap(), 0);
/// assert_eq!(flex.allocate(8).unwrap(), 8);
/// assert_eq!(flex.allocate(2).unwrap(), 4);
/// assert_eq!(flex.total_size(), 16);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlexAllocator {
    claimed: Vec<bool>,
}

impl FlexAllocator {
    /// Creates an allocator with nothing claimed.
    pub fn new() -> Self {
        Self::default()
    }

    fn is_free(&self, start: usize, size: usize) -> bool {
        (start..start + size).all(|byte| !self.claimed.get(byte).copied().unwrap_or(false))
    }

    /// Returns the offset of the next sub-field of the given size and claims its bytes.
    ///
    /// The offset is the lowest multiple of `size` whose bytes are all unclaimed. `size` must be
    /// 1, 2, 4 or 8.
    pub fn allocate(&mut self, size: usize) -> Result<usize, FormatError> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(FormatErrorKind::InvalidFlexFieldSize(size).into());
        }

        let mut start = 0;
        while !self.is_free(start, size) {
            start += size;
        }

        let end = start + size;
        if self.claimed.len() < end {
            self.claimed.resize(end, false);
        }
        self.claimed[start..end].fill(true);
        Ok(start)
    }

    /// Returns one past the highest claimed byte, or 0 if nothing was allocated.
    pub fn total_size(&self) -> usize {
        self.claimed
            .iter()
            .rposition(|claimed| *claimed)
            .map_or(0, |last| last + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(FlexAllocator::new().total_size(), 0);
    }

    #[test]
    fn test_small_then_large_pads() {
        let mut flex = FlexAllocator::new();
        assert_eq!(flex.allocate(4).unwrap(), 0);
        assert_eq!(flex.allocate(8).unwrap(), 8);
        assert_eq!(flex.total_size(), 16);
    }

    #[test]
    fn test_bytes_pack() {
        let mut flex = FlexAllocator::new();
        assert_eq!(flex.allocate(1).unwrap(), 0);
        assert_eq!(flex.allocate(1).unwrap(), 1);
        assert_eq!(flex.total_size(), 2);
    }

    #[test]
    fn test_backfill() {
        let mut flex = FlexAllocator::new();
        assert_eq!(flex.allocate(1).unwrap(), 0);
        assert_eq!(flex.allocate(8).unwrap(), 8);
        assert_eq!(flex.allocate(2).unwrap(), 2);
        assert_eq!(flex.allocate(4).unwrap(), 4);
        assert_eq!(flex.allocate(1).unwrap(), 1);
        assert_eq!(flex.allocate(1).unwrap(), 16);
        assert_eq!(flex.total_size(), 17);
    }

    #[test]
    fn test_eight_byte_alignment() {
        let mut flex = FlexAllocator::new();
        for size in [1, 8, 2, 8, 4, 1, 8] {
            let offset = flex.allocate(size).unwrap();
            assert_eq!(offset % size, 0);
        }
    }

    #[test]
    fn test_context_layouts() {
        // function + srcloc + point, the fullest context record
        let mut flex = FlexAllocator::new();
        assert_eq!(flex.allocate(8).unwrap(), 0);
        assert_eq!(flex.allocate(8).unwrap(), 8);
        assert_eq!(flex.allocate(4).unwrap(), 16);
        assert_eq!(flex.allocate(8).unwrap(), 24);
        assert_eq!(flex.allocate(8).unwrap(), 32);
        assert_eq!(flex.total_size(), 40);
    }

    #[test]
    fn test_invalid_size() {
        let mut flex = FlexAllocator::new();
        assert_eq!(
            flex.allocate(3).unwrap_err().kind(),
            FormatErrorKind::InvalidFlexFieldSize(3)
        );
        assert_eq!(flex.total_size(), 0);
    }
}
