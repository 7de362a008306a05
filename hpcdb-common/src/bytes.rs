//! Little-endian reads at absolute offsets.
//!
//! All functions return `None` if the requested range does not fit into the buffer. Offsets are
//! `u64` because that is how the formats store them; offsets that do not fit into `usize` are
//! treated as out of bounds.

/// Returns the `len` bytes starting at `offset`, if they are all inside `buf`.
#[inline]
pub fn read_bytes(buf: &[u8], offset: u64, len: usize) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(len)?;
    buf.get(start..end)
}

#[inline]
fn read_array<const N: usize>(buf: &[u8], offset: u64) -> Option<[u8; N]> {
    read_bytes(buf, offset, N)?.try_into().ok()
}

/// Reads a `u8` at `offset`.
#[inline]
pub fn read_u8(buf: &[u8], offset: u64) -> Option<u8> {
    read_array::<1>(buf, offset).map(u8::from_le_bytes)
}

/// Reads a little-endian `u16` at `offset`.
#[inline]
pub fn read_u16(buf: &[u8], offset: u64) -> Option<u16> {
    read_array(buf, offset).map(u16::from_le_bytes)
}

/// Reads a little-endian `u32` at `offset`.
#[inline]
pub fn read_u32(buf: &[u8], offset: u64) -> Option<u32> {
    read_array(buf, offset).map(u32::from_le_bytes)
}

/// Reads a little-endian `u64` at `offset`.
#[inline]
pub fn read_u64(buf: &[u8], offset: u64) -> Option<u64> {
    read_array(buf, offset).map(u64::from_le_bytes)
}

/// Reads a little-endian `i8` at `offset`.
#[inline]
pub fn read_i8(buf: &[u8], offset: u64) -> Option<i8> {
    read_array(buf, offset).map(i8::from_le_bytes)
}

/// Reads a little-endian `i16` at `offset`.
#[inline]
pub fn read_i16(buf: &[u8], offset: u64) -> Option<i16> {
    read_array(buf, offset).map(i16::from_le_bytes)
}

/// Reads a little-endian `i32` at `offset`.
#[inline]
pub fn read_i32(buf: &[u8], offset: u64) -> Option<i32> {
    read_array(buf, offset).map(i32::from_le_bytes)
}

/// Reads a little-endian `i64` at `offset`.
#[inline]
pub fn read_i64(buf: &[u8], offset: u64) -> Option<i64> {
    read_array(buf, offset).map(i64::from_le_bytes)
}

/// Reads a little-endian IEEE-754 double at `offset`.
#[inline]
pub fn read_f64(buf: &[u8], offset: u64) -> Option<f64> {
    read_array(buf, offset).map(f64::from_le_bytes)
}

/// Returns the bytes of the NUL-terminated string starting at `offset`, without the terminator.
///
/// Returns `None` if `offset` is out of bounds or no terminator follows it.
///
/// ```
/// use hpcdb_common::read_cstr;
///
/// let buf = b"xx/usr/lib/libc.so\0";
/// assert_eq!(read_cstr(buf, 2), Some(&b"/usr/lib/libc.so"[..]));
/// assert_eq!(read_cstr(b"no terminator", 0), None);
/// ```
pub fn read_cstr(buf: &[u8], offset: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let tail = buf.get(start..)?;
    let len = tail.iter().position(|b| *b == 0)?;
    Some(&tail[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_little_endian() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_u8(&buf, 7), Some(0x08));
        assert_eq!(read_u16(&buf, 0), Some(0x0201));
        assert_eq!(read_u32(&buf, 4), Some(0x0807_0605));
        assert_eq!(read_u64(&buf, 0), Some(0x0807_0605_0403_0201));
        assert_eq!(read_i8(&[0xff], 0), Some(-1));
        assert_eq!(read_i16(&[0xfe, 0xff], 0), Some(-2));
    }

    #[test]
    fn test_out_of_bounds() {
        let buf = [0u8; 4];
        assert_eq!(read_u32(&buf, 1), None);
        assert_eq!(read_u64(&buf, 0), None);
        assert_eq!(read_u8(&buf, u64::MAX), None);
        assert_eq!(read_bytes(&buf, 2, usize::MAX), None);
    }

    #[test]
    fn test_f64() {
        let buf = 1.5f64.to_le_bytes();
        assert_eq!(read_f64(&buf, 0), Some(1.5));
    }

    #[test]
    fn test_cstr() {
        let buf = b"main\0foo.c\0";
        assert_eq!(read_cstr(buf, 0), Some(&b"main"[..]));
        assert_eq!(read_cstr(buf, 5), Some(&b"foo.c"[..]));
        assert_eq!(read_cstr(buf, 4), Some(&b""[..]));
        assert_eq!(read_cstr(buf, 11), None);
    }
}
