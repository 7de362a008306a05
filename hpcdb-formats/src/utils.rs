use hpcdb_common::read_cstr;

use crate::error::{FormatError, FormatErrorKind};

/// Reads the NUL-terminated UTF-8 string starting at `offset`.
pub(crate) fn read_string(buf: &[u8], offset: u64) -> Result<String, FormatError> {
    let bytes = read_cstr(buf, offset).ok_or(FormatErrorKind::InvalidString(offset))?;
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_owned()),
        Err(e) => Err(FormatError::new(FormatErrorKind::InvalidString(offset), e)),
    }
}

/// Yields the offsets of `count` records laid out every `stride` bytes from `start`.
pub(crate) fn scaled_range(start: u64, count: u64, stride: u64) -> impl Iterator<Item = u64> {
    (0..count).map(move |i| start.saturating_add(i.saturating_mul(stride)))
}

/// Clamps an on-disk record count for preallocation to the number of `stride` sized records
/// the buffer can hold, so corrupt counts fail on decode instead.
pub(crate) fn capacity_hint(buf: &[u8], count: u64, stride: u64) -> usize {
    count.min(buf.len() as u64 / stride.max(1)) as usize
}

/// Fails with [`FormatErrorKind::TruncatedStructure`] unless `count` packed entries of
/// `entry_size` bytes fit into `buf` at `start`.
pub(crate) fn check_array(
    buf: &[u8],
    start: u64,
    count: u64,
    entry_size: u64,
) -> Result<(), FormatError> {
    let available = (buf.len() as u64).saturating_sub(start);
    let required = count.saturating_mul(entry_size);
    if start > buf.len() as u64 || required > available {
        return Err(FormatErrorKind::TruncatedStructure {
            offset: start,
            required,
            available,
        }
        .into());
    }
    Ok(())
}

/// Returns `true` if something introduced at `min_version` exists at `version`.
pub(crate) fn since(version: u8, min_version: u8) -> bool {
    min_version <= version
}

/// Declares a bit set whose bits are gated by the minor version that introduced them.
///
/// Decoding masks away every bit that is unknown at the file's minor version.
macro_rules! version_flags {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_meta:meta])*
                const $flag:ident = $bit:expr, since $version:literal;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        $vis struct $name($ty);

        #[allow(dead_code)]
        impl $name {
            $(
                $(#[$flag_meta])*
                pub const $flag: Self = Self(1 << $bit);
            )*

            const KNOWN: &'static [(Self, u8, &'static str)] = &[
                $((Self::$flag, $version, stringify!($flag)),)*
            ];

            /// Returns a set with no bits set.
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Decodes raw bits, keeping only those defined at the given minor version.
            pub fn from_bits_versioned(version: u8, bits: $ty) -> Self {
                let mask = Self::KNOWN
                    .iter()
                    .filter(|(_, min_version, _)| $crate::utils::since(version, *min_version))
                    .fold(0, |mask, (flag, _, _)| mask | flag.0);
                Self(bits & mask)
            }

            /// Returns the raw bits.
            pub const fn bits(self) -> $ty {
                self.0
            }

            /// Returns `true` if all bits of `other` are set.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns `true` if no bits are set.
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Iterates over the names of all set bits.
            pub fn names(self) -> impl Iterator<Item = &'static str> {
                Self::KNOWN
                    .iter()
                    .filter(move |(flag, _, _)| self.contains(*flag))
                    .map(|(_, _, name)| *name)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for (i, name) in self.names().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, ")")
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_seq(self.names())
            }
        }
    };
}

/// Declares a closed enumeration stored as a raw integer.
///
/// Values that are unknown, or unknown at the file's minor version, fail to decode with
/// [`FormatErrorKind::InvalidEnumValue`].
macro_rules! version_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $ty:ty {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident = $value:literal, since $version:literal;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
        }

        impl $name {
            pub(crate) fn decode(
                version: u8,
                value: $ty,
            ) -> Result<Self, $crate::error::FormatError> {
                match value {
                    $(
                        $value if $crate::utils::since(version, $version) => Ok(Self::$variant),
                    )*
                    _ => Err($crate::error::FormatErrorKind::InvalidEnumValue {
                        name: stringify!($name),
                        value: value.into(),
                    }
                    .into()),
                }
            }

            /// Returns the raw on-disk value.
            pub fn raw(self) -> $ty {
                match self {
                    $(Self::$variant => $value,)*
                }
            }
        }
    };
}

pub(crate) use {version_enum, version_flags};

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorCategory;

    version_flags! {
        struct TestFlags: u32 {
            const OLD = 0, since 0;
            const NEW = 3, since 1;
        }
    }

    version_enum! {
        enum TestEnum: u8 {
            Zero = 0, since 0;
            Two = 2, since 1;
        }
    }

    #[test]
    fn test_capacity_hint() {
        let buf = [0; 64];
        assert_eq!(capacity_hint(&buf, 3, 16), 3);
        assert_eq!(capacity_hint(&buf, u64::MAX, 16), 4);
        assert_eq!(capacity_hint(&buf, u64::MAX, 0), 64);
        assert_eq!(capacity_hint(&[], 10, 8), 0);
    }

    #[test]
    fn test_read_string() {
        let buf = b"\0abc\0\xff\0";
        assert_eq!(read_string(buf, 1).unwrap(), "abc");
        assert_eq!(read_string(buf, 0).unwrap(), "");

        let err = read_string(buf, 5).unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidString(5));
        assert_eq!(err.category(), ErrorCategory::MalformedContainer);

        let err = read_string(b"abc", 0).unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidString(0));
    }

    #[test]
    fn test_scaled_range() {
        let offsets: Vec<_> = scaled_range(0x100, 3, 0x10).collect();
        assert_eq!(offsets, vec![0x100, 0x110, 0x120]);
        assert_eq!(scaled_range(0x100, 2, 0).count(), 2);
        assert_eq!(scaled_range(0x100, 0, 0x10).count(), 0);
    }

    #[test]
    fn test_check_array() {
        let buf = [0; 24];
        assert!(check_array(&buf, 0, 2, 12).is_ok());
        assert!(check_array(&buf, 24, 0, 12).is_ok());
        let err = check_array(&buf, 4, 2, 12).unwrap_err();
        assert_eq!(
            err.kind(),
            FormatErrorKind::TruncatedStructure {
                offset: 4,
                required: 24,
                available: 20,
            }
        );
    }

    #[test]
    fn test_flags_masking() {
        let flags = TestFlags::from_bits_versioned(0, 0xff);
        assert_eq!(flags, TestFlags::OLD);
        assert_eq!(format!("{flags:?}"), "TestFlags(OLD)");

        let flags = TestFlags::from_bits_versioned(1, 0xff);
        assert!(flags.contains(TestFlags::OLD | TestFlags::NEW));
        assert_eq!(flags.bits(), 0b1001);
        assert_eq!(format!("{flags:?}"), "TestFlags(OLD | NEW)");
        assert!(TestFlags::empty().is_empty());
    }

    #[test]
    fn test_enum_decode() {
        assert_eq!(TestEnum::decode(0, 0).unwrap(), TestEnum::Zero);
        assert_eq!(TestEnum::decode(1, 2).unwrap(), TestEnum::Two);
        assert_eq!(TestEnum::Two.raw(), 2);

        let err = TestEnum::decode(0, 2).unwrap_err();
        assert_eq!(
            err.kind(),
            FormatErrorKind::InvalidEnumValue {
                name: "TestEnum",
                value: 2,
            }
        );
        assert_eq!(err.category(), ErrorCategory::InvariantViolation);
        assert!(TestEnum::decode(1, 1).is_err());
    }
}
