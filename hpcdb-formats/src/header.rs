//! The container header, section table and footer shared by all database files.
//!
//! Every file starts with a 16 byte header:
//!
//! | offset | size | content                                   |
//! |--------|------|-------------------------------------------|
//! | `0x00` | 10   | the magic `HPCTOOLKIT`                    |
//! | `0x0a` | 4    | format code: `meta`, `prof`, `ctxt`, `trce` |
//! | `0x0e` | 1    | major version                             |
//! | `0x0f` | 1    | minor version                             |
//!
//! The section table follows at `0x10` with one `(size: u64, pointer: u64)` pair per section.
//! Sections introduced by later minor versions are appended, so the table shape is a function of
//! the minor version. The last 8 bytes of the file hold a format-specific footer tag.

use hpcdb_common::{read_bytes, read_u64};

use crate::error::{FormatError, FormatErrorKind};

/// The magic bytes at the start of every HPCToolkit data file.
pub const MAGIC: [u8; 10] = *b"HPCTOOLKIT";

/// The major format version supported by this crate.
pub const MAJOR_VERSION: u8 = 4;

/// The size of the fixed header preceding the section table.
pub const HEADER_SIZE: u64 = 0x10;

/// The size of the footer tag at the end of every file.
pub const FOOTER_SIZE: u64 = 8;

const SECTION_ENTRY_SIZE: u64 = 0x10;

/// A section declared in a format's section table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDef {
    /// The name of the section, for diagnostics.
    pub name: &'static str,
    /// The minor version that introduced the section.
    pub min_version: u8,
}

impl SectionDef {
    /// Declares a section.
    pub const fn new(name: &'static str, min_version: u8) -> Self {
        SectionDef { name, min_version }
    }
}

/// Static description of one of the database file formats.
#[derive(Debug, Clone, Copy)]
pub struct FileFormat {
    /// The 4 byte format code following the magic.
    pub code: [u8; 4],
    /// The 8 byte footer tag.
    pub footer: [u8; 8],
    /// The newest minor version this crate knows about.
    pub max_minor_version: u8,
    /// The section table, in on-disk order.
    pub sections: &'static [SectionDef],
}

/// The location of a section within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Section {
    /// The absolute offset of the section header.
    pub offset: u64,
    /// The total size of the section in bytes.
    pub size: u64,
}

/// The validated header of a database file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// The major version, always [`MAJOR_VERSION`].
    pub major_version: u8,
    /// The minor version, which parameterizes every record decode in the file.
    pub minor_version: u8,
    sections: Vec<(&'static str, Section)>,
}

impl FileHeader {
    /// Validates the header and footer of `buf` and reads its section table.
    pub fn parse(buf: &[u8], format: &FileFormat) -> Result<Self, FormatError> {
        let len = buf.len() as u64;
        let header = read_bytes(buf, 0, HEADER_SIZE as usize).ok_or(
            FormatErrorKind::TruncatedStructure {
                offset: 0,
                required: HEADER_SIZE,
                available: len,
            },
        )?;

        if header[..10] != MAGIC {
            return Err(FormatErrorKind::InvalidMagic.into());
        }

        let mut found = [0; 4];
        found.copy_from_slice(&header[10..14]);
        if found != format.code {
            return Err(FormatErrorKind::FormatMismatch {
                expected: format.code,
                found,
            }
            .into());
        }

        // The header is at least as large as the footer, so this cannot underflow.
        let mut footer = [0; 8];
        footer.copy_from_slice(&buf[(len - FOOTER_SIZE) as usize..]);
        if footer != format.footer {
            return Err(FormatErrorKind::InvalidFooter {
                expected: format.footer,
                found: footer,
            }
            .into());
        }

        let major_version = header[14];
        let minor_version = header[15];
        if major_version != MAJOR_VERSION {
            return Err(FormatErrorKind::UnsupportedMajorVersion {
                supported: MAJOR_VERSION,
                found: major_version,
            }
            .into());
        }

        if minor_version > format.max_minor_version {
            tracing::warn!(
                format = %String::from_utf8_lossy(&format.code),
                major_version,
                minor_version,
                max_minor_version = format.max_minor_version,
                "file is newer than this reader, some data may be skipped"
            );
        }

        let mut sections = Vec::with_capacity(format.sections.len());
        for (index, def) in format.sections.iter().enumerate() {
            if def.min_version > minor_version {
                continue;
            }

            let entry = HEADER_SIZE + index as u64 * SECTION_ENTRY_SIZE;
            let truncated = FormatErrorKind::TruncatedStructure {
                offset: HEADER_SIZE,
                required: entry + SECTION_ENTRY_SIZE - HEADER_SIZE,
                available: len.saturating_sub(HEADER_SIZE),
            };
            let size = read_u64(buf, entry).ok_or(truncated)?;
            let offset = read_u64(buf, entry + 8).ok_or(truncated)?;

            let end = offset.checked_add(size);
            if offset != 0 && end.map_or(true, |end| end > len) {
                return Err(FormatErrorKind::SectionOutOfBounds { offset, size: len }.into());
            }

            sections.push((def.name, Section { offset, size }));
        }

        Ok(FileHeader {
            major_version,
            minor_version,
            sections,
        })
    }

    /// Returns the named section.
    ///
    /// Fails with [`FormatErrorKind::MissingField`] if the section does not exist at the file's
    /// minor version.
    pub fn section(&self, name: &'static str) -> Result<Section, FormatError> {
        self.sections
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, section)| *section)
            .ok_or_else(|| FormatErrorKind::MissingField(name).into())
    }

    /// Iterates over all sections defined at the file's minor version, in table order.
    pub fn sections(&self) -> impl Iterator<Item = (&'static str, Section)> + '_ {
        self.sections.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    use crate::error::ErrorCategory;

    const TEST_FORMAT: FileFormat = FileFormat {
        code: *b"test",
        footer: *b"_test.db",
        max_minor_version: 0,
        sections: &[SectionDef::new("First", 0), SectionDef::new("Second", 1)],
    };

    fn image(code: &[u8; 4], major: u8, minor: u8, footer: &[u8; 8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(code);
        buf.push(major);
        buf.push(minor);
        // First: 8 bytes at 0x30, Second: 0 bytes at 0x38
        for (size, ptr) in [(8u64, 0x30u64), (0, 0x38)] {
            buf.extend_from_slice(&size.to_le_bytes());
            buf.extend_from_slice(&ptr.to_le_bytes());
        }
        buf.extend_from_slice(&[0xcc; 8]);
        buf.extend_from_slice(footer);
        buf
    }

    #[test]
    fn test_parse_v0() {
        let buf = image(b"test", 4, 0, b"_test.db");
        let header = FileHeader::parse(&buf, &TEST_FORMAT).unwrap();
        assert_eq!(header.minor_version, 0);
        assert_eq!(
            header.section("First").unwrap(),
            Section {
                offset: 0x30,
                size: 8
            }
        );
        assert_eq!(
            header.section("Second").unwrap_err().kind(),
            FormatErrorKind::MissingField("Second")
        );
    }

    #[test]
    fn test_parse_newer_minor() {
        let buf = image(b"test", 4, 1, b"_test.db");
        let header = FileHeader::parse(&buf, &TEST_FORMAT).unwrap();
        assert_eq!(header.minor_version, 1);
        let names: Vec<_> = header.sections().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = image(b"test", 4, 0, b"_test.db");
        buf[0] = b'X';
        let err = FileHeader::parse(&buf, &TEST_FORMAT).unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidMagic);
        assert_eq!(err.category(), ErrorCategory::MalformedContainer);
    }

    #[test]
    fn test_wrong_format() {
        let buf = image(b"meta", 4, 0, b"_test.db");
        let err = FileHeader::parse(&buf, &TEST_FORMAT).unwrap_err();
        assert_eq!(
            err.kind(),
            FormatErrorKind::FormatMismatch {
                expected: *b"test",
                found: *b"meta",
            }
        );
    }

    #[test]
    fn test_wrong_footer() {
        let buf = image(b"test", 4, 0, b"_meta.db");
        let err = FileHeader::parse(&buf, &TEST_FORMAT).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedContainer);
        assert!(matches!(err.kind(), FormatErrorKind::InvalidFooter { .. }));
    }

    #[test]
    fn test_wrong_major() {
        let buf = image(b"test", 3, 0, b"_test.db");
        let err = FileHeader::parse(&buf, &TEST_FORMAT).unwrap_err();
        assert_eq!(
            err.kind(),
            FormatErrorKind::UnsupportedMajorVersion {
                supported: 4,
                found: 3,
            }
        );
    }

    #[test]
    fn test_truncated_header() {
        let err = FileHeader::parse(b"HPCTOOLKIT", &TEST_FORMAT).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TruncatedStructure);
    }

    #[test]
    fn test_section_out_of_bounds() {
        let mut buf = image(b"test", 4, 0, b"_test.db");
        buf[0x18..0x20].copy_from_slice(&0x1000u64.to_le_bytes());
        let err = FileHeader::parse(&buf, &TEST_FORMAT).unwrap_err();
        assert_eq!(
            err.kind(),
            FormatErrorKind::SectionOutOfBounds {
                offset: 0x1000,
                size: buf.len() as u64,
            }
        );
    }
}
