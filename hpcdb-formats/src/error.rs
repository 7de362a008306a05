use std::fmt;

use thiserror::Error;

/// A kind of cross-referenced entity in a `meta.db` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A load module.
    Module,
    /// A source file.
    File,
    /// A function.
    Function,
    /// A propagation scope.
    Scope,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EntityKind::Module => write!(f, "load module"),
            EntityKind::File => write!(f, "source file"),
            EntityKind::Function => write!(f, "function"),
            EntityKind::Scope => write!(f, "propagation scope"),
        }
    }
}

/// The kind of a [`FormatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FormatErrorKind {
    /// The file does not start with the `HPCTOOLKIT` magic.
    #[error("file is not an HPCToolkit data file")]
    InvalidMagic,
    /// The file is an HPCToolkit file, but of a different format.
    #[error("file is of a different format: expected {expected:?}, found {found:?}")]
    FormatMismatch {
        /// The format code the reader expected.
        expected: [u8; 4],
        /// The format code found in the header.
        found: [u8; 4],
    },
    /// The footer tag at the end of the file does not match the format.
    #[error("invalid footer: expected {expected:?}, found {found:?}")]
    InvalidFooter {
        /// The footer the reader expected.
        expected: [u8; 8],
        /// The footer found in the file.
        found: [u8; 8],
    },
    /// The major version of the file is not supported.
    #[error("only able to read v{supported}.X, got v{found}")]
    UnsupportedMajorVersion {
        /// The major version supported by this reader.
        supported: u8,
        /// The major version found in the header.
        found: u8,
    },
    /// A section pointer or record offset lies outside of the file.
    #[error("section at offset {offset:#x} lies outside of the file ({size} bytes)")]
    SectionOutOfBounds {
        /// The offending offset.
        offset: u64,
        /// The size of the file.
        size: u64,
    },
    /// A string is unterminated, out of bounds, or not valid UTF-8.
    #[error("invalid string at offset {0:#x}")]
    InvalidString(u64),
    /// The file could not be read from disk.
    #[error("failed to read database file")]
    Io,
    /// A fixed-layout record does not fit into the available bytes.
    #[error("truncated structure at offset {offset:#x}: {required} bytes required, {available} available")]
    TruncatedStructure {
        /// The offset of the record.
        offset: u64,
        /// The size of the record at the file's minor version.
        required: u64,
        /// The number of bytes actually available at `offset`.
        available: u64,
    },
    /// A stored offset does not name any decoded entity.
    #[error("dangling reference to {kind} at offset {offset:#x}")]
    DanglingReference {
        /// The table the offset was looked up in.
        kind: EntityKind,
        /// The stored offset.
        offset: u64,
    },
    /// A context id does not exist in the `meta.db` context tree.
    #[error("reference to unknown context #{0}")]
    UnknownContextId(u32),
    /// A metric id does not exist in the `meta.db` metric descriptions.
    #[error("reference to unknown metric #{0}")]
    UnknownMetricId(u16),
    /// A profile index does not exist in `profile.db`.
    #[error("reference to unknown profile index {0}")]
    UnknownProfileIndex(u32),
    /// A structural invariant of the format does not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(&'static str),
    /// An enumeration field holds a value with no known meaning.
    #[error("invalid value {value} for {name}")]
    InvalidEnumValue {
        /// The enumeration that was decoded.
        name: &'static str,
        /// The raw value.
        value: u64,
    },
    /// A flex-field was requested with a size other than 1, 2, 4 or 8.
    #[error("unsupported flex-field size {0}")]
    InvalidFlexFieldSize(usize),
    /// A required field is not defined at the file's minor version.
    #[error("field {0} is not defined at this minor version")]
    MissingField(&'static str),
}

/// The broad class of a [`FormatError`].
///
/// Every error aborts the read of the whole file, the category only tells callers why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Wrong magic, format code or footer, unsupported major version, unreadable data.
    MalformedContainer,
    /// A record extends past the available bytes.
    TruncatedStructure,
    /// An offset or id does not resolve.
    DanglingReference,
    /// The data is readable but internally inconsistent.
    InvariantViolation,
}

impl FormatErrorKind {
    /// Returns the [`ErrorCategory`] of this kind.
    pub fn category(self) -> ErrorCategory {
        match self {
            FormatErrorKind::InvalidMagic
            | FormatErrorKind::FormatMismatch { .. }
            | FormatErrorKind::InvalidFooter { .. }
            | FormatErrorKind::UnsupportedMajorVersion { .. }
            | FormatErrorKind::SectionOutOfBounds { .. }
            | FormatErrorKind::InvalidString(_)
            | FormatErrorKind::Io => ErrorCategory::MalformedContainer,
            FormatErrorKind::TruncatedStructure { .. } => ErrorCategory::TruncatedStructure,
            FormatErrorKind::DanglingReference { .. }
            | FormatErrorKind::UnknownContextId(_)
            | FormatErrorKind::UnknownMetricId(_)
            | FormatErrorKind::UnknownProfileIndex(_) => ErrorCategory::DanglingReference,
            FormatErrorKind::InvariantViolation(_)
            | FormatErrorKind::InvalidEnumValue { .. }
            | FormatErrorKind::InvalidFlexFieldSize(_)
            | FormatErrorKind::MissingField(_) => ErrorCategory::InvariantViolation,
        }
    }
}

/// An error encountered while decoding an HPCToolkit database file.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct FormatError {
    pub(crate) kind: FormatErrorKind,
    #[source]
    pub(crate) source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FormatError {
    /// Creates a new FormatError from a known kind of error as well as an
    /// arbitrary error payload.
    pub(crate) fn new<E>(kind: FormatErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`FormatErrorKind`] for this error.
    pub fn kind(&self) -> FormatErrorKind {
        self.kind
    }

    /// Returns the [`ErrorCategory`] for this error.
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

impl From<FormatErrorKind> for FormatError {
    fn from(kind: FormatErrorKind) -> Self {
        Self { kind, source: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = FormatError::from(FormatErrorKind::DanglingReference {
            kind: EntityKind::Module,
            offset: 0x40,
        });
        assert_eq!(err.category(), ErrorCategory::DanglingReference);
        assert_eq!(
            err.to_string(),
            "dangling reference to load module at offset 0x40"
        );

        let err = FormatError::new(
            FormatErrorKind::Io,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.category(), ErrorCategory::MalformedContainer);
        assert!(std::error::Error::source(&err).is_some());
    }
}
