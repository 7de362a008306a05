//! Load modules, source files and functions.
//!
//! These three sections are decoded first. Every later section refers to their records by the
//! absolute offset a record was read from.

use crate::error::{EntityKind, FormatError};
use crate::structure::{Field, FieldType, VersionedStructure};
use crate::table::EntityTable;
use crate::utils::{capacity_hint, read_string, scaled_range, version_flags};

use super::{FileIndex, ModuleIndex};

version_flags! {
    /// Flags of a [`Module`]. No bits are defined yet.
    pub struct ModuleFlags: u32 {}
}

version_flags! {
    /// Flags of a [`SourceFile`].
    pub struct FileFlags: u32 {
        /// The file was copied into the database directory.
        const COPIED = 0, since 0;
    }
}

version_flags! {
    /// Flags of a [`Function`]. No bits are defined yet.
    pub struct FunctionFlags: u32 {}
}

const MODULES_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pModules", 0, 0x00, FieldType::U64),
    Field::new("nModules", 0, 0x08, FieldType::U32),
    Field::new("szModule", 0, 0x0c, FieldType::U16),
]);

const FILES_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pFiles", 0, 0x00, FieldType::U64),
    Field::new("nFiles", 0, 0x08, FieldType::U32),
    Field::new("szFile", 0, 0x0c, FieldType::U16),
]);

const FUNCTIONS_SECTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pFunctions", 0, 0x00, FieldType::U64),
    Field::new("nFunctions", 0, 0x08, FieldType::U32),
    Field::new("szFunction", 0, 0x0c, FieldType::U16),
]);

/// Shared by modules and source files.
const PATH_RECORD: VersionedStructure = VersionedStructure::new(&[
    Field::new("flags", 0, 0x00, FieldType::U32),
    Field::new("pPath", 0, 0x08, FieldType::U64),
]);

const FUNCTION: VersionedStructure = VersionedStructure::new(&[
    Field::new("pName", 0, 0x00, FieldType::U64),
    Field::new("pModule", 0, 0x08, FieldType::U64),
    Field::new("offset", 0, 0x10, FieldType::U64),
    Field::new("pFile", 0, 0x18, FieldType::U64),
    Field::new("line", 0, 0x20, FieldType::U32),
    Field::new("flags", 0, 0x24, FieldType::U32),
]);

/// A binary that was loaded into the measured application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Module {
    /// The path of the binary as it was loaded.
    pub path: String,
    /// Flags, see [`ModuleFlags`].
    pub flags: ModuleFlags,
}

/// A source file referenced by functions or contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SourceFile {
    /// The path of the file.
    pub path: String,
    /// Flags, see [`FileFlags`].
    pub flags: FileFlags,
}

/// An address within a load module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BinaryPoint {
    /// The containing load module.
    pub module: ModuleIndex,
    /// The offset of the address from the start of the module.
    pub offset: u64,
}

/// A line within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SourceLine {
    /// The source file.
    pub file: FileIndex,
    /// The 1-based line number.
    pub line: u32,
}

/// A function, known by its binary location, its source location, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Function {
    /// The (possibly mangled) name of the function.
    pub name: String,
    /// The entry address of the function, if known.
    pub point: Option<BinaryPoint>,
    /// The definition site of the function, if known.
    pub source: Option<SourceLine>,
    /// Flags, see [`FunctionFlags`].
    pub flags: FunctionFlags,
}

pub(crate) fn parse_modules(
    version: u8,
    buf: &[u8],
    offset: u64,
) -> Result<EntityTable<Module>, FormatError> {
    let section = MODULES_SECTION.decode(version, buf, offset)?;
    let count = section.u64("nModules")?;
    let stride = section.u64("szModule")?;

    let mut modules =
        EntityTable::with_capacity(EntityKind::Module, capacity_hint(buf, count, stride));
    for offset in scaled_range(section.u64("pModules")?, count, stride) {
        let record = PATH_RECORD.decode(version, buf, offset)?;
        let module = Module {
            path: read_string(buf, record.u64("pPath")?)?,
            flags: ModuleFlags::from_bits_versioned(version, record.u32("flags")?),
        };
        modules.push(offset, module);
    }

    Ok(modules)
}

pub(crate) fn parse_files(
    version: u8,
    buf: &[u8],
    offset: u64,
) -> Result<EntityTable<SourceFile>, FormatError> {
    let section = FILES_SECTION.decode(version, buf, offset)?;
    let count = section.u64("nFiles")?;
    let stride = section.u64("szFile")?;

    let mut files =
        EntityTable::with_capacity(EntityKind::File, capacity_hint(buf, count, stride));
    for offset in scaled_range(section.u64("pFiles")?, count, stride) {
        let record = PATH_RECORD.decode(version, buf, offset)?;
        let file = SourceFile {
            path: read_string(buf, record.u64("pPath")?)?,
            flags: FileFlags::from_bits_versioned(version, record.u32("flags")?),
        };
        files.push(offset, file);
    }

    Ok(files)
}

pub(crate) fn parse_functions(
    version: u8,
    buf: &[u8],
    offset: u64,
    modules: &EntityTable<Module>,
    files: &EntityTable<SourceFile>,
) -> Result<EntityTable<Function>, FormatError> {
    let section = FUNCTIONS_SECTION.decode(version, buf, offset)?;
    let count = section.u64("nFunctions")?;
    let stride = section.u64("szFunction")?;

    let mut functions =
        EntityTable::with_capacity(EntityKind::Function, capacity_hint(buf, count, stride));
    for offset in scaled_range(section.u64("pFunctions")?, count, stride) {
        let record = FUNCTION.decode(version, buf, offset)?;

        // A null module or file drops the offset or line that goes with it.
        let point = modules
            .resolve_optional(record.u64("pModule")?)?
            .map(|module| -> Result<_, FormatError> {
                Ok(BinaryPoint {
                    module: ModuleIndex::new(module),
                    offset: record.u64("offset")?,
                })
            })
            .transpose()?;
        let source = files
            .resolve_optional(record.u64("pFile")?)?
            .map(|file| -> Result<_, FormatError> {
                Ok(SourceLine {
                    file: FileIndex::new(file),
                    line: record.u32("line")?,
                })
            })
            .transpose()?;

        let function = Function {
            name: read_string(buf, record.u64("pName")?)?,
            point,
            source,
            flags: FunctionFlags::from_bits_versioned(version, record.u32("flags")?),
        };
        functions.push(offset, function);
    }

    Ok(functions)
}
