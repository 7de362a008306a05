//! Support for `meta.db`, the database file describing the measured program.
//!
//! A `meta.db` file holds everything that is shared between profiles: load modules, source
//! files, functions, metric descriptions, identifier kind names and the calling context tree.
//! All references between records are absolute file offsets. [`MetaDb::parse`] resolves them
//! into arena indices such as [`ModuleIndex`] or [`ContextIndex`], which are looked up through
//! the accessors on [`MetaDb`].
//!
//! # Example
//!
//! ```no_run
//! use hpcdb_common::ByteView;
//! use hpcdb_formats::metadb::{ContextRef, MetaDb};
//!
//! let view = ByteView::open("database/meta.db")?;
//! let meta = MetaDb::parse(&view)?;
//!
//! for entry in meta.context().entry_points() {
//!     println!("{} (#{})", entry.pretty_name, entry.ctx_id);
//! }
//! assert_eq!(meta.context_by_id(0), Some(ContextRef::Root));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod context;
mod entities;
mod general;
mod metrics;

use std::fmt;

use crate::error::FormatError;
use crate::header::{FileFormat, FileHeader, SectionDef};

pub use self::context::*;
pub use self::entities::*;
pub use self::general::*;
pub use self::metrics::*;

/// The newest `meta.db` minor version this crate knows about.
pub const MAX_MINOR_VERSION: u8 = 0;

/// The `meta.db` container format.
pub const FORMAT: FileFormat = FileFormat {
    code: *b"meta",
    footer: *b"_meta.db",
    max_minor_version: MAX_MINOR_VERSION,
    sections: &[
        SectionDef::new("General", 0),
        SectionDef::new("IdNames", 0),
        SectionDef::new("Metrics", 0),
        SectionDef::new("Context", 0),
        SectionDef::new("Strings", 0),
        SectionDef::new("Modules", 0),
        SectionDef::new("Files", 0),
        SectionDef::new("Functions", 0),
    ],
};

macro_rules! arena_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
        pub struct $name(usize);

        impl $name {
            /// Creates an index from its position in the arena.
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Returns the position in the arena.
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

arena_index!(
    /// Index of a [`Module`] in [`MetaDb::modules`].
    ModuleIndex
);
arena_index!(
    /// Index of a [`SourceFile`] in [`MetaDb::files`].
    FileIndex
);
arena_index!(
    /// Index of a [`Function`] in [`MetaDb::functions`].
    FunctionIndex
);
arena_index!(
    /// Index of a [`PropagationScope`] in [`PerformanceMetrics::scopes`].
    ScopeIndex
);
arena_index!(
    /// Index of a [`Context`] in a [`ContextTree`].
    ContextIndex
);

/// A decoded `meta.db` file.
///
/// The value owns all of its data, the buffer it was parsed from can be dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetaDb {
    minor_version: u8,
    general: GeneralProperties,
    id_names: IdentifierNames,
    metrics: PerformanceMetrics,
    modules: Vec<Module>,
    files: Vec<SourceFile>,
    functions: Vec<Function>,
    context: ContextTree,
}

impl MetaDb {
    /// Returns whether the buffer starts like a `meta.db` file.
    pub fn test(data: &[u8]) -> bool {
        data.starts_with(b"HPCTOOLKITmeta")
    }

    /// Parses a `meta.db` file.
    #[tracing::instrument(level = "trace", name = "MetaDb::parse", skip_all)]
    pub fn parse(buf: &[u8]) -> Result<Self, FormatError> {
        let header = FileHeader::parse(buf, &FORMAT)?;
        let version = header.minor_version;

        let modules = parse_modules(version, buf, header.section("Modules")?.offset)?;
        let files = parse_files(version, buf, header.section("Files")?.offset)?;
        let functions = parse_functions(
            version,
            buf,
            header.section("Functions")?.offset,
            &modules,
            &files,
        )?;

        let general = GeneralProperties::parse(version, buf, header.section("General")?.offset)?;
        let id_names = IdentifierNames::parse(version, buf, header.section("IdNames")?.offset)?;
        let metrics = PerformanceMetrics::parse(version, buf, header.section("Metrics")?.offset)?;

        let tables = EntityTables {
            modules: &modules,
            files: &files,
            functions: &functions,
        };
        let context = ContextTree::parse(version, buf, header.section("Context")?.offset, &tables)?;

        tracing::debug!(
            modules = modules.len(),
            files = files.len(),
            functions = functions.len(),
            metrics = metrics.metrics.len(),
            "decoded meta.db"
        );

        Ok(MetaDb {
            minor_version: version,
            general,
            id_names,
            metrics,
            modules: modules.into_items(),
            files: files.into_items(),
            functions: functions.into_items(),
            context,
        })
    }

    /// The minor version of the file.
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    /// The general properties section.
    pub fn general(&self) -> &GeneralProperties {
        &self.general
    }

    /// The identifier kind names.
    pub fn id_names(&self) -> &IdentifierNames {
        &self.id_names
    }

    /// Returns the name of an identifier kind, see [`IdentifierNames::get`].
    pub fn kind_name(&self, kind: u8) -> Option<&str> {
        self.id_names.get(kind)
    }

    /// The metric descriptions and propagation scopes.
    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    /// Looks up a propagated metric id, see [`PerformanceMetrics::prop_metric`].
    pub fn prop_metric(&self, id: u16) -> Option<(&Metric, &ScopeInstance)> {
        self.metrics.prop_metric(id)
    }

    /// Looks up a summary statistic id, see [`PerformanceMetrics::summary_metric`].
    pub fn summary_metric(&self, id: u16) -> Option<(&Metric, &SummaryStatistic)> {
        self.metrics.summary_metric(id)
    }

    /// All load modules, in file order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Returns the load module at `index`.
    pub fn module(&self, index: ModuleIndex) -> Option<&Module> {
        self.modules.get(index.index())
    }

    /// All source files, in file order.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Returns the source file at `index`.
    pub fn file(&self, index: FileIndex) -> Option<&SourceFile> {
        self.files.get(index.index())
    }

    /// All functions, in file order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Returns the function at `index`.
    pub fn function(&self, index: FunctionIndex) -> Option<&Function> {
        self.functions.get(index.index())
    }

    /// Returns the propagation scope at `index`.
    pub fn scope(&self, index: ScopeIndex) -> Option<&PropagationScope> {
        self.metrics.scope(index)
    }

    /// The calling context tree.
    pub fn context(&self) -> &ContextTree {
        &self.context
    }

    /// Looks up an entry point or context by id, see [`ContextTree::by_id`].
    pub fn context_by_id(&self, ctx_id: u32) -> Option<ContextRef<'_>> {
        self.context.by_id(ctx_id)
    }
}
