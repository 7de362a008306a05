//! Readers for HPCToolkit v4 performance databases.
//!
//! `hpcprof` writes the results of a measurement into a directory of four binary files:
//!
//! * `meta.db` ([`MetaDb`]): load modules, source files, functions, metric descriptions and the
//!   calling context tree.
//! * `profile.db` ([`ProfileDb`]): sparse metric values per profile, i.e. per measured thread or
//!   process, plus one summary profile.
//! * `cct.db` ([`ContextDb`]): the same values transposed, per context.
//! * `trace.db` ([`TraceDb`]): timelines of executing contexts per profile, if tracing was
//!   enabled.
//!
//! [`Database::open`] decodes a whole directory and checks that all ids used across files
//! resolve. Each file can also be decoded on its own from any byte slice.
//!
//! # Container format
//!
//! All files share the same container, see the [`header`] module. Records are little-endian and
//! have a fixed layout per minor version of the file. Later minor versions only append fields,
//! so each record is described once by a [`VersionedStructure`] and decoded generically. Records
//! refer to each other by absolute file offset, which are resolved through
//! [`EntityTable`](table::EntityTable)s into plain arena indices.
//!
//! # Example
//!
//! ```no_run
//! use hpcdb_formats::Database;
//!
//! let db = Database::open("hpctoolkit-app-database")?;
//! for (index, context) in db.meta().context().iter() {
//!     let Some(values) = db.contexts().values(context.ctx_id) else {
//!         continue;
//!     };
//!     println!("{index:?}: {} metrics", values.len());
//! }
//! # Ok::<(), hpcdb_formats::FormatError>(())
//! ```

#![warn(missing_docs)]

mod error;
mod sparse;
mod utils;

pub mod cctdb;
pub mod database;
pub mod flex;
pub mod header;
pub mod metadb;
pub mod profiledb;
pub mod structure;
pub mod table;
pub mod tracedb;

pub use cctdb::ContextDb;
pub use database::Database;
pub use error::{EntityKind, ErrorCategory, FormatError, FormatErrorKind};
pub use header::MAJOR_VERSION;
pub use metadb::MetaDb;
pub use profiledb::ProfileDb;
pub use structure::VersionedStructure;
pub use tracedb::TraceDb;
