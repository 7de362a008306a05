//! `hpcdb` reads the performance databases written by HPCToolkit's `hpcprof`.
//!
//! A database is a directory of four binary files. `meta.db` describes the measured program and
//! its calling context tree, `profile.db` and `cct.db` hold sparse metric values keyed by
//! profile and by context, and the optional `trace.db` holds per-profile timelines.
//!
//! # Usage
//!
//! Add `hpcdb` as a dependency to your `Cargo.toml`. The following features are available:
//!
//! - **`formats`** (default): Decoders for all four files and the cross-checked
//!   [`Database`](formats::Database).
//! - **`serde`**: Implements `serde::Serialize` for all decoded types.
//!
//! # Example
//!
//! ```no_run
//! use hpcdb::formats::Database;
//!
//! let db = Database::open("hpctoolkit-app-database")?;
//! println!("{}", db.meta().general().title);
//! for profile in db.profiles().profiles() {
//!     println!("{} contexts", profile.values.len());
//! }
//! # Ok::<(), hpcdb::formats::FormatError>(())
//! ```
//!
//! ## Minimal Rust Version
//!
//! This crate is known to require at least Rust 1.70.

#![warn(missing_docs)]

#[doc(inline)]
pub use hpcdb_common as common;
#[doc(inline)]
#[cfg(feature = "formats")]
pub use hpcdb_formats as formats;
