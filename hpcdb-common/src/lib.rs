//! Common functionality for `hpcdb`.
//!
//! This crate exposes two things:
//!
//!  - [`ByteView`]: Gives random access to a database file, either memory mapped from the file
//!    system or held in memory.
//!  - Little-endian primitive and NUL-terminated string reads at absolute offsets, see
//!    [`read_u8`], [`read_u64`], [`read_f64`] and [`read_cstr`].
//!
//! This module is part of the `hpcdb` crate.

#![warn(missing_docs)]

mod byteview;
mod bytes;

pub use crate::byteview::*;
pub use crate::bytes::*;
