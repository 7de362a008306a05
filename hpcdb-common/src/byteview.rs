//! Random-access byte buffers for database files.
//!
//! See the [`ByteView`] struct for more documentation.

use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

/// The owner of data behind a ByteView.
#[derive(Debug)]
enum Backing {
    Buf(Vec<u8>),
    Mmap(Mmap),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match *self {
            Backing::Buf(ref buf) => buf,
            Backing::Mmap(ref mmap) => mmap,
        }
    }
}

/// A cheaply clonable view of the bytes of a database file.
///
/// The HPCToolkit formats are decoded by chasing absolute byte offsets, so every reader needs the
/// whole file available for random access. A `ByteView` provides exactly that: it dereferences
/// into a `&[u8]` regardless of whether the data is memory mapped from disk or owned.
///
/// # Example
///
/// ```
/// use std::io::Write;
/// use hpcdb_common::ByteView;
///
/// fn main() -> Result<(), std::io::Error> {
///     let mut file = tempfile::tempfile()?;
///     file.write_all(b"HPCTOOLKIT")?;
///
///     let view = ByteView::map_file(file)?;
///     assert_eq!(view.as_slice(), b"HPCTOOLKIT");
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct ByteView {
    backing: Arc<Backing>,
}

impl ByteView {
    fn with_backing(backing: Backing) -> Self {
        ByteView {
            backing: Arc::new(backing),
        }
    }

    /// Constructs a `ByteView` that owns the given bytes.
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        ByteView::with_backing(Backing::Buf(buffer))
    }

    /// Memory maps an open file handle.
    ///
    /// Empty files cannot be mapped on every platform, so they produce an empty view instead.
    pub fn map_file(file: File) -> Result<Self, io::Error> {
        match unsafe { Mmap::map(&file) } {
            Ok(mmap) => Ok(ByteView::with_backing(Backing::Mmap(mmap))),
            // Raised for empty files. 1006 is the Windows flavor of the same condition.
            Err(err)
                if err.kind() == io::ErrorKind::InvalidInput
                    || (cfg!(windows) && err.raw_os_error() == Some(1006)) =>
            {
                Ok(ByteView::from_vec(Vec::new()))
            }
            Err(err) => Err(err),
        }
    }

    /// Opens and memory maps the file at the given path.
    ///
    /// ```no_run
    /// use hpcdb_common::ByteView;
    ///
    /// fn main() -> Result<(), std::io::Error> {
    ///     let view = ByteView::open("database/meta.db")?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, io::Error> {
        let file = File::open(path)?;
        Self::map_file(file)
    }

    /// Returns the viewed bytes.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        self.backing.deref()
    }

    /// Returns `true` if the bytes are memory mapped from a file.
    pub fn is_mapped(&self) -> bool {
        matches!(*self.backing, Backing::Mmap(_))
    }
}

impl AsRef<[u8]> for ByteView {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for ByteView {
    type Target = [u8];

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}
