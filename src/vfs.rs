//! Virtual file lists built from the local filesystem.
//!
//! The enumerator converts an arbitrary local path into the ordered list of
//! servable files the stream server expects: one [`VirtualFile`] per regular
//! file, carrying its on-disk length and a lazy byte-range reader. The full
//! list is materialized up front because the server needs file count and
//! total size before it starts accepting connections.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while enumerating a local path.
#[derive(Debug, Error)]
pub enum EnumerateError {
    /// The root path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    /// A filesystem read failed during traversal. Fatal to the enumeration.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Factory producing a reader over a byte range of the backing content.
type RangeOpener = Arc<dyn Fn(Range<u64>) -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

/// A servable unit: name, byte length, and a lazy byte-range reader.
///
/// Immutable after creation. The same shape backs both locally enumerated
/// files and engine-provided ones, so the stream server never needs to know
/// where the bytes come from.
#[derive(Clone)]
pub struct VirtualFile {
    name: PathBuf,
    length: u64,
    opener: RangeOpener,
}

impl VirtualFile {
    /// Creates a virtual file from an arbitrary range-reader factory.
    pub fn new(
        name: PathBuf,
        length: u64,
        opener: impl Fn(Range<u64>) -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            length,
            opener: Arc::new(opener),
        }
    }

    /// Creates a virtual file whose ranges read directly from `path` on disk.
    pub fn from_disk(path: PathBuf, length: u64) -> Self {
        let backing = path.clone();
        Self::new(path, length, move |range| {
            let mut file = File::open(&backing)?;
            file.seek(SeekFrom::Start(range.start))?;
            let len = range.end.saturating_sub(range.start);
            Ok(Box::new(file.take(len)) as Box<dyn Read + Send>)
        })
    }

    /// Path-like display name of this file.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Total length in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Opens a reader over the given byte range.
    pub fn open(&self, range: Range<u64>) -> io::Result<Box<dyn Read + Send>> {
        (self.opener)(range)
    }

    /// Opens a reader over the whole file.
    pub fn open_all(&self) -> io::Result<Box<dyn Read + Send>> {
        self.open(0..self.length)
    }
}

impl fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFile")
            .field("name", &self.name)
            .field("length", &self.length)
            .finish()
    }
}

/// Recursively enumerates `path` into an ordered list of virtual files.
///
/// A regular file yields exactly one entry; a directory is transparent and
/// contributes its entries depth-first, sorted by name within each directory
/// so the sequence is stable. Symlinks get no special handling. Any read
/// failure aborts the whole enumeration.
pub fn enumerate(path: &Path) -> Result<Vec<VirtualFile>, EnumerateError> {
    if let Err(source) = fs::symlink_metadata(path) {
        return Err(if source.kind() == io::ErrorKind::NotFound {
            EnumerateError::PathNotFound(path.to_path_buf())
        } else {
            EnumerateError::Io {
                path: path.to_path_buf(),
                source,
            }
        });
    }

    let mut files = Vec::new();
    walk(path, &mut files)?;
    debug!(count = files.len(), root = %path.display(), "enumerated local path");
    Ok(files)
}

fn walk(path: &Path, out: &mut Vec<VirtualFile>) -> Result<(), EnumerateError> {
    let meta = fs::symlink_metadata(path).map_err(|source| EnumerateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if meta.is_dir() {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)
            .map_err(|source| EnumerateError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .map_err(|source| EnumerateError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        entries.sort();

        for entry in entries {
            walk(&entry, out)?;
        }
    } else {
        out.push(VirtualFile::from_disk(path.to_path_buf(), meta.len()));
    }

    Ok(())
}
