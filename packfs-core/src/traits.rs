//! The virtual source abstraction shared by every resolution layer.
//!
//! Each place a file can come from (the real filesystem, a directory overlay,
//! a mounted ZIP container, a legacy sequential archive) implements
//! [`FileSource`]. The [`Vfs`](crate::vfs::Vfs) facade walks its sources in a
//! fixed order and stops at the first one that answers.

use std::time::SystemTime;

use bytes::Bytes;

use crate::stream::{read_chunked, read_part, ReadStream};
use crate::types::{DirectoryEntry, NormalizedPath, SourceKind};

/// A read-only provider of files addressed by normalized virtual paths.
///
/// Every query is total: a path the source does not know about yields
/// `false`, `None` or an empty listing, never an error.
pub trait FileSource: Send + Sync {
    /// Names the layer for statistics and origin queries.
    fn kind(&self) -> SourceKind;

    /// Returns true if the path names a file or directory in this source.
    fn exists(&self, path: &NormalizedPath) -> bool;

    /// Returns true if the path names a directory in this source.
    fn is_dir(&self, path: &NormalizedPath) -> bool;

    /// Size of a file in bytes, or `None` when the source has no such file.
    fn file_size(&self, path: &NormalizedPath) -> Option<u64>;

    /// Last modification time. Archive sources carry no timestamps.
    fn modified(&self, _path: &NormalizedPath) -> Option<SystemTime> {
        None
    }

    /// Opens a readable stream over a file.
    fn open(&self, path: &NormalizedPath) -> Option<ReadStream>;

    /// Immediate children of a directory.
    ///
    /// Returns an empty list when the path is not a directory here.
    fn list_dir(&self, path: &NormalizedPath) -> Vec<DirectoryEntry>;

    /// Reads a whole file through bounded chunks.
    ///
    /// The declared size caps the read but is never used for a single
    /// allocation.
    fn load_file(&self, path: &NormalizedPath, chunk_size: usize) -> Option<Bytes> {
        let limit = self.file_size(path)?;
        let mut stream = self.open(path)?;
        match read_chunked(&mut stream, chunk_size, limit) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!("Reading {} from {} failed: {}", path, self.kind(), e);
                None
            }
        }
    }

    /// Reads at most `length` bytes starting at `offset`.
    ///
    /// The default decodes and discards up to `offset`, which works for
    /// compressed entries. Sources that can seek override it.
    fn load_file_part(
        &self,
        path: &NormalizedPath,
        length: u64,
        offset: u64,
        chunk_size: usize,
    ) -> Option<Bytes> {
        let mut stream = self.open(path)?;
        match read_part(&mut stream, offset, length, chunk_size) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!("Partial read of {} from {} failed: {}", path, self.kind(), e);
                None
            }
        }
    }
}
