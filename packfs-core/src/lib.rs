//! # PackFS Core
//!
//! A virtual filesystem that reads files through one API whether their bytes
//! live on the real filesystem, in a directory overlaid onto another path, or
//! inside a mounted archive.
//!
//! ## Overview
//!
//! Every lookup walks the same chain of sources:
//!
//! 1. the real filesystem,
//! 2. directory overlays, in registration order,
//! 3. ZIP containers mounted into a path trie,
//! 4. legacy sequential archives, in the order they were added.
//!
//! Point queries stop at the first source that answers. Directory listings
//! merge all of them.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use packfs_core::{Vfs, VfsConfig};
//!
//! fn example() -> packfs_core::Result<()> {
//!     let mut vfs = Vfs::new(VfsConfig::new().base_dir("/srv/game"))?;
//!
//!     vfs.mount_zip_file("data.zip", "assets");
//!     vfs.mount_overlay("/home/me/mods", "assets/textures");
//!     vfs.add_search_archive("legacy.pak");
//!
//!     if let Some(data) = vfs.load_file("assets/textures/wall.png") {
//!         println!("{} bytes", data.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`]: path normalization, entry metadata and configuration
//! - [`stream`]: shared stream ownership, range slices and bounded reads
//! - [`archive`]: the ZIP reader and the sequential archive format
//! - [`layers`]: the four resolution layers
//! - [`traits`]: the [`FileSource`] abstraction the layers implement
//! - [`vfs`]: the [`Vfs`] facade
//! - [`stats`]: lookup counters
//! - [`error`]: error types

pub mod archive;
pub mod error;
pub mod layers;
pub mod stats;
pub mod stream;
pub mod traits;
pub mod types;
pub mod vfs;

#[cfg(test)]
mod test_support;

pub use archive::{crc32, SequentialArchive, SequentialArchiveWriter, ZipArchive};
pub use error::{Result, VfsError};
pub use stats::{StatsSnapshot, VfsStats};
pub use stream::{ReadStream, SharedSource, StreamSlice};
pub use traits::FileSource;
pub use types::{
    base_name, filter_by_extension, is_full_path, make_full_path, make_relative_path, normalize,
    parent_of, DirectoryEntry, EntryInfo, EntryKind, FileFlags, LogLevel, NormalizedPath,
    SourceKind, VfsConfig,
};
pub use vfs::Vfs;
