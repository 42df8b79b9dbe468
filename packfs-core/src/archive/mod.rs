//! Read-only container formats.

pub mod crc;
pub mod sequential;
pub mod zip;

pub use crc::{crc32, Crc32};
pub use sequential::{SequentialArchive, SequentialArchiveWriter};
pub use zip::{is_directory_marker, EntryReader, ZipArchive, ZipEntryRecord};
