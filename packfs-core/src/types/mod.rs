// Module declarations
pub mod path;
pub mod metadata;
pub mod directory;
pub mod config;

// Re-export all types from submodules
pub use path::{
    base_name, is_full_path, make_full_path, make_relative_path, normalize, parent_of,
    NormalizedPath,
};
pub use metadata::{EntryInfo, EntryKind, FileFlags, SourceKind};
pub use directory::{filter_by_extension, DirectoryEntry};
pub use config::{LogLevel, VfsConfig};
