use std::fmt;
use std::time::SystemTime;

/// Represents the type of a virtual filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory, real or synthesized from archive paths
    Directory,
}

/// Names the resolution layer that answered a lookup.
///
/// Variants are declared in lookup precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    /// The real OS filesystem
    RealDirectory,
    /// A directory overlay redirecting into the real filesystem
    Overlay,
    /// A ZIP container mounted in the mount trie
    ZipMount,
    /// A sequential archive from the legacy search list
    SequentialArchiveMount,
}

impl SourceKind {
    /// All source kinds in lookup precedence order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::RealDirectory,
        SourceKind::Overlay,
        SourceKind::ZipMount,
        SourceKind::SequentialArchiveMount,
    ];

    /// Returns a short name for the source kind.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::RealDirectory => "disk",
            SourceKind::Overlay => "overlay",
            SourceKind::ZipMount => "zip",
            SourceKind::SequentialArchiveMount => "archive",
        }
    }

    /// Returns true for the layers backed by the real filesystem.
    pub fn is_on_disk(&self) -> bool {
        matches!(self, SourceKind::RealDirectory | SourceKind::Overlay)
    }

    /// Returns true for the layers backed by containers.
    pub fn is_archived(&self) -> bool {
        !self.is_on_disk()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata for a resolved entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    /// Type of the entry
    pub kind: EntryKind,
    /// Size in bytes (zero for directories)
    pub size: u64,
    /// Last modification time, only known for real files
    pub modified: Option<SystemTime>,
    /// Layer that answered
    pub source: SourceKind,
}

impl EntryInfo {
    /// Creates metadata for a file.
    pub fn file(size: u64, source: SourceKind) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            modified: None,
            source,
        }
    }

    /// Creates metadata for a directory.
    pub fn directory(source: SourceKind) -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
            modified: None,
            source,
        }
    }

    /// Sets the modification time.
    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    /// Returns true if the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns true if the entry is a file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Where a path can be found: on disk, in a container, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileFlags {
    /// Present in a mounted ZIP or sequential archive
    pub archived: bool,
    /// Present on the real filesystem, directly or through an overlay
    pub on_disk: bool,
}

impl FileFlags {
    /// Returns true if the path was found anywhere.
    pub fn exists(&self) -> bool {
        self.archived || self.on_disk
    }

    /// Marks the flag matching a source kind.
    pub fn mark(&mut self, source: SourceKind) {
        if source.is_on_disk() {
            self.on_disk = true;
        } else {
            self.archived = true;
        }
    }
}
