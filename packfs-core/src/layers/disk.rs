//! The real OS filesystem as a resolution layer.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::Result;
use crate::stream::{read_chunked, ReadStream};
use crate::traits::FileSource;
use crate::types::{DirectoryEntry, EntryKind, NormalizedPath, SourceKind};

/// Answers lookups from the host filesystem.
///
/// Relative virtual paths resolve against `base_dir`, or the process working
/// directory when none is set.
#[derive(Debug, Clone, Default)]
pub struct DiskLayer {
    base_dir: Option<PathBuf>,
    skip_hidden: bool,
}

impl DiskLayer {
    pub fn new(base_dir: Option<PathBuf>, skip_hidden: bool) -> Self {
        Self {
            base_dir,
            skip_hidden,
        }
    }

    /// The directory relative paths resolve against, if one was configured.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Maps a virtual path onto the host.
    pub fn host_path(&self, path: &NormalizedPath) -> PathBuf {
        path.to_host_path(self.base_dir.as_deref())
    }

    fn metadata(&self, path: &NormalizedPath) -> Option<fs::Metadata> {
        fs::metadata(self.host_path(path)).ok()
    }

    /// Writes `data` to a real file, replacing any existing content.
    pub fn save_file(&self, path: &NormalizedPath, data: &[u8], make_dirs: bool) -> Result<()> {
        let target = self.host_path(path);
        if make_dirs {
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = File::create(&target)?;
        file.write_all(data)?;
        file.flush()?;
        debug!("Saved {} bytes to {}", data.len(), target.display());
        Ok(())
    }

    /// Creates a real directory and all of its missing parents.
    pub fn make_path(&self, dir: &NormalizedPath) -> Result<()> {
        let target = self.host_path(dir);
        fs::create_dir_all(&target)?;
        Ok(())
    }

    /// Returns true if the path itself is a symbolic link.
    pub fn is_symlink(&self, path: &NormalizedPath) -> bool {
        fs::symlink_metadata(self.host_path(path)).is_ok_and(|m| m.file_type().is_symlink())
    }

    /// Renames a real file or directory.
    pub fn rename(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<()> {
        fs::rename(self.host_path(from), self.host_path(to))?;
        Ok(())
    }

    /// Deletes a real file or an empty directory.
    pub fn delete(&self, path: &NormalizedPath) -> Result<()> {
        let target = self.host_path(path);
        if fs::symlink_metadata(&target)?.is_dir() {
            fs::remove_dir(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        Ok(())
    }

    /// Deletes a real file, or a directory with everything beneath it.
    pub fn delete_recursive(&self, path: &NormalizedPath) -> Result<()> {
        let target = self.host_path(path);
        if fs::symlink_metadata(&target)?.is_dir() {
            fs::remove_dir_all(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        debug!("Deleted {}", target.display());
        Ok(())
    }

    /// Copies one real file, replacing the destination. Returns the bytes copied.
    pub fn copy_file(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<u64> {
        Ok(fs::copy(self.host_path(from), self.host_path(to))?)
    }

    /// Copies a file, or a directory tree, creating destination directories.
    pub fn copy_recursive(&self, from: &NormalizedPath, to: &NormalizedPath) -> Result<u64> {
        copy_tree(&self.host_path(from), &self.host_path(to))
    }

    fn entry_kind(entry: &fs::DirEntry) -> Option<EntryKind> {
        let file_type = entry.file_type().ok()?;
        let is_dir = if file_type.is_symlink() {
            fs::metadata(entry.path()).ok()?.is_dir()
        } else {
            file_type.is_dir()
        };
        Some(if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }
}

impl FileSource for DiskLayer {
    fn kind(&self) -> SourceKind {
        SourceKind::RealDirectory
    }

    fn exists(&self, path: &NormalizedPath) -> bool {
        self.metadata(path).is_some()
    }

    fn is_dir(&self, path: &NormalizedPath) -> bool {
        self.metadata(path).is_some_and(|m| m.is_dir())
    }

    fn file_size(&self, path: &NormalizedPath) -> Option<u64> {
        self.metadata(path).filter(|m| m.is_file()).map(|m| m.len())
    }

    fn modified(&self, path: &NormalizedPath) -> Option<SystemTime> {
        self.metadata(path)?.modified().ok()
    }

    fn open(&self, path: &NormalizedPath) -> Option<ReadStream> {
        let target = self.host_path(path);
        if !fs::metadata(&target).is_ok_and(|m| m.is_file()) {
            return None;
        }
        match File::open(&target) {
            Ok(file) => Some(Box::new(BufReader::new(file))),
            Err(e) => {
                warn!("Cannot open {}: {}", target.display(), e);
                None
            }
        }
    }

    fn list_dir(&self, path: &NormalizedPath) -> Vec<DirectoryEntry> {
        let target = self.host_path(path);
        let reader = match fs::read_dir(&target) {
            Ok(reader) => reader,
            Err(_) => return Vec::new(),
        };

        let mut entries = Vec::new();
        for entry in reader.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.skip_hidden && name.starts_with('.') {
                continue;
            }
            if let Some(kind) = Self::entry_kind(&entry) {
                entries.push(DirectoryEntry::new(name, kind));
            }
        }
        entries
    }

    fn load_file_part(
        &self,
        path: &NormalizedPath,
        length: u64,
        offset: u64,
        chunk_size: usize,
    ) -> Option<Bytes> {
        let size = self.file_size(path)?;
        if offset >= size {
            return Some(Bytes::new());
        }
        let target = self.host_path(path);
        let result = File::open(&target).and_then(|mut file| {
            file.seek(SeekFrom::Start(offset))?;
            read_chunked(&mut file.take(length), chunk_size, length)
        });
        match result {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Partial read of {} failed: {}", target.display(), e);
                None
            }
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<u64> {
    if !fs::metadata(from)?.is_dir() {
        return Ok(fs::copy(from, to)?);
    }
    fs::create_dir_all(to)?;
    let mut copied = 0;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        copied += copy_tree(&entry.path(), &to.join(entry.file_name()))?;
    }
    Ok(copied)
}

/// Returns true if `path` is an existing real file.
pub(crate) fn is_real_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file())
}
