//! The public VFS facade.
//!
//! A [`Vfs`] owns the four resolution layers and consults them in a fixed
//! order: the real filesystem, directory overlays, mounted ZIP containers,
//! then legacy sequential archives. Point queries stop at the first layer
//! that answers; listings merge every layer. All queries are total and report
//! failure through `None`, `false` or an empty result.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::archive::{SequentialArchive, ZipArchive};
use crate::error::{Result, VfsError};
use crate::layers::disk::is_real_file;
use crate::layers::{DiskLayer, LegacySearchList, MountTrie, OverlayRegistry};
use crate::stats::{StatsSnapshot, VfsStats};
use crate::stream::{ReadStream, SharedSource};
use crate::traits::FileSource;
use crate::types::path::{make_full_path, make_relative_path};
use crate::types::{
    DirectoryEntry, EntryInfo, EntryKind, FileFlags, NormalizedPath, SourceKind, VfsConfig,
};

/// An independent virtual filesystem instance.
///
/// Lookups take `&self` and mounting takes `&mut self`, so registries can
/// never change underneath an in-flight lookup.
#[derive(Debug)]
pub struct Vfs {
    config: VfsConfig,
    disk: DiskLayer,
    overlays: OverlayRegistry,
    mounts: MountTrie,
    archives: LegacySearchList,
    stats: VfsStats,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::from_config(VfsConfig::default())
    }
}

impl Vfs {
    /// Creates a VFS after validating `config`.
    pub fn new(config: VfsConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| VfsError::InvalidConfig { errors })?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: VfsConfig) -> Self {
        let disk = DiskLayer::new(config.base_dir.clone(), config.skip_hidden);
        let overlays = OverlayRegistry::new(disk.clone(), config.max_overlay_depth);
        let archives = LegacySearchList::new(config.read_chunk_size);
        Self {
            config,
            disk,
            overlays,
            mounts: MountTrie::new(),
            archives,
            stats: VfsStats::new(),
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    fn layers(&self) -> [&dyn FileSource; 4] {
        [&self.disk, &self.overlays, &self.mounts, &self.archives]
    }

    /// Asks each layer in precedence order and returns the first answer.
    fn first_hit<T>(
        &self,
        path: &NormalizedPath,
        query: impl Fn(&dyn FileSource, &NormalizedPath) -> Option<T>,
    ) -> Option<(SourceKind, T)> {
        self.stats.record_lookup();
        for layer in self.layers() {
            if let Some(value) = query(layer, path) {
                self.stats.record_hit(layer.kind());
                return Some((layer.kind(), value));
            }
        }
        self.stats.record_miss();
        None
    }

    // ---- queries ----

    pub fn exists(&self, path: &str) -> bool {
        let path = NormalizedPath::new(path);
        self.first_hit(&path, |layer, p| layer.exists(p).then_some(()))
            .is_some()
    }

    /// Returns true for directories in any layer. `""` and `"."` always are.
    pub fn is_dir(&self, path: &str) -> bool {
        let path = NormalizedPath::new(path);
        if is_working_dir(&path) {
            return true;
        }
        self.first_hit(&path, |layer, p| layer.is_dir(p).then_some(()))
            .is_some()
    }

    /// Like [`exists`](Self::exists), but only asks the real filesystem.
    pub fn exists_on_disk(&self, path: &str) -> bool {
        self.disk.exists(&NormalizedPath::new(path))
    }

    /// Like [`is_dir`](Self::is_dir), but only asks the real filesystem.
    pub fn is_dir_on_disk(&self, path: &str) -> bool {
        let path = NormalizedPath::new(path);
        is_working_dir(&path) || self.disk.is_dir(&path)
    }

    /// Returns true if the real path is a symbolic link.
    pub fn is_symlink(&self, path: &str) -> bool {
        self.disk.is_symlink(&NormalizedPath::new(path))
    }

    /// Size of a file, or `None` when no layer has it.
    pub fn file_size(&self, path: &str) -> Option<u64> {
        let path = NormalizedPath::new(path);
        self.first_hit(&path, |layer, p| layer.file_size(p))
            .map(|(_, size)| size)
    }

    /// Last modification time. Only real files and overlays carry one.
    pub fn modified(&self, path: &str) -> Option<SystemTime> {
        let path = NormalizedPath::new(path);
        self.first_hit(&path, |layer, p| layer.modified(p))
            .map(|(_, time)| time)
    }

    /// Kind, size, timestamp and origin of an entry.
    pub fn stat(&self, path: &str) -> Option<EntryInfo> {
        let path = NormalizedPath::new(path);
        self.first_hit(&path, |layer, p| {
            if layer.is_dir(p) {
                Some(EntryInfo::directory(layer.kind()).with_modified(layer.modified(p)))
            } else {
                layer
                    .file_size(p)
                    .map(|size| EntryInfo::file(size, layer.kind()).with_modified(layer.modified(p)))
            }
        })
        .map(|(_, info)| info)
    }

    /// The layer that would serve `path`.
    pub fn origin(&self, path: &str) -> Option<SourceKind> {
        let path = NormalizedPath::new(path);
        self.first_hit(&path, |layer, p| layer.exists(p).then_some(()))
            .map(|(kind, _)| kind)
    }

    /// Whether `path` exists on disk, in an archive, or both.
    pub fn file_flags(&self, path: &str) -> FileFlags {
        let path = NormalizedPath::new(path);
        let mut flags = FileFlags::default();
        for layer in self.layers() {
            if layer.exists(&path) {
                flags.mark(layer.kind());
            }
        }
        flags
    }

    // ---- reads ----

    /// Opens a stream over a file.
    ///
    /// The stream keeps its container alive even if it is unmounted later.
    pub fn open_read(&self, path: &str) -> Option<ReadStream> {
        let path = NormalizedPath::new(path);
        self.first_hit(&path, |layer, p| layer.open(p))
            .map(|(_, stream)| stream)
    }

    /// Reads a whole file.
    pub fn load_file(&self, path: &str) -> Option<Bytes> {
        let path = NormalizedPath::new(path);
        let chunk_size = self.config.read_chunk_size;
        let (_, data) = self.first_hit(&path, |layer, p| layer.load_file(p, chunk_size))?;
        self.stats.add_bytes_loaded(data.len() as u64);
        Some(data)
    }

    /// Reads a whole file as text, replacing invalid UTF-8.
    pub fn load_string(&self, path: &str) -> Option<String> {
        self.load_file(path)
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    /// Reads at most `length` bytes starting at `offset`.
    ///
    /// Shorter files yield fewer bytes and an offset past the end yields an
    /// empty buffer.
    pub fn load_file_part(&self, path: &str, length: u64, offset: u64) -> Option<Bytes> {
        let path = NormalizedPath::new(path);
        let chunk_size = self.config.read_chunk_size;
        let (_, data) = self.first_hit(&path, |layer, p| {
            layer.load_file_part(p, length, offset, chunk_size)
        })?;
        self.stats.add_bytes_loaded(data.len() as u64);
        Some(data)
    }

    // ---- listings ----

    /// Children of a directory merged across every layer, sorted by name.
    ///
    /// When layers disagree on a child's kind, the earlier layer wins.
    pub fn read_dir(&self, path: &str) -> Vec<DirectoryEntry> {
        let path = NormalizedPath::new(path);
        self.stats.record_listing();

        let mut merged: BTreeMap<String, EntryKind> = BTreeMap::new();
        for layer in self.layers() {
            for entry in layer.list_dir(&path) {
                merged.entry(entry.name).or_insert(entry.kind);
            }
        }
        merged
            .into_iter()
            .map(|(name, kind)| DirectoryEntry::new(name, kind))
            .collect()
    }

    /// Names of the children of a directory, see [`read_dir`](Self::read_dir).
    pub fn list_dir(&self, path: &str) -> Vec<String> {
        self.read_dir(path).into_iter().map(|e| e.name).collect()
    }

    pub fn list_subdirectories(&self, path: &str) -> Vec<String> {
        DirectoryEntry::filter_directories(self.read_dir(path))
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    pub fn list_files(&self, path: &str) -> Vec<String> {
        DirectoryEntry::filter_files(self.read_dir(path))
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    // ---- writes ----

    /// Writes a real file. Overlays and archives are never written.
    pub fn save_file(&self, path: &str, data: &[u8], make_dirs: bool) -> bool {
        let path = NormalizedPath::new(path);
        match self.disk.save_file(&path, data, make_dirs) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot save {}: {}", path, e);
                false
            }
        }
    }

    /// Creates a real directory and its missing parents.
    pub fn make_path(&self, dir: &str) -> bool {
        let dir = NormalizedPath::new(dir);
        match self.disk.make_path(&dir) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot create {}: {}", dir, e);
                false
            }
        }
    }

    /// Renames a real file or directory.
    pub fn rename_file(&self, from: &str, to: &str) -> bool {
        let (from, to) = (NormalizedPath::new(from), NormalizedPath::new(to));
        report(self.disk.rename(&from, &to), || format!("rename {} to {}", from, to))
    }

    /// Deletes a real file or empty directory.
    pub fn delete_file(&self, path: &str) -> bool {
        let path = NormalizedPath::new(path);
        report(self.disk.delete(&path), || format!("delete {}", path))
    }

    /// Deletes a real file or a whole directory tree.
    pub fn recursive_delete(&self, path: &str) -> bool {
        let path = NormalizedPath::new(path);
        report(self.disk.delete_recursive(&path), || format!("delete {}", path))
    }

    /// Copies a real file.
    pub fn copy_file(&self, from: &str, to: &str) -> bool {
        let (from, to) = (NormalizedPath::new(from), NormalizedPath::new(to));
        report(self.disk.copy_file(&from, &to), || format!("copy {} to {}", from, to))
    }

    /// Copies a real file or directory tree.
    pub fn recursive_copy(&self, from: &str, to: &str) -> bool {
        let (from, to) = (NormalizedPath::new(from), NormalizedPath::new(to));
        report(self.disk.copy_recursive(&from, &to), || format!("copy {} to {}", from, to))
    }

    // ---- path utilities ----

    fn cwd(&self) -> String {
        match &self.config.base_dir {
            Some(dir) => dir.to_string_lossy().into_owned(),
            None => env::current_dir()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Makes `path` absolute against the base directory.
    pub fn to_full_path(&self, path: &str) -> String {
        make_full_path(path, &self.cwd())
    }

    /// Expresses `path` relative to the base directory.
    pub fn to_relative_path(&self, path: &str) -> String {
        make_relative_path(path, &self.cwd())
    }

    // ---- zip mounts ----

    /// Mounts a parsed container under `mount_point`. Returns the file count.
    pub fn mount_zip(&mut self, archive: Arc<ZipArchive>, mount_point: &str) -> usize {
        let mounted = self.mounts.mount(&NormalizedPath::new(mount_point), archive);
        self.stats.increment_mounts();
        mounted
    }

    /// Scans a ZIP stream and mounts it.
    pub fn mount_zip_stream(&mut self, source: SharedSource, mount_point: &str) -> bool {
        match ZipArchive::open(source) {
            Ok(archive) => {
                self.mount_zip(Arc::new(archive), mount_point);
                true
            }
            Err(e) => {
                warn!("Cannot mount zip at '{}': {}", mount_point, e);
                false
            }
        }
    }

    /// Mounts a ZIP container found through the VFS itself.
    ///
    /// Real files and overlay targets are streamed from disk. A container
    /// that lives inside another mounted container is loaded into memory.
    pub fn mount_zip_file(&mut self, path: &str, mount_point: &str) -> bool {
        let virtual_path = NormalizedPath::new(path);
        let source = match self.real_file(&virtual_path) {
            Some(host) => match SharedSource::open(&host) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Cannot open zip {}: {}", host.display(), e);
                    return false;
                }
            },
            None => match self.load_file(path) {
                Some(data) => {
                    debug!("Mounting {} from memory ({} bytes)", path, data.len());
                    SharedSource::from_bytes(data)
                }
                None => {
                    warn!("Cannot mount zip {}: not found", path);
                    return false;
                }
            },
        };
        self.mount_zip_stream(source, mount_point)
    }

    fn real_file(&self, path: &NormalizedPath) -> Option<PathBuf> {
        std::iter::once(path.clone())
            .chain(self.overlays.resolve(path))
            .map(|candidate| self.disk.host_path(&candidate))
            .find(|host| is_real_file(host))
    }

    /// Drops every ZIP mount. Returns how many containers were mounted.
    pub fn unmount_all_zips(&mut self) -> usize {
        let removed = self.mounts.unmount_all();
        self.stats.remove_mounts(removed as u64);
        removed
    }

    // ---- overlays ----

    /// Redirects lookups under `mount_point` to the real directory `real_path`.
    pub fn mount_overlay(&mut self, real_path: &str, mount_point: &str) {
        self.overlays.mount(real_path, mount_point);
        self.stats.increment_mounts();
    }

    pub fn unmount_overlay(&mut self, mount_point: &str) -> usize {
        let removed = self.overlays.unmount(mount_point);
        self.stats.remove_mounts(removed as u64);
        removed
    }

    pub fn unmount_all_overlays(&mut self) -> usize {
        let removed = self.overlays.unmount_all();
        self.stats.remove_mounts(removed as u64);
        removed
    }

    // ---- legacy search list ----

    /// Adds a sequential archive to the search list.
    ///
    /// Relative paths resolve against the base directory. Returns false if
    /// the archive cannot be opened.
    pub fn add_search_archive(&mut self, path: impl AsRef<Path>) -> bool {
        let host = self.search_archive_path(path.as_ref());
        let before = self.archives.len();
        let added = self.archives.add(&host);
        if self.archives.len() > before {
            self.stats.increment_mounts();
        }
        added
    }

    /// Adds an archive that was already indexed.
    pub fn add_search_archive_index(&mut self, archive: SequentialArchive) -> bool {
        let before = self.archives.len();
        let added = self.archives.add_archive(archive);
        if self.archives.len() > before {
            self.stats.increment_mounts();
        }
        added
    }

    pub fn remove_search_archive(&mut self, path: impl AsRef<Path>) -> bool {
        let host = self.search_archive_path(path.as_ref());
        let removed = self.archives.remove(&host);
        if removed {
            self.stats.remove_mounts(1);
        }
        removed
    }

    pub fn clear_search_archives(&mut self) -> usize {
        let removed = self.archives.clear();
        self.stats.remove_mounts(removed as u64);
        removed
    }

    fn search_archive_path(&self, path: &Path) -> PathBuf {
        match self.disk.base_dir() {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    // ---- lifecycle ----

    /// Tears down every overlay, ZIP mount and search archive.
    pub fn reset(&mut self) {
        let overlays = self.overlays.unmount_all();
        let zips = self.mounts.unmount_all();
        let archives = self.archives.clear();
        debug!(
            "VFS reset: {} overlays, {} zips, {} archives",
            overlays, zips, archives
        );
        self.stats.reset();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn overlays(&self) -> &OverlayRegistry {
        &self.overlays
    }

    pub fn mounts(&self) -> &MountTrie {
        &self.mounts
    }

    pub fn search_list(&self) -> &LegacySearchList {
        &self.archives
    }
}

fn is_working_dir(path: &NormalizedPath) -> bool {
    path.is_empty() && !path.is_rooted() && path.parent_levels() == 0
}

/// Logs a failed real-filesystem operation and flattens it to a flag.
fn report<T>(result: Result<T>, action: impl FnOnce() -> String) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            warn!("Cannot {}: {}", action(), e);
            false
        }
    }
}
