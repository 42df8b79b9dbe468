//! Sequential archives consulted as the last resolution layer.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::archive::SequentialArchive;
use crate::stream::ReadStream;
use crate::traits::FileSource;
use crate::types::config::DEFAULT_READ_CHUNK_SIZE;
use crate::types::path::normalize;
use crate::types::{DirectoryEntry, EntryKind, NormalizedPath, SourceKind};

/// Ordered list of mounted sequential archives. Earlier archives win.
#[derive(Debug)]
pub struct LegacySearchList {
    archives: Vec<Arc<SequentialArchive>>,
    chunk_size: usize,
}

impl Default for LegacySearchList {
    fn default() -> Self {
        Self::new(DEFAULT_READ_CHUNK_SIZE)
    }
}

impl LegacySearchList {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            archives: Vec::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Opens an archive file and appends it to the search list.
    ///
    /// Returns true if the archive is in the list afterwards. An archive that
    /// cannot be opened is logged and skipped.
    pub fn add(&mut self, path: &Path) -> bool {
        let name = normalize(&path.to_string_lossy());
        if self.contains(&name) {
            debug!("Archive {} is already searched", name);
            return true;
        }
        match SequentialArchive::open_path(path) {
            Ok(archive) => self.push(archive),
            Err(e) => {
                warn!("Cannot add archive {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Appends an already indexed archive.
    pub fn add_archive(&mut self, archive: SequentialArchive) -> bool {
        if self.contains(archive.file_name()) {
            debug!("Archive {} is already searched", archive.file_name());
            return true;
        }
        self.push(archive)
    }

    fn push(&mut self, archive: SequentialArchive) -> bool {
        debug!("Searching archive {} ({} files)", archive.file_name(), archive.len());
        let archive = archive.with_chunk_size(self.chunk_size);
        self.archives.push(Arc::new(archive));
        true
    }

    fn contains(&self, file_name: &str) -> bool {
        self.archives.iter().any(|a| a.file_name() == file_name)
    }

    /// Removes the archive opened from `path`. Returns true if one was removed.
    pub fn remove(&mut self, path: &Path) -> bool {
        let name = normalize(&path.to_string_lossy());
        let before = self.archives.len();
        self.archives.retain(|a| a.file_name() != name);
        before != self.archives.len()
    }

    /// Removes every archive, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let removed = self.archives.len();
        self.archives.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    pub fn archives(&self) -> &[Arc<SequentialArchive>] {
        &self.archives
    }

    fn holding(&self, path: &NormalizedPath) -> Option<(&SequentialArchive, String)> {
        let name = path.to_string();
        self.archives
            .iter()
            .find(|a| a.file_exists(&name))
            .map(|a| (a.as_ref(), name))
    }
}

impl FileSource for LegacySearchList {
    fn kind(&self) -> SourceKind {
        SourceKind::SequentialArchiveMount
    }

    fn exists(&self, path: &NormalizedPath) -> bool {
        let name = path.to_string();
        self.archives
            .iter()
            .any(|a| a.file_exists(&name) || a.dir_exists(&name))
    }

    fn is_dir(&self, path: &NormalizedPath) -> bool {
        let name = path.to_string();
        self.archives.iter().any(|a| a.dir_exists(&name))
    }

    fn file_size(&self, path: &NormalizedPath) -> Option<u64> {
        let (archive, name) = self.holding(path)?;
        archive.file_size(&name)
    }

    fn open(&self, path: &NormalizedPath) -> Option<ReadStream> {
        let (archive, name) = self.holding(path)?;
        let slice = archive.open_file(&name)?;
        Some(Box::new(slice))
    }

    fn list_dir(&self, path: &NormalizedPath) -> Vec<DirectoryEntry> {
        let dir = path.to_string();
        let mut merged = BTreeMap::new();
        for archive in &self.archives {
            for name in archive.list_subdirectories(&dir) {
                merged
                    .entry(name.to_string())
                    .or_insert(EntryKind::Directory);
            }
            for name in archive.list_files_in(&dir) {
                merged.entry(name.to_string()).or_insert(EntryKind::File);
            }
        }
        merged
            .into_iter()
            .map(|(name, kind)| DirectoryEntry::new(name, kind))
            .collect()
    }

    fn load_file(&self, path: &NormalizedPath, _chunk_size: usize) -> Option<Bytes> {
        let (archive, name) = self.holding(path)?;
        archive.load_file(&name)
    }

    fn load_file_part(
        &self,
        path: &NormalizedPath,
        length: u64,
        offset: u64,
        _chunk_size: usize,
    ) -> Option<Bytes> {
        let (archive, name) = self.holding(path)?;
        archive.load_file_part(&name, length, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::SequentialArchiveWriter;
    use std::io::Read;
    use std::path::PathBuf;

    fn write_archive(dir: &Path, file: &str, records: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(file);
        let mut writer = SequentialArchiveWriter::create(&path).unwrap();
        for (name, data) in records {
            writer.add_file(name, data).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn test_search_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_archive(dir.path(), "first.pak", &[("shared.txt", &b"first"[..])]);
        let second = write_archive(
            dir.path(),
            "second.pak",
            &[("shared.txt", &b"second"[..]), ("only/second.txt", &b"2"[..])],
        );

        let mut list = LegacySearchList::default();
        assert!(list.add(&first));
        assert!(list.add(&second));
        assert!(list.add(&first));
        assert_eq!(list.len(), 2);

        let shared = NormalizedPath::new("shared.txt");
        assert_eq!(&list.load_file(&shared, 4).unwrap()[..], &b"first"[..]);
        assert_eq!(list.file_size(&NormalizedPath::new("only/second.txt")), Some(1));
        assert!(list.is_dir(&NormalizedPath::new("only")));
        assert!(list.exists(&NormalizedPath::new("only")));

        assert!(list.remove(&first));
        assert!(!list.remove(&first));
        assert_eq!(&list.load_file(&shared, 4).unwrap()[..], &b"second"[..]);
        assert_eq!(list.clear(), 1);
        assert!(!list.exists(&shared));
    }

    #[test]
    fn test_missing_archive_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = LegacySearchList::default();
        assert!(!list.add(&dir.path().join("missing.pak")));
        assert!(list.is_empty());
    }

    #[test]
    fn test_list_dir_merges_archives() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_archive(dir.path(), "a.pak", &[("d/x.txt", &b"x"[..]), ("d/sub/y.txt", &b"y"[..])]);
        let b = write_archive(dir.path(), "b.pak", &[("d/x.txt", &b"x2"[..]), ("d/z.txt", &b"z"[..])]);

        let mut list = LegacySearchList::default();
        list.add(&a);
        list.add(&b);

        assert_eq!(
            list.list_dir(&NormalizedPath::new("d")),
            vec![
                DirectoryEntry::new("sub", EntryKind::Directory),
                DirectoryEntry::new("x.txt", EntryKind::File),
                DirectoryEntry::new("z.txt", EntryKind::File),
            ]
        );
    }

    #[test]
    fn test_open_and_partial_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_archive(dir.path(), "p.pak", &[("f.bin", &b"0123456789"[..])]);
        let mut list = LegacySearchList::default();
        list.add(&path);

        let file = NormalizedPath::new("f.bin");
        let mut content = Vec::new();
        list.open(&file).unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, &b"0123456789"[..]);
        assert_eq!(&list.load_file_part(&file, 3, 4, 1).unwrap()[..], &b"456"[..]);
        assert!(list.open(&NormalizedPath::new("nope")).is_none());
    }
}
