//! Directory overlays: virtual prefixes redirected into real directories.
//!
//! Overlays are kept in registration order, which is also their precedence.
//! A rewritten path may itself fall under another overlay, so resolution
//! recurses, bounded by a depth limit and a cycle check.

use std::collections::{BTreeMap, HashSet};
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Result, VfsError};
use crate::layers::disk::DiskLayer;
use crate::stream::ReadStream;
use crate::traits::FileSource;
use crate::types::config::DEFAULT_MAX_OVERLAY_DEPTH;
use crate::types::{DirectoryEntry, NormalizedPath, SourceKind};

/// One redirection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayMapping {
    /// Virtual prefix the rule applies to
    pub mount_point: NormalizedPath,
    /// Real directory that replaces the prefix
    pub real_path: NormalizedPath,
}

impl OverlayMapping {
    /// Rewrites `path` if it lies under the mount point.
    pub fn rewrite(&self, path: &NormalizedPath) -> Option<NormalizedPath> {
        let rest = path.strip_prefix(&self.mount_point)?;
        Some(self.real_path.join(&rest))
    }
}

/// Ordered overlay list, consulted as a single resolution layer.
#[derive(Debug, Clone)]
pub struct OverlayRegistry {
    mappings: Vec<OverlayMapping>,
    disk: DiskLayer,
    max_depth: usize,
}

impl Default for OverlayRegistry {
    fn default() -> Self {
        Self::new(DiskLayer::default(), DEFAULT_MAX_OVERLAY_DEPTH)
    }
}

impl OverlayRegistry {
    /// Creates an empty registry whose targets are checked through `disk`.
    pub fn new(disk: DiskLayer, max_depth: usize) -> Self {
        Self {
            mappings: Vec::new(),
            disk,
            max_depth: max_depth.max(1),
        }
    }

    /// Redirects `mount_point` to the real directory `real_path`.
    pub fn mount(&mut self, real_path: &str, mount_point: &str) {
        let mapping = OverlayMapping {
            mount_point: NormalizedPath::new(mount_point),
            real_path: NormalizedPath::new(real_path),
        };
        debug!("Overlay {} -> {}", mapping.mount_point, mapping.real_path);
        self.mappings.push(mapping);
    }

    /// Removes every mapping registered at exactly `mount_point`.
    pub fn unmount(&mut self, mount_point: &str) -> usize {
        let mount_point = NormalizedPath::new(mount_point);
        let before = self.mappings.len();
        self.mappings.retain(|m| m.mount_point != mount_point);
        before - self.mappings.len()
    }

    /// Removes every mapping.
    pub fn unmount_all(&mut self) -> usize {
        let removed = self.mappings.len();
        self.mappings.clear();
        removed
    }

    pub fn mappings(&self) -> &[OverlayMapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Real paths `path` may be served from, in precedence order.
    ///
    /// Only rewritten paths that exist on disk are returned. A branch that hits
    /// the depth limit stops descending; the remaining mappings still apply.
    pub fn resolve(&self, path: &NormalizedPath) -> Vec<NormalizedPath> {
        let mut found = Vec::new();
        if let Err(e) = self.walk(path, &mut found) {
            warn!("Overlay resolution incomplete: {}", e);
        }
        found
    }

    /// Like [`resolve`](Self::resolve), but reports the depth limit as an error.
    pub fn try_resolve(&self, path: &NormalizedPath) -> Result<Vec<NormalizedPath>> {
        let mut found = Vec::new();
        self.walk(path, &mut found)?;
        Ok(found)
    }

    fn walk(&self, path: &NormalizedPath, found: &mut Vec<NormalizedPath>) -> Result<()> {
        if self.mappings.is_empty() {
            return Ok(());
        }
        let mut seen = HashSet::new();
        seen.insert(path.clone());
        if self.descend(path, path, 0, &mut seen, found) {
            return Err(VfsError::OverlayDepthExceeded {
                path: path.to_string(),
                depth: self.max_depth,
            });
        }
        Ok(())
    }

    /// Collects candidates for `path`. Returns true if any branch reached the
    /// depth limit; later mappings are still consulted.
    fn descend(
        &self,
        origin: &NormalizedPath,
        path: &NormalizedPath,
        depth: usize,
        seen: &mut HashSet<NormalizedPath>,
        found: &mut Vec<NormalizedPath>,
    ) -> bool {
        let mut limit_hit = false;
        for mapping in &self.mappings {
            let Some(rewritten) = mapping.rewrite(path) else {
                continue;
            };
            if !seen.insert(rewritten.clone()) {
                warn!(
                    "Overlay cycle: {} maps back to {} while resolving {}",
                    mapping.mount_point, rewritten, origin
                );
                continue;
            }
            if self.disk.exists(&rewritten) {
                found.push(rewritten.clone());
            }
            if depth + 1 >= self.max_depth {
                debug!(
                    "Overlay depth {} reached at {} while resolving {}",
                    self.max_depth, rewritten, origin
                );
                limit_hit = true;
                continue;
            }
            limit_hit |= self.descend(origin, &rewritten, depth + 1, seen, found);
        }
        limit_hit
    }
}

impl FileSource for OverlayRegistry {
    fn kind(&self) -> SourceKind {
        SourceKind::Overlay
    }

    fn exists(&self, path: &NormalizedPath) -> bool {
        !self.resolve(path).is_empty()
    }

    fn is_dir(&self, path: &NormalizedPath) -> bool {
        self.resolve(path).iter().any(|c| self.disk.is_dir(c))
    }

    fn file_size(&self, path: &NormalizedPath) -> Option<u64> {
        self.resolve(path).iter().find_map(|c| self.disk.file_size(c))
    }

    fn modified(&self, path: &NormalizedPath) -> Option<SystemTime> {
        self.resolve(path).iter().find_map(|c| self.disk.modified(c))
    }

    fn open(&self, path: &NormalizedPath) -> Option<ReadStream> {
        self.resolve(path).iter().find_map(|c| self.disk.open(c))
    }

    fn list_dir(&self, path: &NormalizedPath) -> Vec<DirectoryEntry> {
        let mut merged = BTreeMap::new();
        for candidate in self.resolve(path) {
            for entry in self.disk.list_dir(&candidate) {
                merged.entry(entry.name.clone()).or_insert(entry);
            }
        }
        merged.into_values().collect()
    }

    fn load_file_part(
        &self,
        path: &NormalizedPath,
        length: u64,
        offset: u64,
        chunk_size: usize,
    ) -> Option<Bytes> {
        self.resolve(path)
            .iter()
            .find(|c| self.disk.file_size(c).is_some())
            .and_then(|c| self.disk.load_file_part(c, length, offset, chunk_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn real(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_rewrite_matches_whole_segments() {
        let mapping = OverlayMapping {
            mount_point: NormalizedPath::new("a/b"),
            real_path: NormalizedPath::new("/real"),
        };
        assert_eq!(
            mapping.rewrite(&NormalizedPath::new("a/b/c.txt")).unwrap().to_string(),
            "/real/c.txt"
        );
        assert_eq!(mapping.rewrite(&NormalizedPath::new("a/b")).unwrap().to_string(), "/real");
        assert!(mapping.rewrite(&NormalizedPath::new("a/bc")).is_none());
        assert!(mapping.rewrite(&NormalizedPath::new("/a/b/c")).is_none());
    }

    #[test]
    fn test_first_registered_overlay_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("same.txt"), b"first").unwrap();
        fs::write(second.path().join("same.txt"), b"second!").unwrap();

        let mut overlays = OverlayRegistry::default();
        overlays.mount(&real(first.path()), "data");
        overlays.mount(&real(second.path()), "data");

        let path = NormalizedPath::new("data/same.txt");
        assert_eq!(overlays.resolve(&path).len(), 2);
        assert_eq!(overlays.file_size(&path), Some(5));
        assert_eq!(&overlays.load_file(&path, 2).unwrap()[..], b"first");
    }

    #[test]
    fn test_chained_overlays() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("deep.txt"), b"deep").unwrap();

        let mut overlays = OverlayRegistry::default();
        overlays.mount("middle", "top");
        overlays.mount(&real(dir.path()), "middle");

        let path = NormalizedPath::new("top/deep.txt");
        assert!(overlays.exists(&path));
        assert_eq!(overlays.file_size(&path), Some(4));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut overlays = OverlayRegistry::default();
        overlays.mount("b", "a");
        overlays.mount("a", "b");

        let path = NormalizedPath::new("a/file.txt");
        assert!(overlays.resolve(&path).is_empty());
        assert!(overlays.try_resolve(&path).unwrap().is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let mut overlays = OverlayRegistry::new(DiskLayer::default(), 4);
        overlays.mount("a/a", "a");

        let path = NormalizedPath::new("a/x");
        assert!(overlays.resolve(&path).is_empty());
        match overlays.try_resolve(&path) {
            Err(VfsError::OverlayDepthExceeded { depth, .. }) => assert_eq!(depth, 4),
            other => panic!("expected depth error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_nesting_overlay_does_not_hide_later_ones() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), b"found").unwrap();

        let mut overlays = OverlayRegistry::default();
        overlays.mount("a/a", "a");
        overlays.mount(&real(dir.path()), "a");

        let path = NormalizedPath::new("a/f.txt");
        let found = overlays.resolve(&path);
        assert_eq!(found.len(), 1);
        assert!(found[0].to_string().ends_with("/f.txt"));
        assert_eq!(&overlays.load_file(&path, 8).unwrap()[..], b"found");
        assert!(matches!(
            overlays.try_resolve(&path),
            Err(VfsError::OverlayDepthExceeded { .. })
        ));
    }

    #[test]
    fn test_depth_one_consults_every_mapping() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("f.txt"), b"2").unwrap();

        let mut overlays = OverlayRegistry::new(DiskLayer::default(), 1);
        overlays.mount(&real(first.path()), "d");
        overlays.mount(&real(second.path()), "d");

        let path = NormalizedPath::new("d/f.txt");
        assert_eq!(overlays.resolve(&path).len(), 1);
        assert_eq!(overlays.file_size(&path), Some(1));
    }

    #[test]
    fn test_unmount() {
        let mut overlays = OverlayRegistry::default();
        overlays.mount("/one", "m");
        overlays.mount("/two", "m");
        overlays.mount("/three", "other");

        assert_eq!(overlays.unmount("./m"), 2);
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays.unmount_all(), 1);
        assert!(overlays.is_empty());
    }

    #[test]
    fn test_list_dir_unions_candidates() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("a.txt"), b"").unwrap();
        fs::write(second.path().join("a.txt"), b"").unwrap();
        fs::write(second.path().join("b.txt"), b"").unwrap();

        let mut overlays = OverlayRegistry::default();
        overlays.mount(&real(first.path()), "v");
        overlays.mount(&real(second.path()), "v");

        let names: Vec<_> = overlays
            .list_dir(&NormalizedPath::new("v"))
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
