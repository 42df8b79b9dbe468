//! Segment trie of mounted ZIP containers.
//!
//! Mounting walks the virtual prefix plus every entry name of the container,
//! creating nodes as needed, and marks the last node of each file as a leaf
//! that points back into the container. Inner nodes without a leaf marker are
//! synthetic directories. The trie only supports unmounting everything at
//! once: containers mounted under overlapping prefixes share nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::archive::ZipArchive;
use crate::stream::ReadStream;
use crate::traits::FileSource;
use crate::types::{DirectoryEntry, EntryKind, NormalizedPath, SourceKind};

/// A file leaf: the container and the entry's stored name.
#[derive(Clone)]
pub struct MountedFile {
    pub archive: Arc<ZipArchive>,
    pub internal_name: String,
}

impl fmt::Debug for MountedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedFile")
            .field("internal_name", &self.internal_name)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct MountNode {
    children: HashMap<String, MountNode>,
    file: Option<MountedFile>,
}

impl MountNode {
    /// The file leaf at this node, if any.
    pub fn file(&self) -> Option<&MountedFile> {
        self.file.as_ref()
    }

    pub fn is_dir(&self) -> bool {
        self.file.is_none()
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &MountNode)> + '_ {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    fn child_mut(&mut self, segment: &str) -> &mut MountNode {
        self.children.entry(segment.to_string()).or_default()
    }

    fn walk_mut<'a, I>(&mut self, segments: I) -> &mut MountNode
    where
        I: IntoIterator<Item = &'a String>,
    {
        segments
            .into_iter()
            .fold(self, |node, segment| node.child_mut(segment))
    }
}

#[derive(Debug, Default)]
pub struct MountTrie {
    root: MountNode,
    containers: usize,
}

impl MountTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts every entry of `archive` under `prefix`.
    ///
    /// Returns the number of files made visible. Entry names that climb
    /// above the container root are skipped.
    pub fn mount(&mut self, prefix: &NormalizedPath, archive: Arc<ZipArchive>) -> usize {
        let base = self.root.walk_mut(prefix.segments());
        let mut mounted = 0;

        for name in archive.list_files() {
            let entry_path = NormalizedPath::new(name);
            if entry_path.parent_levels() > 0 || entry_path.is_empty() {
                warn!("Skipping zip entry '{}': escapes the mount point", name);
                continue;
            }
            let leaf = base.walk_mut(entry_path.segments());
            leaf.file = Some(MountedFile {
                archive: Arc::clone(&archive),
                internal_name: name.to_string(),
            });
            mounted += 1;
        }

        for name in archive.list_directories() {
            let dir_path = NormalizedPath::new(name);
            if dir_path.parent_levels() == 0 {
                base.walk_mut(dir_path.segments());
            }
        }

        self.containers += 1;
        debug!("Mounted zip at '{}': {} files", prefix, mounted);
        mounted
    }

    /// Finds the node for `path` without creating anything.
    ///
    /// The rooted flag is ignored; paths that climb above the root never
    /// resolve.
    pub fn resolve(&self, path: &NormalizedPath) -> Option<&MountNode> {
        if self.is_empty() || path.parent_levels() > 0 {
            return None;
        }
        path.segments()
            .iter()
            .try_fold(&self.root, |node, segment| node.children.get(segment))
    }

    /// Drops every node. Returns the number of containers that were mounted.
    pub fn unmount_all(&mut self) -> usize {
        let containers = self.containers;
        self.root = MountNode::default();
        self.containers = 0;
        containers
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Number of `mount` calls since the last [`unmount_all`](Self::unmount_all).
    pub fn container_count(&self) -> usize {
        self.containers
    }

    fn leaf(&self, path: &NormalizedPath) -> Option<&MountedFile> {
        self.resolve(path)?.file()
    }
}

impl FileSource for MountTrie {
    fn kind(&self) -> SourceKind {
        SourceKind::ZipMount
    }

    fn exists(&self, path: &NormalizedPath) -> bool {
        self.resolve(path).is_some()
    }

    fn is_dir(&self, path: &NormalizedPath) -> bool {
        self.resolve(path).is_some_and(MountNode::is_dir)
    }

    fn file_size(&self, path: &NormalizedPath) -> Option<u64> {
        let leaf = self.leaf(path)?;
        leaf.archive.file_size(&leaf.internal_name)
    }

    fn open(&self, path: &NormalizedPath) -> Option<ReadStream> {
        let leaf = self.leaf(path)?;
        let reader = leaf.archive.open_file(&leaf.internal_name)?;
        Some(Box::new(reader))
    }

    fn list_dir(&self, path: &NormalizedPath) -> Vec<DirectoryEntry> {
        let Some(node) = self.resolve(path).filter(|n| n.is_dir()) else {
            return Vec::new();
        };
        let mut entries: Vec<DirectoryEntry> = node
            .children()
            .map(|(name, child)| {
                let kind = if child.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                };
                DirectoryEntry::new(name, kind)
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}
