//! Sequential record archives.
//!
//! The format is a plain run of records with no magic number and no stored
//! index:
//!
//! ```text
//! +----------------------------+----------------+-----------------+
//! | name: 512 bytes, NUL-padded | length: u32 LE | data: length    |
//! +----------------------------+----------------+-----------------+
//! ```
//!
//! Readers rebuild the table of contents, and the directory tree implied by
//! the names, with one linear scan.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::error::{Result, VfsError};
use crate::stream::{read_chunked, SharedSource, StreamSlice};
use crate::types::config::DEFAULT_READ_CHUNK_SIZE;
use crate::types::path::{normalize, NormalizedPath};

/// Size of the NUL-padded name field.
pub const NAME_FIELD_LEN: usize = 512;

/// Longest storable name; the last byte of the field is always a terminator.
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// Size of a record header: name field plus length.
pub const RECORD_HEADER_LEN: u64 = NAME_FIELD_LEN as u64 + 4;

/// Appends records to a sequential archive.
///
/// There is no read mode on this type, so adding to an archive opened for
/// reading is not expressible.
pub struct SequentialArchiveWriter<W: Write> {
    out: W,
    records: usize,
    written: u64,
}

impl SequentialArchiveWriter<BufWriter<File>> {
    /// Creates (or truncates) an archive file on disk.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        debug!("Writing sequential archive {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> SequentialArchiveWriter<W> {
    /// Creates a new writer over any output.
    pub fn new(out: W) -> Self {
        Self {
            out,
            records: 0,
            written: 0,
        }
    }

    /// Appends one record. The name is normalized before it is stored.
    ///
    /// Adding a name twice writes two records; readers keep the last one.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let stored = normalize(name);
        if stored.len() > MAX_NAME_LEN {
            return Err(VfsError::NameTooLong {
                name: stored,
                max: MAX_NAME_LEN,
            });
        }
        if stored.is_empty() {
            return Err(VfsError::InvalidPath {
                path: name.to_string(),
                reason: "empty entry name".to_string(),
            });
        }
        let length = u32::try_from(data.len()).map_err(|_| VfsError::InvalidPath {
            path: stored.clone(),
            reason: "entry larger than 4 GiB".to_string(),
        })?;

        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        header[..stored.len()].copy_from_slice(stored.as_bytes());
        header[NAME_FIELD_LEN..].copy_from_slice(&length.to_le_bytes());

        self.out.write_all(&header)?;
        self.out.write_all(data)?;
        self.records += 1;
        self.written += RECORD_HEADER_LEN + u64::from(length);
        trace!("Added '{}' ({} bytes)", stored, length);
        Ok(())
    }

    /// Number of records written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Bytes written so far, headers included.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flushes and returns the underlying output.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordLocation {
    header_offset: u64,
    len: u64,
}

impl RecordLocation {
    fn data_offset(&self) -> u64 {
        self.header_offset + RECORD_HEADER_LEN
    }
}

/// Read-only index over a sequential archive.
pub struct SequentialArchive {
    source: SharedSource,
    file_name: String,
    chunk_size: usize,
    toc: BTreeMap<String, RecordLocation>,
    contents: BTreeMap<String, BTreeSet<String>>,
    subdirectories: BTreeMap<String, BTreeSet<String>>,
    directories: BTreeSet<String>,
}

impl SequentialArchive {
    /// Opens and indexes an archive file on disk.
    pub fn open_path(path: &Path) -> Result<Self> {
        let source = SharedSource::open(path)?;
        Self::from_source(source, &path.to_string_lossy())
    }

    /// Indexes an archive read from `source`. `file_name` identifies it.
    pub fn from_source(source: SharedSource, file_name: &str) -> Result<Self> {
        let mut archive = Self {
            source,
            file_name: normalize(file_name),
            chunk_size: DEFAULT_READ_CHUNK_SIZE,
            toc: BTreeMap::new(),
            contents: BTreeMap::new(),
            subdirectories: BTreeMap::new(),
            directories: BTreeSet::new(),
        };
        archive.rebuild_table_of_contents()?;
        debug!(
            "Indexed archive {}: {} files, {} directories",
            archive.file_name,
            archive.toc.len(),
            archive.directories.len()
        );
        Ok(archive)
    }

    /// Sets the chunk size used by whole-file loads.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn rebuild_table_of_contents(&mut self) -> Result<()> {
        if self.source.is_seekable() {
            self.source.seek(0)?;
        }
        let total = self.source.stream_len();
        let mut offset = 0u64;
        let mut header = [0u8; RECORD_HEADER_LEN as usize];

        loop {
            let read = self.source.read_full(&mut header)?;
            if read == 0 {
                break;
            }
            if read < header.len() {
                warn!(
                    "Archive {}: truncated record header at offset {}",
                    self.file_name, offset
                );
                break;
            }

            header[MAX_NAME_LEN] = 0;
            let name_end = header[..NAME_FIELD_LEN]
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(MAX_NAME_LEN);
            let name = normalize(&String::from_utf8_lossy(&header[..name_end]));
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&header[NAME_FIELD_LEN..]);
            let len = u64::from(u32::from_le_bytes(len_bytes));

            let end = offset + RECORD_HEADER_LEN + len;
            if total.is_some_and(|total| end > total) {
                warn!(
                    "Archive {}: record '{}' at offset {} runs past the end",
                    self.file_name, name, offset
                );
                break;
            }

            if name.is_empty() {
                warn!("Archive {}: unnamed record at offset {}", self.file_name, offset);
            } else {
                self.index_record(name, RecordLocation { header_offset: offset, len });
            }

            match self.source.skip(len) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("Archive {}: last record is truncated", self.file_name);
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            offset = end;
        }
        Ok(())
    }

    fn index_record(&mut self, name: String, location: RecordLocation) {
        trace!("Record '{}' at {} ({} bytes)", name, location.header_offset, location.len);

        let path = NormalizedPath::new(&name);
        if let (Some(parent), Some(leaf)) = (path.parent(), path.file_name()) {
            self.contents
                .entry(parent.to_string())
                .or_default()
                .insert(leaf.to_string());
        }

        // rooted names hang off "/" so every listed directory can be entered
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current.segments().is_empty() && !current.is_rooted() {
                break;
            }
            let parent = current.parent();
            if let (Some(parent), Some(leaf)) = (&parent, current.file_name()) {
                self.subdirectories
                    .entry(parent.to_string())
                    .or_default()
                    .insert(leaf.to_string());
            }
            self.directories.insert(current.to_string());
            dir = parent;
        }

        // last record with a given name wins
        self.toc.insert(name, location);
    }

    /// The normalized path the archive was opened from.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Number of distinct files.
    pub fn len(&self) -> usize {
        self.toc.len()
    }

    /// Returns true if the archive has no files.
    pub fn is_empty(&self) -> bool {
        self.toc.is_empty()
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.toc.contains_key(&normalize(name))
    }

    /// Returns true for every directory implied by a stored name.
    pub fn dir_exists(&self, name: &str) -> bool {
        self.directories.contains(&normalize(name))
    }

    pub fn file_size(&self, name: &str) -> Option<u64> {
        self.toc.get(&normalize(name)).map(|loc| loc.len)
    }

    /// All stored names, sorted.
    pub fn list_files(&self) -> impl Iterator<Item = &str> + '_ {
        self.toc.keys().map(String::as_str)
    }

    /// Children of `dir`: subdirectories first, then files, each sorted.
    pub fn list_dir(&self, dir: &str) -> Vec<String> {
        let dir = normalize(dir);
        self.list_subdirectories(&dir)
            .chain(self.list_files_in(&dir))
            .map(str::to_string)
            .collect()
    }

    /// Base names of the directories directly under `dir`.
    pub fn list_subdirectories(&self, dir: &str) -> impl Iterator<Item = &str> + '_ {
        self.subdirectories
            .get(&normalize(dir))
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Base names of the files directly under `dir`.
    pub fn list_files_in(&self, dir: &str) -> impl Iterator<Item = &str> + '_ {
        self.contents
            .get(&normalize(dir))
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Opens a stream over a stored file.
    pub fn open_file(&self, name: &str) -> Option<StreamSlice> {
        let location = self.toc.get(&normalize(name))?;
        if !self.source.is_seekable() {
            debug!("Archive {} is not seekable; cannot open '{}'", self.file_name, name);
            return None;
        }
        Some(StreamSlice::at(self.source.clone(), location.data_offset(), location.len))
    }

    /// Reads a whole stored file.
    pub fn load_file(&self, name: &str) -> Option<Bytes> {
        let mut slice = self.open_file(name)?;
        let len = slice.len();
        match read_chunked(&mut slice, self.chunk_size, len) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Archive {}: reading '{}' failed: {}", self.file_name, name, e);
                None
            }
        }
    }

    /// Reads up to `length` bytes starting at `offset` within a stored file.
    pub fn load_file_part(&self, name: &str, length: u64, offset: u64) -> Option<Bytes> {
        let mut slice = self.open_file(name)?;
        if offset >= slice.len() {
            return Some(Bytes::new());
        }
        let result = slice
            .seek(SeekFrom::Start(offset))
            .and_then(|_| read_chunked(&mut slice, self.chunk_size, length));
        match result {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Archive {}: reading '{}' failed: {}", self.file_name, name, e);
                None
            }
        }
    }
}

impl fmt::Debug for SequentialArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialArchive")
            .field("file_name", &self.file_name)
            .field("files", &self.toc.len())
            .finish()
    }
}

/// Reads every record of an archive in order, duplicates included.
///
/// Used by tooling that wants the raw record stream rather than the index.
pub fn read_records<R: Read>(mut input: R) -> Result<Vec<(String, Bytes)>> {
    let mut records = Vec::new();
    let mut header = [0u8; RECORD_HEADER_LEN as usize];
    loop {
        match input.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        header[MAX_NAME_LEN] = 0;
        let name_end = header.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        let name = normalize(&String::from_utf8_lossy(&header[..name_end]));
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&header[NAME_FIELD_LEN..]);
        let len = u64::from(u32::from_le_bytes(len_bytes));

        let data = read_chunked(&mut input, DEFAULT_READ_CHUNK_SIZE, len)?;
        if (data.len() as u64) < len {
            warn!("Record '{}' is truncated", name);
            break;
        }
        records.push((name, data));
    }
    Ok(records)
}
