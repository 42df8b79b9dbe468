//! Read-only ZIP container index.
//!
//! The index is built by one forward pass over the record stream, driven by
//! local file headers. Central directory records are skipped rather than
//! trusted. Scanning is lenient: an unknown or foreign signature, or a record
//! cut short by the end of the stream, seals the index with whatever was
//! found so far.

mod records;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::DeflateDecoder;
use tracing::{debug, trace, warn};

use crate::archive::crc::Crc32;
use crate::error::{Result, VfsError};
use crate::stream::{SharedSource, StreamSlice};

use records::{skip_record, LocalFileHeader, RecordKind, RecordReader, Signature};
pub use records::{METHOD_DEFLATE, METHOD_STORED, ZIP64_EXTRA_FIELD_TAG};

/// General purpose flag: sizes follow the data in a data descriptor.
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Where an entry's data lives and how it is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipEntryRecord {
    /// Offset of the first data byte from the start of the container
    pub offset: u64,
    /// Length of the stored (possibly compressed) data
    pub compressed_len: u64,
    /// Length after decoding
    pub uncompressed_len: u64,
    /// CRC-32 stored in the header, never verified
    pub crc32: u32,
    /// Compression method id
    pub method: u16,
}

/// Returns true when a local header describes a directory marker.
///
/// The only signal ZIP gives is a name ending in `/` with no data, so a
/// zero-length file whose name ends in `/` is indistinguishable from a
/// directory.
pub fn is_directory_marker(name: &str, data_len: u64) -> bool {
    name.ends_with('/') && data_len == 0
}

/// A decoded stream over one entry.
pub enum EntryReader {
    /// Method 0: the slice itself
    Stored(StreamSlice),
    /// Method 8: the slice through a DEFLATE decoder
    Deflated(DeflateDecoder<StreamSlice>),
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryReader::Stored(slice) => slice.read(buf),
            EntryReader::Deflated(decoder) => decoder.read(buf),
        }
    }
}

impl fmt::Debug for EntryReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryReader::Stored(slice) => f.debug_tuple("Stored").field(slice).finish(),
            EntryReader::Deflated(decoder) => f.debug_tuple("Deflated").field(decoder.get_ref()).finish(),
        }
    }
}

/// Parsed index of a ZIP container, immutable after [`ZipArchive::open`].
pub struct ZipArchive {
    source: SharedSource,
    entries: BTreeMap<String, ZipEntryRecord>,
    directories: BTreeSet<String>,
    complete: bool,
}

impl ZipArchive {
    /// Scans a container and builds its index.
    ///
    /// Fails only when the stream does not start with a ZIP record or cannot
    /// be read at all. Damage found later truncates the index instead.
    pub fn open(source: SharedSource) -> Result<Self> {
        if source.is_seekable() {
            source.seek(0)?;
        }

        let mut archive = Self {
            source,
            entries: BTreeMap::new(),
            directories: BTreeSet::new(),
            complete: false,
        };
        archive.scan()?;

        debug!(
            "Indexed zip: {} files, {} directories{}",
            archive.entries.len(),
            archive.directories.len(),
            if archive.complete { "" } else { " (partial)" }
        );
        Ok(archive)
    }

    /// Opens and scans a ZIP file on the real filesystem.
    pub fn open_path(path: &Path) -> Result<Self> {
        let source = SharedSource::open(path)?;
        Self::open(source).map_err(|e| match e {
            VfsError::MalformedContainer { reason } => VfsError::MalformedContainer {
                reason: format!("{}: {}", path.display(), reason),
            },
            other => other,
        })
    }

    fn scan(&mut self) -> Result<()> {
        let source = self.source.clone();
        let mut reader = RecordReader::new(&source, 0);
        let mut records = 0usize;

        loop {
            let raw = match reader.next_signature() {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    if let Some(len) = source.stream_len().filter(|&len| reader.offset() > len) {
                        let overrun = reader.offset() - len;
                        let reason = format!("last record runs {} bytes past the end", overrun);
                        return self.seal(records, reason);
                    }
                    self.complete = true;
                    return Ok(());
                }
                Err(e) => return self.stop_early(records, e),
            };

            let kind = match Signature::classify(raw) {
                Signature::Record(kind) => kind,
                Signature::Unknown(kind) => {
                    return self.seal(records, format!("unknown record type 0x{:04x}", kind));
                }
                Signature::Foreign(raw) => {
                    return self.seal(records, format!("bad signature 0x{:08x}", raw));
                }
            };

            trace!("{:?} at offset {}", kind, reader.offset() - 4);
            let step = match kind {
                RecordKind::LocalFileHeader => self.index_local_file(&mut reader),
                other => skip_record(other, &mut reader),
            };
            if let Err(e) = step {
                return self.stop_early(records + 1, e);
            }
            records += 1;
        }
    }

    fn index_local_file(&mut self, reader: &mut RecordReader<'_>) -> io::Result<()> {
        let header = LocalFileHeader::read(reader)?;
        let data_start = reader.offset();

        if header.flags & FLAG_DATA_DESCRIPTOR != 0 && header.compressed_len == 0 {
            warn!(
                "Entry '{}' defers its sizes to a data descriptor; its data cannot be located",
                header.name
            );
        }

        if is_directory_marker(&header.name, header.compressed_len) {
            let name = header.name.trim_end_matches('/').to_string();
            trace!("Directory marker '{}'", name);
            self.directories.insert(name);
        } else {
            trace!(
                "Entry '{}': method {}, {} -> {} bytes, needs version {}{}",
                header.name,
                header.method,
                header.compressed_len,
                header.uncompressed_len,
                header.version_needed,
                if header.zip64 { ", zip64" } else { "" }
            );
            self.entries.insert(
                header.name.clone(),
                ZipEntryRecord {
                    offset: data_start,
                    compressed_len: header.compressed_len,
                    uncompressed_len: header.uncompressed_len,
                    crc32: header.crc32,
                    method: header.method,
                },
            );
        }

        reader.skip(header.compressed_len)
    }

    /// Ends the scan on a signature the reader cannot continue from.
    fn seal(&self, records: usize, reason: String) -> Result<()> {
        if records == 0 {
            return Err(VfsError::MalformedContainer { reason });
        }
        warn!("Zip scan stopped after {} records: {}", records, reason);
        Ok(())
    }

    /// Ends the scan on a read error, keeping what was indexed.
    fn stop_early(&self, records: usize, error: io::Error) -> Result<()> {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            if records == 0 {
                return Err(VfsError::MalformedContainer {
                    reason: "truncated record".to_string(),
                });
            }
            warn!("Zip scan stopped after {} records: truncated record", records);
            return Ok(());
        }
        if records == 0 {
            return Err(error.into());
        }
        warn!("Zip scan stopped after {} records: {}", records, error);
        Ok(())
    }

    /// Names of all file entries, sorted.
    pub fn list_files(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Names of all directory markers without their trailing `/`, sorted.
    pub fn list_directories(&self) -> impl Iterator<Item = &str> + '_ {
        self.directories.iter().map(String::as_str)
    }

    /// Number of file entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no file entries were found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if the scan reached the end of the stream cleanly.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Returns true if `name` is a file entry.
    pub fn contains_file(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns true if `name` is a directory marker.
    pub fn contains_directory(&self, name: &str) -> bool {
        self.directories.contains(name.trim_end_matches('/'))
    }

    pub fn entry(&self, name: &str) -> Option<&ZipEntryRecord> {
        self.entries.get(name)
    }

    /// Uncompressed size of an entry.
    pub fn file_size(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|e| e.uncompressed_len)
    }

    /// Stored CRC-32 of an entry.
    pub fn file_crc(&self, name: &str) -> Option<u32> {
        self.entries.get(name).map(|e| e.crc32)
    }

    pub fn compression_method(&self, name: &str) -> Option<u16> {
        self.entries.get(name).map(|e| e.method)
    }

    /// The stream the index was built from.
    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    /// Opens a decoded stream over an entry.
    pub fn open_entry(&self, name: &str) -> Result<EntryReader> {
        let entry = self.entries.get(name).ok_or_else(|| VfsError::NotFound {
            path: name.to_string(),
        })?;
        if !self.source.is_seekable() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "entries of a forward-only container cannot be opened",
            )
            .into());
        }

        let slice = StreamSlice::at(self.source.clone(), entry.offset, entry.compressed_len);
        match entry.method {
            METHOD_STORED => Ok(EntryReader::Stored(slice)),
            METHOD_DEFLATE => Ok(EntryReader::Deflated(DeflateDecoder::new(slice))),
            method => Err(VfsError::UnsupportedCompression {
                name: name.to_string(),
                method,
            }),
        }
    }

    /// Opens an entry, or `None` if it is missing or cannot be decoded.
    pub fn open_file(&self, name: &str) -> Option<EntryReader> {
        match self.open_entry(name) {
            Ok(reader) => Some(reader),
            Err(e) => {
                debug!("Cannot open zip entry '{}': {}", name, e);
                None
            }
        }
    }

    /// Computes the CRC-32 of an entry's decoded content.
    ///
    /// The result can be compared with [`file_crc`](Self::file_crc); the
    /// archive itself never does.
    pub fn checksum_entry(&self, name: &str) -> Option<u32> {
        let mut reader = self.open_file(name)?;
        let mut crc = Crc32::new();
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => return Some(crc.finalize()),
                Ok(n) => crc.update(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Checksum of '{}' failed: {}", name, e);
                    return None;
                }
            }
        }
    }
}

impl fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipArchive")
            .field("files", &self.entries.len())
            .field("directories", &self.directories.len())
            .field("complete", &self.complete)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ZipBuilder;
    use std::io::Cursor;

    const STORED: &[u8] = b"plain stored content";
    const TEXT: &[u8] = b"deflated text, deflated text, deflated text, deflated text!";

    fn sample() -> ZipArchive {
        let bytes = ZipBuilder::new()
            .directory("docs")
            .stored("docs/readme.txt", STORED)
            .deflated("data/text.txt", TEXT)
            .build();
        ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap()
    }

    #[test]
    fn test_list_files_and_directories() {
        let zip = sample();
        let files: Vec<&str> = zip.list_files().collect();
        assert_eq!(files, vec!["data/text.txt", "docs/readme.txt"]);
        let dirs: Vec<&str> = zip.list_directories().collect();
        assert_eq!(dirs, vec!["docs"]);
        assert_eq!(zip.len(), 2);
        assert!(zip.is_complete());
        assert!(zip.contains_directory("docs/"));
    }

    #[test]
    fn test_sizes_and_methods() {
        let zip = sample();
        assert_eq!(zip.file_size("docs/readme.txt"), Some(STORED.len() as u64));
        assert_eq!(zip.file_size("data/text.txt"), Some(TEXT.len() as u64));
        assert_eq!(zip.compression_method("docs/readme.txt"), Some(METHOD_STORED));
        assert_eq!(zip.compression_method("data/text.txt"), Some(METHOD_DEFLATE));
        assert_eq!(zip.file_size("missing"), None);

        let entry = zip.entry("data/text.txt").unwrap();
        assert!(entry.compressed_len < entry.uncompressed_len);
    }

    #[test]
    fn test_open_stored_and_deflated() {
        let zip = sample();

        let mut out = Vec::new();
        zip.open_file("docs/readme.txt").unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, STORED);

        let mut out = Vec::new();
        let mut reader = zip.open_file("data/text.txt").unwrap();
        assert!(matches!(reader, EntryReader::Deflated(_)));
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, TEXT);

        assert!(zip.open_file("nope").is_none());
    }

    #[test]
    fn test_stored_crc_matches_checksum() {
        let zip = sample();
        for name in ["docs/readme.txt", "data/text.txt"] {
            assert_eq!(zip.checksum_entry(name), zip.file_crc(name));
        }
        assert_eq!(zip.file_crc("docs/readme.txt"), Some(crc32fast::hash(STORED)));
    }

    #[test]
    fn test_unsupported_method_is_listed_but_not_opened() {
        let bytes = ZipBuilder::new().with_method("odd.bin", 14, b"lzma?").build();
        let zip = ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap();

        assert!(zip.contains_file("odd.bin"));
        assert_eq!(zip.file_size("odd.bin"), Some(5));
        assert!(zip.open_file("odd.bin").is_none());
        assert!(matches!(
            zip.open_entry("odd.bin"),
            Err(VfsError::UnsupportedCompression { method: 14, .. })
        ));
    }

    #[test]
    fn test_zip64_sizes_override_header() {
        let bytes = ZipBuilder::new()
            .zip64_stored("large.bin", b"zip64 payload")
            .stored("after.txt", b"after")
            .build();
        let zip = ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap();

        assert_eq!(zip.file_size("large.bin"), Some(13));
        let mut out = String::new();
        zip.open_file("large.bin").unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "zip64 payload");
        assert!(zip.contains_file("after.txt"));
    }

    #[test]
    fn test_skips_data_descriptor_records() {
        let bytes = ZipBuilder::new()
            .stored("one.txt", b"1")
            .data_descriptor(crc32fast::hash(b"1"), 1, 1)
            .stored("two.txt", b"22")
            .build();
        let zip = ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap();
        assert_eq!(zip.list_files().collect::<Vec<_>>(), vec!["one.txt", "two.txt"]);
        assert!(zip.is_complete());
    }

    #[test]
    fn test_skips_zip64_trailer_and_signature_records() {
        let mut trailer = Vec::new();
        trailer.extend_from_slice(&0x0606_4b50u32.to_le_bytes());
        trailer.extend_from_slice(&44u64.to_le_bytes());
        trailer.extend_from_slice(&[0u8; 44]);
        trailer.extend_from_slice(&0x0706_4b50u32.to_le_bytes());
        trailer.extend_from_slice(&[0u8; 16]);
        trailer.extend_from_slice(&0x0505_4b50u32.to_le_bytes());
        trailer.extend_from_slice(&3u16.to_le_bytes());
        trailer.extend_from_slice(b"sig");
        trailer.extend_from_slice(&0x0806_4b50u32.to_le_bytes());
        trailer.extend_from_slice(&2u32.to_le_bytes());
        trailer.extend_from_slice(b"xx");

        let bytes = ZipBuilder::new()
            .stored("one", b"1")
            .raw(&trailer)
            .stored("two", b"22")
            .build();
        let zip = ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap();
        assert_eq!(zip.list_files().collect::<Vec<_>>(), vec!["one", "two"]);
        assert_eq!(zip.file_size("two"), Some(2));
        assert!(zip.is_complete());
    }

    #[test]
    fn test_entry_running_past_end_is_partial() {
        let mut bytes = ZipBuilder::new().stored("whole.txt", b"whole").build();
        bytes.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        bytes.extend_from_slice(&20u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&5u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(b"short");
        bytes.extend_from_slice(b"only");

        let zip = ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap();
        assert!(zip.contains_file("whole.txt"));
        assert!(!zip.is_complete());
    }

    #[test]
    fn test_bad_signature_keeps_partial_index() {
        let bytes = ZipBuilder::new()
            .stored("kept.txt", b"kept")
            .raw(b"GARBAGE!")
            .stored("lost.txt", b"lost")
            .build();
        let zip = ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap();

        assert!(zip.contains_file("kept.txt"));
        assert!(!zip.contains_file("lost.txt"));
        assert!(!zip.is_complete());
    }

    #[test]
    fn test_truncated_header_keeps_partial_index() {
        let mut bytes = ZipBuilder::new().stored("kept.txt", b"kept").build();
        let cut = bytes.len();
        bytes.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 6]);
        assert!(bytes.len() > cut);

        let zip = ZipArchive::open(SharedSource::from_bytes(bytes)).unwrap();
        assert!(zip.contains_file("kept.txt"));
        assert!(!zip.is_complete());
    }

    #[test]
    fn test_not_a_zip() {
        let err = ZipArchive::open(SharedSource::from_bytes(&b"just some text file"[..])).unwrap_err();
        assert!(matches!(err, VfsError::MalformedContainer { .. }));

        let empty = ZipArchive::open(SharedSource::from_bytes(Vec::new())).unwrap();
        assert!(empty.is_empty());
        assert!(empty.is_complete());
    }

    #[test]
    fn test_entry_stream_outlives_archive() {
        let zip = sample();
        let mut reader = zip.open_file("data/text.txt").unwrap();
        drop(zip);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, TEXT);
    }

    #[test]
    fn test_forward_only_source_indexes() {
        let bytes = ZipBuilder::new().stored("a.txt", b"abc").build();
        let zip = ZipArchive::open(SharedSource::forward_only(Cursor::new(bytes))).unwrap();
        assert_eq!(zip.file_size("a.txt"), Some(3));
        assert!(zip.open_file("a.txt").is_none());
    }

    #[test]
    fn test_open_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.zip");
        std::fs::write(&path, ZipBuilder::new().stored("x", b"y").build()).unwrap();

        let zip = ZipArchive::open_path(&path).unwrap();
        assert!(zip.contains_file("x"));
        assert!(ZipArchive::open_path(&dir.path().join("none.zip")).is_err());
    }

    #[test]
    fn test_directory_marker_predicate() {
        assert!(is_directory_marker("dir/", 0));
        assert!(!is_directory_marker("dir/", 1));
        assert!(!is_directory_marker("file", 0));
    }
}
