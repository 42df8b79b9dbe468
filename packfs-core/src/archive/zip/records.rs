//! ZIP record layouts and the forward reader used to walk them.

use std::io;

use crate::stream::SharedSource;

/// Low half of every record signature: "PK".
pub(crate) const SIGNATURE_MAGIC: u16 = 0x4b50;

const LOCAL_FILE_HEADER: u16 = 0x0403;
const EXTRA_DATA_RECORD: u16 = 0x0806;
const DATA_DESCRIPTOR: u16 = 0x0807;
const CENTRAL_DIRECTORY_ENTRY: u16 = 0x0201;
const DIGITAL_SIGNATURE: u16 = 0x0505;
const END_OF_CENTRAL_DIRECTORY: u16 = 0x0605;
const ZIP64_END_OF_CENTRAL_DIRECTORY: u16 = 0x0606;
const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR: u16 = 0x0706;

/// Extra field carrying 64-bit sizes.
pub const ZIP64_EXTRA_FIELD_TAG: u16 = 0x0001;

/// Compression method: no compression.
pub const METHOD_STORED: u16 = 0;
/// Compression method: raw DEFLATE.
pub const METHOD_DEFLATE: u16 = 8;

/// Fixed part of a local file header, after the signature.
const LOCAL_HEADER_FIXED_LEN: usize = 26;
/// Fixed part of a central directory entry, after the signature.
const CENTRAL_ENTRY_FIXED_LEN: usize = 42;
/// Fixed part of the end of central directory record, after the signature.
const END_OF_CENTRAL_DIRECTORY_FIXED_LEN: usize = 18;
const DATA_DESCRIPTOR_LEN: u64 = 12;
const ZIP64_LOCATOR_LEN: u64 = 16;

/// Record types the scanner knows how to read or skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind {
    LocalFileHeader,
    ExtraDataRecord,
    DataDescriptor,
    CentralDirectoryEntry,
    DigitalSignature,
    EndOfCentralDirectory,
    Zip64EndOfCentralDirectory,
    Zip64EndOfCentralDirectoryLocator,
}

/// Outcome of looking at a 4-byte signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signature {
    Record(RecordKind),
    /// "PK" with a record type this reader does not know.
    Unknown(u16),
    /// Not a ZIP signature at all.
    Foreign(u32),
}

impl Signature {
    pub(crate) fn classify(raw: u32) -> Self {
        if (raw & 0xffff) as u16 != SIGNATURE_MAGIC {
            return Signature::Foreign(raw);
        }
        let kind = match (raw >> 16) as u16 {
            LOCAL_FILE_HEADER => RecordKind::LocalFileHeader,
            EXTRA_DATA_RECORD => RecordKind::ExtraDataRecord,
            DATA_DESCRIPTOR => RecordKind::DataDescriptor,
            CENTRAL_DIRECTORY_ENTRY => RecordKind::CentralDirectoryEntry,
            DIGITAL_SIGNATURE => RecordKind::DigitalSignature,
            END_OF_CENTRAL_DIRECTORY => RecordKind::EndOfCentralDirectory,
            ZIP64_END_OF_CENTRAL_DIRECTORY => RecordKind::Zip64EndOfCentralDirectory,
            ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR => RecordKind::Zip64EndOfCentralDirectoryLocator,
            other => return Signature::Unknown(other),
        };
        Signature::Record(kind)
    }
}

/// Forward reader over a shared source that tracks its own offset.
///
/// The offset is counted rather than queried so that forward-only sources
/// still get correct entry offsets.
pub(crate) struct RecordReader<'a> {
    source: &'a SharedSource,
    offset: u64,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(source: &'a SharedSource, offset: u64) -> Self {
        Self { source, offset }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next signature, or `None` at a clean end of stream.
    pub(crate) fn next_signature(&mut self) -> io::Result<Option<u32>> {
        let mut buf = [0u8; 4];
        match self.source.read_full(&mut buf)? {
            0 => Ok(None),
            4 => {
                self.offset += 4;
                Ok(Some(u32::from_le_bytes(buf)))
            }
            _ => Err(io::ErrorKind::UnexpectedEof.into()),
        }
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.source.read_exact(buf)?;
        self.offset += buf.len() as u64;
        Ok(())
    }

    pub(crate) fn read_vec(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn read_u16(&mut self) -> io::Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub(crate) fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_u64(&mut self) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn skip(&mut self, count: u64) -> io::Result<()> {
        self.source.skip(count)?;
        self.offset += count;
        Ok(())
    }
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// A parsed local file header with Zip64 sizes already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub crc32: u32,
    pub compressed_len: u64,
    pub uncompressed_len: u64,
    pub name: String,
    pub zip64: bool,
}

impl LocalFileHeader {
    /// Reads the header body that follows a local file header signature.
    pub(crate) fn read(reader: &mut RecordReader<'_>) -> io::Result<Self> {
        let mut fixed = [0u8; LOCAL_HEADER_FIXED_LEN];
        reader.read_exact(&mut fixed)?;

        // time and date at 6..10 are not used
        let name_len = usize::from(le_u16(&fixed, 22));
        let extra_len = usize::from(le_u16(&fixed, 24));
        let name = reader.read_vec(name_len)?;
        let extra = reader.read_vec(extra_len)?;

        let mut header = Self {
            version_needed: le_u16(&fixed, 0),
            flags: le_u16(&fixed, 2),
            method: le_u16(&fixed, 4),
            crc32: le_u32(&fixed, 10),
            compressed_len: u64::from(le_u32(&fixed, 14)),
            uncompressed_len: u64::from(le_u32(&fixed, 18)),
            name: String::from_utf8_lossy(&name).into_owned(),
            zip64: false,
        };

        if let Some(field) = find_extra_field(&extra, ZIP64_EXTRA_FIELD_TAG) {
            header.zip64 = true;
            if let Some(bytes) = field.get(0..8) {
                header.uncompressed_len = u64::from_le_bytes(to_array(bytes));
            }
            if let Some(bytes) = field.get(8..16) {
                header.compressed_len = u64::from_le_bytes(to_array(bytes));
            }
        }

        Ok(header)
    }
}

fn to_array(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(bytes);
    out
}

/// Finds an extra field by id. A truncated trailing field ends the search.
pub(crate) fn find_extra_field(extra: &[u8], id: u16) -> Option<&[u8]> {
    let mut at = 0;
    while at + 4 <= extra.len() {
        let field_id = le_u16(extra, at);
        let size = usize::from(le_u16(extra, at + 2));
        let data = extra.get(at + 4..at + 4 + size)?;
        if field_id == id {
            return Some(data);
        }
        at += 4 + size;
    }
    None
}

/// Consumes a record that carries no index data, using its declared length.
pub(crate) fn skip_record(kind: RecordKind, reader: &mut RecordReader<'_>) -> io::Result<()> {
    match kind {
        RecordKind::LocalFileHeader => {
            let header = LocalFileHeader::read(reader)?;
            reader.skip(header.compressed_len)
        }
        RecordKind::ExtraDataRecord => {
            let len = reader.read_u32()?;
            reader.skip(u64::from(len))
        }
        RecordKind::DataDescriptor => reader.skip(DATA_DESCRIPTOR_LEN),
        RecordKind::CentralDirectoryEntry => {
            let mut fixed = [0u8; CENTRAL_ENTRY_FIXED_LEN];
            reader.read_exact(&mut fixed)?;
            let variable = u64::from(le_u16(&fixed, 24))
                + u64::from(le_u16(&fixed, 26))
                + u64::from(le_u16(&fixed, 28));
            reader.skip(variable)
        }
        RecordKind::DigitalSignature => {
            let len = reader.read_u16()?;
            reader.skip(u64::from(len))
        }
        RecordKind::EndOfCentralDirectory => {
            let mut fixed = [0u8; END_OF_CENTRAL_DIRECTORY_FIXED_LEN];
            reader.read_exact(&mut fixed)?;
            reader.skip(u64::from(le_u16(&fixed, 16)))
        }
        RecordKind::Zip64EndOfCentralDirectory => {
            let len = reader.read_u64()?;
            reader.skip(len)
        }
        RecordKind::Zip64EndOfCentralDirectoryLocator => reader.skip(ZIP64_LOCATOR_LEN),
    }
}
