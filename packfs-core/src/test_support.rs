//! Fixture builders shared by unit tests.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::archive::zip::{METHOD_DEFLATE, METHOD_STORED, ZIP64_EXTRA_FIELD_TAG};

/// Compresses `data` as a raw DEFLATE stream.
pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Writes small ZIP containers: local headers, central directory and EOCD.
#[derive(Default)]
pub(crate) struct ZipBuilder {
    body: Vec<u8>,
    central: Vec<u8>,
    entries: u16,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, METHOD_STORED, data, data.len() as u64, crc32fast::hash(data), false)
    }

    pub(crate) fn deflated(self, name: &str, data: &[u8]) -> Self {
        let packed = deflate(data);
        self.entry(name, METHOD_DEFLATE, &packed, data.len() as u64, crc32fast::hash(data), false)
    }

    /// Stored entry whose sizes live only in a Zip64 extra field.
    pub(crate) fn zip64_stored(self, name: &str, data: &[u8]) -> Self {
        self.entry(name, METHOD_STORED, data, data.len() as u64, crc32fast::hash(data), true)
    }

    pub(crate) fn directory(self, name: &str) -> Self {
        let name = format!("{}/", name.trim_end_matches('/'));
        self.entry(&name, METHOD_STORED, &[], 0, 0, false)
    }

    pub(crate) fn with_method(self, name: &str, method: u16, payload: &[u8]) -> Self {
        self.entry(name, method, payload, payload.len() as u64, crc32fast::hash(payload), false)
    }

    /// Appends a standalone data descriptor record.
    pub(crate) fn data_descriptor(mut self, crc: u32, compressed: u32, uncompressed: u32) -> Self {
        self.body.extend_from_slice(&0x0807_4b50u32.to_le_bytes());
        self.body.extend_from_slice(&crc.to_le_bytes());
        self.body.extend_from_slice(&compressed.to_le_bytes());
        self.body.extend_from_slice(&uncompressed.to_le_bytes());
        self
    }

    /// Appends arbitrary bytes to the record stream.
    pub(crate) fn raw(mut self, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(bytes);
        self
    }

    fn entry(
        mut self,
        name: &str,
        method: u16,
        payload: &[u8],
        uncompressed_len: u64,
        crc: u32,
        zip64: bool,
    ) -> Self {
        let offset = self.body.len() as u32;
        let (compressed_field, uncompressed_field) = if zip64 {
            (u32::MAX, u32::MAX)
        } else {
            (payload.len() as u32, uncompressed_len as u32)
        };
        let mut extra = Vec::new();
        if zip64 {
            extra.extend_from_slice(&ZIP64_EXTRA_FIELD_TAG.to_le_bytes());
            extra.extend_from_slice(&16u16.to_le_bytes());
            extra.extend_from_slice(&uncompressed_len.to_le_bytes());
            extra.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        }

        let local = &mut self.body;
        local.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        local.extend_from_slice(&(if zip64 { 45u16 } else { 20u16 }).to_le_bytes());
        local.extend_from_slice(&0u16.to_le_bytes());
        local.extend_from_slice(&method.to_le_bytes());
        local.extend_from_slice(&0u16.to_le_bytes());
        local.extend_from_slice(&0u16.to_le_bytes());
        local.extend_from_slice(&crc.to_le_bytes());
        local.extend_from_slice(&compressed_field.to_le_bytes());
        local.extend_from_slice(&uncompressed_field.to_le_bytes());
        local.extend_from_slice(&(name.len() as u16).to_le_bytes());
        local.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        local.extend_from_slice(name.as_bytes());
        local.extend_from_slice(&extra);
        local.extend_from_slice(payload);

        let central = &mut self.central;
        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&compressed_field.to_le_bytes());
        central.extend_from_slice(&uncompressed_field.to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
        central.extend_from_slice(&extra);

        self.entries += 1;
        self
    }

    /// Finishes the container with its central directory and EOCD record.
    pub(crate) fn build(self) -> Vec<u8> {
        let mut out = self.body;
        let central_offset = out.len() as u32;
        out.extend_from_slice(&self.central);

        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.entries.to_le_bytes());
        out.extend_from_slice(&self.entries.to_le_bytes());
        out.extend_from_slice(&(self.central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}
