//! Bounded whole-file and partial reads.
//!
//! Sizes declared by a container are never trusted for an allocation. Data is
//! staged through fixed-size chunks and coalesced only once the number of bytes
//! actually read is known.

use std::io::{self, Read};

use bytes::{Bytes, BytesMut};

/// Reads up to `limit` bytes from `reader` in chunks of `chunk_size`.
///
/// Stops early at end of stream; the result is never longer than the data
/// that was really there.
pub fn read_chunked<R: Read + ?Sized>(
    reader: &mut R,
    chunk_size: usize,
    limit: u64,
) -> io::Result<Bytes> {
    let chunk_size = chunk_size.max(1);
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut total: u64 = 0;

    while total < limit {
        let want = (limit - total).min(chunk_size as u64) as usize;
        let mut chunk = vec![0u8; want];
        let filled = fill(reader, &mut chunk)?;
        chunk.truncate(filled);
        total += filled as u64;
        if filled > 0 {
            chunks.push(chunk);
        }
        if filled < want {
            break;
        }
    }

    let mut out = BytesMut::with_capacity(total as usize);
    for chunk in &chunks {
        out.extend_from_slice(chunk);
    }
    Ok(out.freeze())
}

/// Discards `offset` bytes, then reads up to `length` bytes.
///
/// Works on any reader, decoders included. Returns fewer bytes when the
/// stream ends first and an empty buffer when `offset` is past the end.
pub fn read_part<R: Read + ?Sized>(
    reader: &mut R,
    offset: u64,
    length: u64,
    chunk_size: usize,
) -> io::Result<Bytes> {
    let skipped = io::copy(&mut (&mut *reader).take(offset), &mut io::sink())?;
    if skipped < offset {
        return Ok(Bytes::new());
    }
    read_chunked(reader, chunk_size, length)
}

/// Reads until `buf` is full or the stream ends.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
