//! Readable views over a byte range of a shared stream.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use super::shared::SharedSource;

/// A window `[start, start + len)` over a [`SharedSource`].
///
/// Every slice keeps its own logical cursor. Before each access the parent
/// is moved back to `start + cursor`, so any number of slices over one
/// seekable parent can interleave reads. Over a forward-only parent the slice
/// can still be read front to back but cannot seek.
///
/// The slice holds a handle to its parent, keeping the parent alive for as
/// long as the slice (or a decoder wrapping it) exists.
pub struct StreamSlice {
    source: SharedSource,
    start: u64,
    len: u64,
    cursor: u64,
    seekable: bool,
    peeked: Option<u8>,
}

impl StreamSlice {
    /// Creates a slice of `len` bytes beginning at the parent's current position.
    ///
    /// A parent that cannot report its position is treated as starting at zero.
    pub fn new(source: SharedSource, len: u64) -> Self {
        let start = source.position().unwrap_or(0);
        Self::with_start(source, start, len)
    }

    /// Creates a slice of `len` bytes beginning at `start` in the parent.
    pub fn at(source: SharedSource, start: u64, len: u64) -> Self {
        Self::with_start(source, start, len)
    }

    fn with_start(source: SharedSource, start: u64, len: u64) -> Self {
        let seekable = source.is_seekable();
        Self {
            source,
            start,
            len,
            cursor: 0,
            seekable,
            peeked: None,
        }
    }

    /// Length of the window in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the window inside the parent.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Logical position inside the window.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Bytes left between the cursor and the end of the window.
    pub fn bytes_remaining(&self) -> u64 {
        self.len - self.cursor
    }

    /// Returns true if the slice can seek.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Returns the next byte without consuming it, or `None` at the end.
    pub fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.peeked.is_some() {
            return Ok(self.peeked);
        }
        if self.cursor >= self.len {
            return Ok(None);
        }

        let mut byte = [0u8; 1];
        let read = {
            let mut backing = self.source.lock();
            backing.sync_to(self.start + self.cursor)?;
            backing.read(&mut byte)?
        };
        if read == 0 {
            return Ok(None);
        }
        self.peeked = Some(byte[0]);
        Ok(self.peeked)
    }
}

fn out_of_range(target: Option<u64>, len: u64) -> io::Error {
    let message = match target {
        Some(target) => format!("seek to {} outside slice of {} bytes", target, len),
        None => format!("seek outside slice of {} bytes", len),
    };
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

impl Read for StreamSlice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.cursor >= self.len {
            return Ok(0);
        }

        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            self.cursor += 1;
            return Ok(1);
        }

        let want = (buf.len() as u64).min(self.len - self.cursor) as usize;
        let read = {
            let mut backing = self.source.lock();
            backing.sync_to(self.start + self.cursor)?;
            backing.read(&mut buf[..want])?
        };
        self.cursor += read as u64;
        Ok(read)
    }
}

impl Seek for StreamSlice {
    /// Moves the logical cursor. Targets outside `[0, len]` fail and leave the
    /// cursor where it was.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.cursor.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
        };
        let target = match target {
            Some(target) if target <= self.len => target,
            other => return Err(out_of_range(other, self.len)),
        };

        if target != self.cursor {
            if !self.seekable {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "slice over a forward-only stream cannot seek",
                ));
            }
            self.cursor = target;
            self.peeked = None;
        }
        Ok(target)
    }
}

impl fmt::Debug for StreamSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSlice")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("cursor", &self.cursor)
            .field("seekable", &self.seekable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source() -> SharedSource {
        SharedSource::from_bytes(&b"aaaaaBBBBBccccc"[..])
    }

    #[test]
    fn test_slices_do_not_cross_contaminate() {
        let parent = source();
        let mut first = StreamSlice::at(parent.clone(), 0, 5);
        let mut second = StreamSlice::at(parent.clone(), 5, 5);

        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut byte = [0u8; 1];
        for _ in 0..5 {
            assert_eq!(first.read(&mut byte).unwrap(), 1);
            a.push(byte[0]);
            assert_eq!(second.read(&mut byte).unwrap(), 1);
            b.push(byte[0]);
        }

        assert_eq!(a, b"aaaaa");
        assert_eq!(b, b"BBBBB");
    }

    #[test]
    fn test_slice_starts_at_parent_position() {
        let parent = source();
        parent.seek(10).unwrap();
        let mut slice = StreamSlice::new(parent, 5);
        assert_eq!(slice.start(), 10);

        let mut out = String::new();
        slice.read_to_string(&mut out).unwrap();
        assert_eq!(out, "ccccc");
    }

    #[test]
    fn test_read_to_end_of_window() {
        let mut slice = StreamSlice::at(source(), 3, 4);
        let mut buf = [0u8; 4];
        slice.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"aaBB");
        assert_eq!(slice.bytes_remaining(), 0);
        assert_eq!(slice.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_bounds() {
        let mut slice = StreamSlice::at(source(), 5, 5);
        assert!(slice.seek(SeekFrom::Start(6)).is_err());
        assert!(slice.seek(SeekFrom::Current(-1)).is_err());
        assert!(slice.seek(SeekFrom::End(1)).is_err());
        assert_eq!(slice.position(), 0);

        assert_eq!(slice.seek(SeekFrom::End(0)).unwrap(), 5);
        assert_eq!(slice.seek(SeekFrom::End(-2)).unwrap(), 3);
        let mut buf = [0u8; 2];
        slice.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"BB");

        assert_eq!(slice.seek(SeekFrom::Current(-5)).unwrap(), 0);
        assert_eq!(slice.seek(SeekFrom::Start(5)).unwrap(), 5);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut slice = StreamSlice::at(source(), 4, 2);
        assert_eq!(slice.peek().unwrap(), Some(b'a'));
        assert_eq!(slice.peek().unwrap(), Some(b'a'));
        assert_eq!(slice.position(), 0);

        let mut buf = [0u8; 2];
        slice.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"aB");
        assert_eq!(slice.peek().unwrap(), None);
    }

    #[test]
    fn test_forward_only_parent() {
        let parent = SharedSource::forward_only(Cursor::new(b"xyz123".to_vec()));
        let mut slice = StreamSlice::new(parent, 3);
        assert!(!slice.is_seekable());
        assert_eq!(slice.start(), 0);

        assert_eq!(slice.peek().unwrap(), Some(b'x'));
        assert_eq!(slice.seek(SeekFrom::Current(0)).unwrap(), 0);
        let err = slice.seek(SeekFrom::Start(2)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let mut out = Vec::new();
        slice.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"xyz");
    }

    #[test]
    fn test_slice_keeps_parent_alive() {
        let parent = source();
        let mut slice = StreamSlice::at(parent.clone(), 10, 5);
        assert_eq!(parent.handle_count(), 2);
        drop(parent);

        let mut out = Vec::new();
        slice.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ccccc");
    }
}
