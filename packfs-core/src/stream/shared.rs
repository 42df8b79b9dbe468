//! Reference-counted ownership of a container's backing stream.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};

/// A readable and seekable stream that can be moved across threads.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// The stream behind a [`SharedSource`].
pub(crate) enum Backing {
    Seekable(Box<dyn ReadSeek>),
    Forward(Box<dyn Read + Send>),
}

impl Backing {
    /// Current physical position, if the stream can report one.
    pub(crate) fn position(&mut self) -> Option<u64> {
        match self {
            Backing::Seekable(stream) => stream.stream_position().ok(),
            Backing::Forward(_) => None,
        }
    }

    /// Moves to `target` unless already there. No-op for forward-only streams.
    pub(crate) fn sync_to(&mut self, target: u64) -> io::Result<()> {
        if let Backing::Seekable(stream) = self {
            if stream.stream_position()? != target {
                stream.seek(SeekFrom::Start(target))?;
            }
        }
        Ok(())
    }
}

impl Read for Backing {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Backing::Seekable(stream) => stream.read(buf),
            Backing::Forward(stream) => stream.read(buf),
        }
    }
}

/// Shared handle to a stream that slices and decoders are cut from.
///
/// Cloning is cheap and every clone refers to the same stream. The stream
/// lives until the last handle (including those held inside a
/// [`StreamSlice`](super::StreamSlice)) is dropped.
#[derive(Clone)]
pub struct SharedSource {
    inner: Arc<Mutex<Backing>>,
    seekable: bool,
}

impl SharedSource {
    /// Creates a new shared source over a seekable stream.
    pub fn seekable<R>(stream: R) -> Self
    where
        R: Read + Seek + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Backing::Seekable(Box::new(stream)))),
            seekable: true,
        }
    }

    /// Creates a new shared source over a stream that can only be read forward.
    pub fn forward_only<R>(stream: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Backing::Forward(Box::new(stream)))),
            seekable: false,
        }
    }

    /// Opens a real file as a buffered seekable source.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::seekable(BufReader::new(file)))
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::seekable(Cursor::new(data.into()))
    }

    /// Returns true if the stream supports absolute positioning.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Returns the current physical position, if the stream can report one.
    pub fn position(&self) -> Option<u64> {
        self.inner.lock().position()
    }

    /// Total length of a seekable stream. The position is left unchanged.
    pub fn stream_len(&self) -> Option<u64> {
        match &mut *self.inner.lock() {
            Backing::Seekable(stream) => {
                let here = stream.stream_position().ok()?;
                let end = stream.seek(SeekFrom::End(0)).ok()?;
                stream.seek(SeekFrom::Start(here)).ok()?;
                Some(end)
            }
            Backing::Forward(_) => None,
        }
    }

    /// Seeks to an absolute position.
    pub fn seek(&self, pos: u64) -> io::Result<()> {
        match &mut *self.inner.lock() {
            Backing::Seekable(stream) => stream.seek(SeekFrom::Start(pos)).map(|_| ()),
            Backing::Forward(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream does not support seeking",
            )),
        }
    }

    /// Advances the stream by `count` bytes, seeking when possible.
    pub fn skip(&self, count: u64) -> io::Result<()> {
        let mut backing = self.inner.lock();
        match &mut *backing {
            Backing::Seekable(stream) => {
                let offset = i64::try_from(count).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "skip distance too large")
                })?;
                stream.seek(SeekFrom::Current(offset))?;
                Ok(())
            }
            Backing::Forward(stream) => {
                let skipped = io::copy(&mut stream.take(count), &mut io::sink())?;
                if skipped < count {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(())
            }
        }
    }

    /// Fills `buf` completely from the current position.
    pub fn read_exact(&self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.lock().read_exact(buf)
    }

    /// Reads until `buf` is full or the stream ends, returning the byte count.
    pub fn read_full(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut backing = self.inner.lock();
        let mut filled = 0;
        while filled < buf.len() {
            match backing.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Number of live handles, slices included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Backing> {
        self.inner.lock()
    }
}

impl fmt::Debug for SharedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSource")
            .field("seekable", &self.seekable)
            .field("handles", &self.handle_count())
            .finish()
    }
}
