//! Stream primitives: shared ownership, range slicing and bounded reads.

mod chunked;
mod shared;
mod slice;

pub use chunked::{read_chunked, read_part};
pub use shared::{ReadSeek, SharedSource};
pub use slice::StreamSlice;

/// A boxed stream handed to VFS callers.
pub type ReadStream = Box<dyn std::io::Read + Send>;
