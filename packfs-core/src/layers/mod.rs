//! Resolution layers, in lookup precedence order.

pub mod disk;
pub mod overlay;
pub mod trie;
pub mod legacy;

pub use disk::DiskLayer;
pub use overlay::{OverlayMapping, OverlayRegistry};
pub use trie::{MountNode, MountTrie, MountedFile};
pub use legacy::LegacySearchList;
