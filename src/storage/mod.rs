//! On-disk storage engine.
//!
//! One growable file holds everything: a fixed header, a bucket directory
//! for the key index, and a uniform array of fixed-size record slots shared
//! by nodes, edges and freelist tombstones.

/// File header codec and region geometry.
pub mod header;

/// Fixed-size record codecs for the three slot kinds.
pub mod record;

/// Paged random-access slot file with allocation and freelist discipline.
pub mod slotfile;

/// Hash-partitioned key index over per-bucket search trees.
pub mod keybst;

/// Per-node outgoing/incoming edge trees.
pub mod adjacency;

pub use header::{Header, DIR_ENTRY_SIZE, HEADER_SIZE};
pub use record::{EdgeRecord, Layout, NodeRecord, RecordKind, Tombstone};
pub use slotfile::SlotFile;
