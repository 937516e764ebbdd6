//! Embedded single-file on-disk directed graph store.
//!
//! Nodes are string-keyed; nodes and edges may carry fixed-layout user
//! attribute records declared at file creation. The whole graph lives in one
//! file of fixed-size slots: a hash-partitioned index of binary search trees
//! resolves keys to node slots, and every node roots two more trees over its
//! outgoing and incoming edges. Working-set memory is bounded by the OS page
//! cache plus a small slot LRU, not by graph size.

pub mod attrs;
pub mod error;
pub mod graph;
pub mod hash;
pub mod model;
pub mod storage;

pub use crate::attrs::FixedAttrs;
pub use crate::error::{GraphError, Result};
pub use crate::graph::{CheckReport, DepthStats, Edges, Graph, Neighbors, Nodes, Options, Predecessors};
pub use crate::model::{Edge, Node, NodeId, SlotId};
