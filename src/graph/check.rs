//! Whole-file consistency check.
//!
//! Sweeps the slot region once, then re-derives every structural invariant
//! the engine maintains: header counters, key uniqueness and bucket
//! residency, child-pointer kinds, adjacency symmetry (every edge reachable
//! from both of its endpoints' trees) and freelist shape. Intended for
//! tests and offline verification of a file of unknown provenance.

use tracing::debug;

use crate::error::{GraphError, Result};
use crate::hash::edge_hash;
use crate::model::SlotId;
use crate::storage::adjacency::{self, Dir, EdgeProbe};
use crate::storage::keybst;
use crate::storage::record::{RecordKind, Tombstone};

use super::Graph;

/// Live-slot tallies from a successful [`Graph::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    pub nodes: u64,
    pub edges: u64,
    pub tombstones: u64,
}

/// Key-index shape summary from [`Graph::depth_stats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStats {
    pub nodes: u64,
    pub max_depth: u64,
    pub mean_depth: f64,
}

impl Graph {
    /// Verify the file's structural invariants, returning slot tallies.
    ///
    /// Any violation surfaces as [`GraphError::Corruption`]; the handle
    /// should be closed and the file considered damaged.
    pub fn check(&mut self) -> Result<CheckReport> {
        let tail = self.sf.header().tail;
        let mut node_slots: Vec<SlotId> = Vec::new();
        let mut edge_slots: Vec<SlotId> = Vec::new();
        let mut tombstones: u64 = 0;

        for slot in 1..tail {
            match self.sf.slot_kind(slot)? {
                RecordKind::Node => {
                    self.sf.read_node(slot)?;
                    node_slots.push(slot);
                }
                RecordKind::Edge => edge_slots.push(slot),
                RecordKind::Tombstone => tombstones += 1,
            }
        }

        let header = self.sf.header().clone();
        if header.node_count != node_slots.len() as u64 {
            return Err(GraphError::Corruption(format!(
                "header counts {} nodes, file holds {}",
                header.node_count,
                node_slots.len()
            )));
        }
        if header.edge_count != edge_slots.len() as u64 {
            return Err(GraphError::Corruption(format!(
                "header counts {} edges, file holds {}",
                header.edge_count,
                edge_slots.len()
            )));
        }

        self.check_freelist(tombstones)?;

        for &slot in &node_slots {
            let node = self.sf.read_node(slot)?;
            for child in [node.left, node.right] {
                if child != 0 && self.sf.slot_kind(child)? != RecordKind::Node {
                    return Err(GraphError::Corruption(format!(
                        "key-tree child {child} of node {slot} is not a node"
                    )));
                }
            }
            for head in [node.out_head, node.in_head] {
                if head != 0 && self.sf.slot_kind(head)? != RecordKind::Edge {
                    return Err(GraphError::Corruption(format!(
                        "adjacency head {head} of node {slot} is not an edge"
                    )));
                }
            }
            // resolves to itself: covers bucket residency and key uniqueness
            match keybst::lookup(&mut self.sf, &node.key)? {
                Some(found) if found == slot => {}
                other => {
                    return Err(GraphError::Corruption(format!(
                        "node {slot} key {:?} resolves to {other:?}",
                        node.key
                    )));
                }
            }

            // every entry in a node's tree must name it as the fixed endpoint
            for dir in [Dir::Out, Dir::In] {
                for edge_slot in adjacency::collect(&mut self.sf, dir.head(&node), dir)? {
                    let edge = self.sf.read_edge(edge_slot)?;
                    if dir.owner_endpoint(&edge) != slot {
                        return Err(GraphError::Corruption(format!(
                            "edge {edge_slot} sits in the {dir:?}-tree of node {slot} it does not touch"
                        )));
                    }
                }
            }
        }

        for &slot in &edge_slots {
            let edge = self.sf.read_edge(slot)?;
            let source = self.sf.read_node(edge.source)?;
            let target = self.sf.read_node(edge.target)?;
            if edge.hash != edge_hash(source.key_hash, target.key_hash) {
                return Err(GraphError::Corruption(format!(
                    "edge {slot} hash does not match its endpoints"
                )));
            }
            for child in [edge.out_left, edge.out_right, edge.in_left, edge.in_right] {
                if child != 0 && self.sf.slot_kind(child)? != RecordKind::Edge {
                    return Err(GraphError::Corruption(format!(
                        "adjacency child {child} of edge {slot} is not an edge"
                    )));
                }
            }

            let out_probe = EdgeProbe {
                hash: edge.hash,
                endpoint: edge.target,
                endpoint_key: target.key,
            };
            if adjacency::find(&mut self.sf, edge.source, Dir::Out, &out_probe)? != Some(slot) {
                return Err(GraphError::Corruption(format!(
                    "edge {slot} unreachable from its source out-tree"
                )));
            }
            let in_probe = EdgeProbe {
                hash: edge.hash,
                endpoint: edge.source,
                endpoint_key: source.key,
            };
            if adjacency::find(&mut self.sf, edge.target, Dir::In, &in_probe)? != Some(slot) {
                return Err(GraphError::Corruption(format!(
                    "edge {slot} unreachable from its target in-tree"
                )));
            }
        }

        let report = CheckReport {
            nodes: node_slots.len() as u64,
            edges: edge_slots.len() as u64,
            tombstones,
        };
        debug!(?report, "consistency check passed");
        Ok(report)
    }

    /// Key-index depth statistics across every bucket tree. The buckets are
    /// the balancing strategy, so expected depth tracks log₂(nodes per
    /// bucket); a blown-out maximum points at a degenerate key set.
    pub fn depth_stats(&mut self) -> Result<DepthStats> {
        let table_size = self.sf.header().table_size;
        let mut total_depth: u64 = 0;
        let mut max_depth: u64 = 0;
        let mut nodes: u64 = 0;
        let mut stack: Vec<(SlotId, u64)> = Vec::new();

        for bucket in 0..table_size {
            let root = self.sf.dir_get(bucket)?;
            if root != 0 {
                stack.push((root, 1));
            }
            while let Some((slot, depth)) = stack.pop() {
                let node = self.sf.read_node(slot)?;
                nodes += 1;
                total_depth += depth;
                max_depth = max_depth.max(depth);
                if node.left != 0 {
                    stack.push((node.left, depth + 1));
                }
                if node.right != 0 {
                    stack.push((node.right, depth + 1));
                }
            }
        }

        Ok(DepthStats {
            nodes,
            max_depth,
            mean_depth: if nodes == 0 {
                0.0
            } else {
                total_depth as f64 / nodes as f64
            },
        })
    }

    /// Every freed slot is pushed onto the freelist, so the chain must
    /// visit each tombstone exactly once and terminate at nil.
    fn check_freelist(&mut self, tombstones: u64) -> Result<()> {
        let mut visited: u64 = 0;
        let mut cur = self.sf.header().free_head;
        while cur != 0 {
            visited += 1;
            if visited > tombstones {
                return Err(GraphError::Corruption(
                    "freelist is longer than the tombstone population".into(),
                ));
            }
            let bytes = self.sf.read_slot(cur)?;
            let tombstone = Tombstone::decode(cur, &bytes)?;
            cur = tombstone.next_free;
        }
        if visited != tombstones {
            return Err(GraphError::Corruption(format!(
                "freelist reaches {visited} of {tombstones} tombstones"
            )));
        }
        Ok(())
    }
}
