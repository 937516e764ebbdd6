//! Hash-partitioned key index.
//!
//! Keys are split into `table_size` buckets by the primary hash; each bucket
//! roots a binary search tree of node slots ordered by the secondary hash,
//! with byte-lexicographic key comparison breaking ties. The directory entry
//! is the tree root; the trees are not self-balancing, the bucket partition
//! is the balancing strategy.

use std::cmp::Ordering;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{GraphError, Result};
use crate::hash::{bucket_hash, order_hash};
use crate::model::SlotId;
use crate::storage::record::NodeRecord;
use crate::storage::slotfile::SlotFile;

/// Where a node hangs in its bucket tree.
enum ParentLink {
    /// Directly off the bucket directory entry.
    Root(u64),
    Left(SlotId),
    Right(SlotId),
}

/// Bucket and ordering hash for one key.
#[derive(Debug, Clone, Copy)]
pub struct KeyProbe {
    pub bucket: u64,
    pub hash: u64,
}

impl KeyProbe {
    pub fn new(key: &str, table_size: u64) -> Self {
        Self {
            bucket: bucket_hash(key) % table_size,
            hash: order_hash(key),
        }
    }
}

fn cmp_key(hash: u64, key: &str, node: &NodeRecord) -> Ordering {
    hash.cmp(&node.key_hash)
        .then_with(|| key.as_bytes().cmp(node.key.as_bytes()))
}

/// Resolve `key` to its node slot, if present.
pub fn lookup(sf: &mut SlotFile, key: &str) -> Result<Option<SlotId>> {
    let probe = KeyProbe::new(key, sf.header().table_size);
    let mut cur = sf.dir_get(probe.bucket)?;
    while cur != 0 {
        let node = sf.read_node(cur)?;
        match cmp_key(probe.hash, key, &node) {
            Ordering::Equal => return Ok(Some(cur)),
            Ordering::Less => cur = node.left,
            Ordering::Greater => cur = node.right,
        }
    }
    Ok(None)
}

/// Splice a fully-formed node record into its bucket tree. The record is
/// written before any pointer to it exists, keeping the file
/// forward-readable mid-operation.
pub fn insert(sf: &mut SlotFile, node: &NodeRecord) -> Result<()> {
    debug_assert_eq!(node.key_hash, order_hash(&node.key));
    let probe = KeyProbe::new(&node.key, sf.header().table_size);

    let mut link = ParentLink::Root(probe.bucket);
    let mut cur = sf.dir_get(probe.bucket)?;
    while cur != 0 {
        let existing = sf.read_node(cur)?;
        match cmp_key(probe.hash, &node.key, &existing) {
            Ordering::Equal => return Err(GraphError::AlreadyExists("node")),
            Ordering::Less => {
                link = ParentLink::Left(cur);
                cur = existing.left;
            }
            Ordering::Greater => {
                link = ParentLink::Right(cur);
                cur = existing.right;
            }
        }
    }

    sf.write_node(node)?;
    match link {
        ParentLink::Root(bucket) => sf.dir_set(bucket, node.position)?,
        ParentLink::Left(parent) => {
            let mut rec = sf.read_node(parent)?;
            rec.left = node.position;
            sf.write_node(&rec)?;
        }
        ParentLink::Right(parent) => {
            let mut rec = sf.read_node(parent)?;
            rec.right = node.position;
            sf.write_node(&rec)?;
        }
    }
    trace!(slot = node.position, bucket = probe.bucket, "inserted key");
    Ok(())
}

/// Unlink `key` from its bucket tree and return the slot the caller must
/// free.
///
/// Zero or one child: the parent (or the directory entry) adopts the child
/// and the node's own slot is returned. Two children: the in-order
/// successor's identity is copied into the node's slot, preserving the slot
/// position every incident edge addresses; the successor is
/// unlinked from the tree, the moved node's incident edges are repointed to
/// the surviving slot, and the successor's vacated slot is returned.
pub fn remove(sf: &mut SlotFile, key: &str) -> Result<SlotId> {
    let probe = KeyProbe::new(key, sf.header().table_size);

    let mut link = ParentLink::Root(probe.bucket);
    let mut cur = sf.dir_get(probe.bucket)?;
    let node = loop {
        if cur == 0 {
            return Err(GraphError::NotFound("node"));
        }
        let node = sf.read_node(cur)?;
        match cmp_key(probe.hash, key, &node) {
            Ordering::Equal => break node,
            Ordering::Less => {
                link = ParentLink::Left(cur);
                cur = node.left;
            }
            Ordering::Greater => {
                link = ParentLink::Right(cur);
                cur = node.right;
            }
        }
    };

    if node.left != 0 && node.right != 0 {
        // Leftmost of the right subtree; it has no left child.
        let mut succ_parent = 0;
        let mut succ_slot = node.right;
        let mut succ = sf.read_node(succ_slot)?;
        while succ.left != 0 {
            succ_parent = succ_slot;
            succ_slot = succ.left;
            succ = sf.read_node(succ_slot)?;
        }

        let moved = NodeRecord {
            id: succ.id,
            position: cur,
            left: node.left,
            right: if succ_parent == 0 { succ.right } else { node.right },
            key_hash: succ.key_hash,
            out_head: succ.out_head,
            in_head: succ.in_head,
            key: succ.key,
            attrs: succ.attrs,
        };
        sf.write_node(&moved)?;

        if succ_parent != 0 {
            let mut rec = sf.read_node(succ_parent)?;
            rec.left = succ.right;
            sf.write_node(&rec)?;
        }

        repoint_incident_edges(sf, &moved, succ_slot)?;
        trace!(kept = cur, vacated = succ_slot, "copy-up key removal");
        Ok(succ_slot)
    } else {
        let child = if node.left != 0 { node.left } else { node.right };
        match link {
            ParentLink::Root(bucket) => sf.dir_set(bucket, child)?,
            ParentLink::Left(parent) => {
                let mut rec = sf.read_node(parent)?;
                rec.left = child;
                sf.write_node(&rec)?;
            }
            ParentLink::Right(parent) => {
                let mut rec = sf.read_node(parent)?;
                rec.right = child;
                sf.write_node(&rec)?;
            }
        }
        Ok(cur)
    }
}

/// After copy-up the moved node's edges still address its old slot; every
/// edge in its out-tree gets `source` rewritten and every edge in its
/// in-tree gets `target` rewritten. The two trees together are exactly the
/// node's incident edges.
fn repoint_incident_edges(sf: &mut SlotFile, moved: &NodeRecord, old_slot: SlotId) -> Result<()> {
    let mut stack: SmallVec<[SlotId; 32]> = SmallVec::new();
    if moved.out_head != 0 {
        stack.push(moved.out_head);
    }
    while let Some(slot) = stack.pop() {
        let mut edge = sf.read_edge(slot)?;
        if edge.source != old_slot {
            return Err(GraphError::Corruption(format!(
                "edge at slot {slot} in out-tree of {old_slot} has source {}",
                edge.source
            )));
        }
        edge.source = moved.position;
        if edge.target == old_slot {
            edge.target = moved.position;
        }
        sf.write_edge(slot, &edge)?;
        if edge.out_left != 0 {
            stack.push(edge.out_left);
        }
        if edge.out_right != 0 {
            stack.push(edge.out_right);
        }
    }

    if moved.in_head != 0 {
        stack.push(moved.in_head);
    }
    while let Some(slot) = stack.pop() {
        let mut edge = sf.read_edge(slot)?;
        if edge.target != old_slot && edge.target != moved.position {
            return Err(GraphError::Corruption(format!(
                "edge at slot {slot} in in-tree of {old_slot} has target {}",
                edge.target
            )));
        }
        edge.target = moved.position;
        sf.write_edge(slot, &edge)?;
        if edge.in_left != 0 {
            stack.push(edge.in_left);
        }
        if edge.in_right != 0 {
            stack.push(edge.in_right);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::Layout;
    use tempfile::NamedTempFile;

    fn fixture(table_size: u64) -> (NamedTempFile, SlotFile) {
        let tmp = NamedTempFile::new().expect("temp file");
        let layout = Layout {
            max_key_len: 24,
            node_attr_size: 0,
            edge_attr_size: 0,
        };
        let sf = SlotFile::create(tmp.path(), layout, table_size, 256, false).expect("create");
        (tmp, sf)
    }

    fn put(sf: &mut SlotFile, key: &str) -> SlotId {
        let slot = sf.allocate().expect("allocate");
        let node = NodeRecord::new(slot, slot, key, order_hash(key));
        insert(sf, &node).expect("insert");
        slot
    }

    #[test]
    fn lookup_finds_inserted_keys() {
        let (_tmp, mut sf) = fixture(4);
        let keys = ["alpha", "beta", "gamma", "delta", "epsilon"];
        let slots: Vec<SlotId> = keys.iter().map(|k| put(&mut sf, k)).collect();

        for (key, slot) in keys.iter().zip(&slots) {
            assert_eq!(lookup(&mut sf, key).expect("lookup"), Some(*slot));
        }
        assert_eq!(lookup(&mut sf, "zeta").expect("lookup"), None);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (_tmp, mut sf) = fixture(4);
        put(&mut sf, "dup");
        let slot = sf.allocate().expect("allocate");
        let clone = NodeRecord::new(slot, slot, "dup", order_hash("dup"));
        assert!(matches!(
            insert(&mut sf, &clone),
            Err(GraphError::AlreadyExists(_))
        ));
    }

    #[test]
    fn removal_in_any_order_keeps_remaining_keys_reachable() {
        // One bucket forces a single deep tree, exercising the leaf,
        // one-child and copy-up deletion paths as keys drain out.
        let (_tmp, mut sf) = fixture(1);
        let keys: Vec<String> = (0..12).map(|i| format!("key-{i:02}")).collect();
        for key in &keys {
            put(&mut sf, key);
        }

        for (removed_at, key) in keys.iter().enumerate() {
            let vacated = remove(&mut sf, key).expect("remove");
            sf.free(vacated).expect("free");
            assert_eq!(lookup(&mut sf, key).expect("lookup"), None);
            for survivor in &keys[removed_at + 1..] {
                assert!(
                    lookup(&mut sf, survivor).expect("lookup").is_some(),
                    "{survivor} unreachable after removing {key}"
                );
            }
        }
        assert_eq!(sf.dir_get(0).expect("root"), 0);
    }

    #[test]
    fn remove_missing_key_is_not_found() {
        let (_tmp, mut sf) = fixture(4);
        put(&mut sf, "present");
        assert!(matches!(
            remove(&mut sf, "absent"),
            Err(GraphError::NotFound(_))
        ));
    }
}
