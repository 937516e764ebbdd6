//! Per-node adjacency trees.
//!
//! Every node roots two binary search trees over its incident edges: the
//! out-tree (edges it sources) and the in-tree (edges it receives). An edge
//! slot is a shared entry in exactly two trees, carrying an independent pair
//! of child pointers for each. Both trees order on the edge hash (with the
//! owner fixed, a function of the opposite endpoint's key-hash alone), with
//! ties broken by the opposite endpoint's full key.
//!
//! Removal relinks the in-order successor's slot into the removed edge's
//! structural position instead of copying fields between slots. A field copy
//! cannot work here: the successor also lives in its own other-direction
//! tree under its slot position, and moving its identity would orphan that
//! membership. Relinking touches only this tree's child pointers.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::error::{GraphError, Result};
use crate::model::SlotId;
use crate::storage::record::{EdgeRecord, NodeRecord};
use crate::storage::slotfile::SlotFile;

/// Which of a node's two trees an operation walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Out,
    In,
}

impl Dir {
    pub fn left(self, edge: &EdgeRecord) -> SlotId {
        match self {
            Dir::Out => edge.out_left,
            Dir::In => edge.in_left,
        }
    }

    pub fn right(self, edge: &EdgeRecord) -> SlotId {
        match self {
            Dir::Out => edge.out_right,
            Dir::In => edge.in_right,
        }
    }

    pub fn set_left(self, edge: &mut EdgeRecord, child: SlotId) {
        match self {
            Dir::Out => edge.out_left = child,
            Dir::In => edge.in_left = child,
        }
    }

    pub fn set_right(self, edge: &mut EdgeRecord, child: SlotId) {
        match self {
            Dir::Out => edge.out_right = child,
            Dir::In => edge.in_right = child,
        }
    }

    pub fn head(self, node: &NodeRecord) -> SlotId {
        match self {
            Dir::Out => node.out_head,
            Dir::In => node.in_head,
        }
    }

    pub fn set_head(self, node: &mut NodeRecord, head: SlotId) {
        match self {
            Dir::Out => node.out_head = head,
            Dir::In => node.in_head = head,
        }
    }

    /// The varying endpoint within this tree: targets in an out-tree,
    /// sources in an in-tree.
    pub fn endpoint(self, edge: &EdgeRecord) -> SlotId {
        match self {
            Dir::Out => edge.target,
            Dir::In => edge.source,
        }
    }

    /// The endpoint that must equal the tree owner.
    pub fn owner_endpoint(self, edge: &EdgeRecord) -> SlotId {
        match self {
            Dir::Out => edge.source,
            Dir::In => edge.target,
        }
    }
}

/// Search key for one edge within one tree: the edge hash plus the opposite
/// endpoint's slot and key for tie-breaking and identity.
#[derive(Debug, Clone)]
pub struct EdgeProbe {
    pub hash: u64,
    pub endpoint: SlotId,
    pub endpoint_key: String,
}

enum ParentLink {
    Head,
    Left(SlotId),
    Right(SlotId),
}

/// Hash first; equal hash and equal endpoint is the edge itself, otherwise
/// the opposite endpoint's key decides. The key read is deferred to the
/// collision path, which a 64-bit hash makes rare.
fn cmp_edge(sf: &mut SlotFile, probe: &EdgeProbe, edge: &EdgeRecord, dir: Dir) -> Result<Ordering> {
    match probe.hash.cmp(&edge.hash) {
        Ordering::Equal => {
            let endpoint = dir.endpoint(edge);
            if endpoint == probe.endpoint {
                return Ok(Ordering::Equal);
            }
            let other = sf.read_node(endpoint)?;
            match probe.endpoint_key.as_bytes().cmp(other.key.as_bytes()) {
                Ordering::Equal => Err(GraphError::Corruption(format!(
                    "distinct slots {} and {} share key {:?}",
                    probe.endpoint, endpoint, other.key
                ))),
                order => Ok(order),
            }
        }
        order => Ok(order),
    }
}

/// Locate the edge matching `probe` in `owner`'s `dir` tree.
pub fn find(sf: &mut SlotFile, owner: SlotId, dir: Dir, probe: &EdgeProbe) -> Result<Option<SlotId>> {
    let owner_rec = sf.read_node(owner)?;
    let mut cur = dir.head(&owner_rec);
    while cur != 0 {
        let edge = sf.read_edge(cur)?;
        match cmp_edge(sf, probe, &edge, dir)? {
            Ordering::Equal => return Ok(Some(cur)),
            Ordering::Less => cur = dir.left(&edge),
            Ordering::Greater => cur = dir.right(&edge),
        }
    }
    Ok(None)
}

/// Link an already-written edge slot into `owner`'s `dir` tree. Fails with
/// `AlreadyExists` when an edge with the probe's identity is present; the
/// caller then owns freeing the orphaned slot.
pub fn splice(
    sf: &mut SlotFile,
    owner: SlotId,
    dir: Dir,
    probe: &EdgeProbe,
    edge_slot: SlotId,
) -> Result<()> {
    let mut owner_rec = sf.read_node(owner)?;
    let mut link = ParentLink::Head;
    let mut cur = dir.head(&owner_rec);
    while cur != 0 {
        let edge = sf.read_edge(cur)?;
        match cmp_edge(sf, probe, &edge, dir)? {
            Ordering::Equal => return Err(GraphError::AlreadyExists("edge")),
            Ordering::Less => {
                link = ParentLink::Left(cur);
                cur = dir.left(&edge);
            }
            Ordering::Greater => {
                link = ParentLink::Right(cur);
                cur = dir.right(&edge);
            }
        }
    }

    match link {
        ParentLink::Head => {
            dir.set_head(&mut owner_rec, edge_slot);
            sf.write_node(&owner_rec)?;
        }
        ParentLink::Left(parent) => {
            let mut rec = sf.read_edge(parent)?;
            dir.set_left(&mut rec, edge_slot);
            sf.write_edge(parent, &rec)?;
        }
        ParentLink::Right(parent) => {
            let mut rec = sf.read_edge(parent)?;
            dir.set_right(&mut rec, edge_slot);
            sf.write_edge(parent, &rec)?;
        }
    }
    Ok(())
}

/// Unlink the edge matching `probe` from `owner`'s `dir` tree and return
/// its slot. The slot's pointers for this tree are zeroed; its record and
/// its other-direction membership are untouched.
pub fn unlink(sf: &mut SlotFile, owner: SlotId, dir: Dir, probe: &EdgeProbe) -> Result<SlotId> {
    let mut owner_rec = sf.read_node(owner)?;
    let mut link = ParentLink::Head;
    let mut cur = dir.head(&owner_rec);
    let edge = loop {
        if cur == 0 {
            return Err(GraphError::NotFound("edge"));
        }
        let edge = sf.read_edge(cur)?;
        match cmp_edge(sf, probe, &edge, dir)? {
            Ordering::Equal => break edge,
            Ordering::Less => {
                link = ParentLink::Left(cur);
                cur = dir.left(&edge);
            }
            Ordering::Greater => {
                link = ParentLink::Right(cur);
                cur = dir.right(&edge);
            }
        }
    };

    let left = dir.left(&edge);
    let right = dir.right(&edge);
    let replacement = if right == 0 {
        left
    } else if left == 0 {
        right
    } else {
        // Transplant the in-order successor's slot into this position.
        let mut succ_parent = 0;
        let mut succ_slot = right;
        let mut succ = sf.read_edge(succ_slot)?;
        while dir.left(&succ) != 0 {
            succ_parent = succ_slot;
            succ_slot = dir.left(&succ);
            succ = sf.read_edge(succ_slot)?;
        }

        if succ_parent != 0 {
            let mut rec = sf.read_edge(succ_parent)?;
            dir.set_left(&mut rec, dir.right(&succ));
            sf.write_edge(succ_parent, &rec)?;
            dir.set_right(&mut succ, right);
        }
        dir.set_left(&mut succ, left);
        sf.write_edge(succ_slot, &succ)?;
        succ_slot
    };

    match link {
        ParentLink::Head => {
            dir.set_head(&mut owner_rec, replacement);
            sf.write_node(&owner_rec)?;
        }
        ParentLink::Left(parent) => {
            let mut rec = sf.read_edge(parent)?;
            dir.set_left(&mut rec, replacement);
            sf.write_edge(parent, &rec)?;
        }
        ParentLink::Right(parent) => {
            let mut rec = sf.read_edge(parent)?;
            dir.set_right(&mut rec, replacement);
            sf.write_edge(parent, &rec)?;
        }
    }

    let mut detached = sf.read_edge(cur)?;
    dir.set_left(&mut detached, 0);
    dir.set_right(&mut detached, 0);
    sf.write_edge(cur, &detached)?;
    Ok(cur)
}

/// Collect every edge slot in `dir`'s tree below `head`, iteratively.
/// Insertion order can make these trees arbitrarily deep, so recursion is
/// off the table.
pub fn collect(sf: &mut SlotFile, head: SlotId, dir: Dir) -> Result<Vec<SlotId>> {
    let mut slots = Vec::new();
    let mut stack: SmallVec<[SlotId; 32]> = SmallVec::new();
    if head != 0 {
        stack.push(head);
    }
    while let Some(slot) = stack.pop() {
        let edge = sf.read_edge(slot)?;
        slots.push(slot);
        if dir.left(&edge) != 0 {
            stack.push(dir.left(&edge));
        }
        if dir.right(&edge) != 0 {
            stack.push(dir.right(&edge));
        }
    }
    Ok(slots)
}
