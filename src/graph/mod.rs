//! Public graph handle.
//!
//! `Graph` composes the slot file, the hash-partitioned key index and the
//! per-node adjacency trees into the add/remove/query surface, and owns the
//! header counters those structures must agree with.

use std::path::Path;

use tracing::{debug, warn};

use crate::attrs::{fill_attr_region, FixedAttrs};
use crate::error::{GraphError, Result};
use crate::hash::{edge_hash, order_hash};
use crate::model::{Edge, Node, NodeId, SlotId};
use crate::storage::adjacency::{self, Dir, EdgeProbe};
use crate::storage::keybst;
use crate::storage::record::{EdgeRecord, Layout, NodeRecord};
use crate::storage::slotfile::{SlotFile, DEFAULT_CACHE_SLOTS};

mod check;
mod iter;

pub use check::{CheckReport, DepthStats};
pub use iter::{Edges, Neighbors, Nodes, Predecessors};

/// File-creation and runtime tuning parameters.
///
/// The layout fields (`max_key_len`, `table_size`, attribute sizes) are
/// captured in the header at creation and ignored when opening an existing
/// file; the cache fields apply to every open.
#[derive(Debug, Clone)]
pub struct Options {
    pub max_key_len: usize,
    pub table_size: u64,
    pub node_attr_size: usize,
    pub edge_attr_size: usize,
    pub cache_slots: usize,
    pub use_mmap: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_key_len: 32,
            table_size: 1024,
            node_attr_size: 0,
            edge_attr_size: 0,
            cache_slots: DEFAULT_CACHE_SLOTS,
            use_mmap: true,
        }
    }
}

impl Options {
    /// Size the bucket table for an expected node count, aiming at shallow
    /// per-bucket trees.
    pub fn for_expected_nodes(expected: u64) -> Self {
        Self {
            table_size: (expected / 64).max(16),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
pub struct Graph {
    pub(crate) sf: SlotFile,
}

impl Graph {
    /// Create a fresh graph file at `path`, truncating anything present.
    pub fn create(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let layout = Layout {
            max_key_len: options.max_key_len,
            node_attr_size: options.node_attr_size,
            edge_attr_size: options.edge_attr_size,
        };
        let sf = SlotFile::create(
            path.as_ref(),
            layout,
            options.table_size,
            options.cache_slots,
            options.use_mmap,
        )?;
        Ok(Self { sf })
    }

    /// Open an existing graph file for reading and writing. Layout
    /// parameters come from the header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, false, Options::default())
    }

    /// Open an existing graph file for reading only; every mutator fails
    /// with [`GraphError::ReadOnly`].
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, true, Options::default())
    }

    /// Open with explicit cache tuning. The layout fields of `options` are
    /// ignored; an existing file dictates its own geometry.
    pub fn open_with(path: impl AsRef<Path>, read_only: bool, options: Options) -> Result<Self> {
        let sf = SlotFile::open(
            path.as_ref(),
            read_only,
            options.cache_slots,
            options.use_mmap,
        )?;
        Ok(Self { sf })
    }

    pub fn node_count(&self) -> u64 {
        self.sf.header().node_count
    }

    pub fn edge_count(&self) -> u64 {
        self.sf.header().edge_count
    }

    pub fn max_key_len(&self) -> usize {
        self.sf.layout().max_key_len
    }

    /// Insert a node under `key`, returning its auto-assigned id.
    pub fn add_node(&mut self, key: &str, attrs: Option<&[u8]>) -> Result<NodeId> {
        self.ensure_writable()?;
        self.validate_key(key)?;
        self.validate_attr_len(attrs, self.sf.layout().node_attr_size, "node")?;

        let record = self.insert_node_record(key, attrs)?;
        debug!(key, id = record.id, slot = record.position, "added node");
        Ok(record.id)
    }

    /// Insert the edge `src -> dst`, creating either endpoint if absent.
    pub fn add_edge(&mut self, src: &str, dst: &str, attrs: Option<&[u8]>) -> Result<()> {
        self.add_edge_typed(src, dst, 0, attrs)
    }

    /// Insert an edge carrying a caller-defined type tag. The tag does not
    /// participate in edge identity: at most one edge may join a given
    /// ordered pair of nodes.
    pub fn add_edge_typed(
        &mut self,
        src: &str,
        dst: &str,
        ty: u32,
        attrs: Option<&[u8]>,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.validate_key(src)?;
        self.validate_key(dst)?;
        self.validate_attr_len(attrs, self.sf.layout().edge_attr_size, "edge")?;

        let src_rec = self.resolve_or_create(src)?;
        let dst_rec = if dst == src {
            src_rec.clone()
        } else {
            self.resolve_or_create(dst)?
        };
        let hash = edge_hash(src_rec.key_hash, dst_rec.key_hash);

        let slot = self.sf.allocate()?;
        let mut edge = EdgeRecord::new(src_rec.position, dst_rec.position, hash, ty);
        if let Some(bytes) = attrs {
            edge.attrs = bytes.to_vec();
        }
        self.sf.write_edge(slot, &edge)?;

        let out_probe = EdgeProbe {
            hash,
            endpoint: dst_rec.position,
            endpoint_key: dst_rec.key,
        };
        if let Err(err) = adjacency::splice(&mut self.sf, src_rec.position, Dir::Out, &out_probe, slot)
        {
            if matches!(err, GraphError::AlreadyExists(_)) {
                self.sf.free(slot)?;
            }
            return Err(err);
        }

        let in_probe = EdgeProbe {
            hash,
            endpoint: src_rec.position,
            endpoint_key: src_rec.key,
        };
        match adjacency::splice(&mut self.sf, dst_rec.position, Dir::In, &in_probe, slot) {
            Ok(()) => {}
            Err(GraphError::AlreadyExists(_)) => {
                // the out-tree accepted what the in-tree already holds
                return Err(GraphError::Corruption(format!(
                    "edge {src:?} -> {dst:?} present in only one adjacency tree"
                )));
            }
            Err(err) => return Err(err),
        }

        let header = self.sf.header_mut();
        header.edge_count += 1;
        self.sf.commit_header()?;
        debug!(src, dst, slot, "added edge");
        Ok(())
    }

    pub fn has_node(&mut self, key: &str) -> Result<bool> {
        Ok(keybst::lookup(&mut self.sf, key)?.is_some())
    }

    pub fn has_edge(&mut self, src: &str, dst: &str) -> Result<bool> {
        Ok(self.find_edge(src, dst)?.is_some())
    }

    pub fn get_node(&mut self, key: &str) -> Result<Node> {
        let slot = self.resolve(key)?;
        let record = self.sf.read_node(slot)?;
        Ok(Node {
            id: record.id,
            key: record.key,
            attrs: record.attrs,
        })
    }

    pub fn get_edge(&mut self, src: &str, dst: &str) -> Result<Edge> {
        let slot = self
            .find_edge(src, dst)?
            .ok_or(GraphError::NotFound("edge"))?;
        let record = self.sf.read_edge(slot)?;
        Ok(Edge {
            source: src.to_owned(),
            target: dst.to_owned(),
            ty: record.ty,
            attrs: record.attrs,
        })
    }

    /// Replace the node's user attribute record wholesale.
    pub fn set_node(&mut self, key: &str, attrs: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.resolve(key)?;
        let mut record = self.sf.read_node(slot)?;
        record.attrs = vec![0u8; self.sf.layout().node_attr_size];
        fill_attr_region(&mut record.attrs, Some(attrs))?;
        self.sf.write_node(&record)
    }

    /// Decode the node's attribute region through a caller-supplied codec.
    pub fn get_node_attrs<A: FixedAttrs>(&mut self, key: &str) -> Result<A> {
        self.validate_codec_size(A::SIZE, self.sf.layout().node_attr_size)?;
        let node = self.get_node(key)?;
        A::decode(&node.attrs[..A::SIZE])
    }

    /// Encode `attrs` into the node's attribute region, zeroing the rest.
    pub fn set_node_attrs<A: FixedAttrs>(&mut self, key: &str, attrs: &A) -> Result<()> {
        let declared = self.sf.layout().node_attr_size;
        self.validate_codec_size(A::SIZE, declared)?;
        let mut buf = vec![0u8; declared];
        attrs.encode(&mut buf[..A::SIZE]);
        self.set_node(key, &buf)
    }

    /// Decode the edge's attribute region through a caller-supplied codec.
    pub fn get_edge_attrs<A: FixedAttrs>(&mut self, src: &str, dst: &str) -> Result<A> {
        self.validate_codec_size(A::SIZE, self.sf.layout().edge_attr_size)?;
        let edge = self.get_edge(src, dst)?;
        A::decode(&edge.attrs[..A::SIZE])
    }

    /// Encode `attrs` into the edge's attribute region, zeroing the rest.
    pub fn set_edge_attrs<A: FixedAttrs>(&mut self, src: &str, dst: &str, attrs: &A) -> Result<()> {
        let declared = self.sf.layout().edge_attr_size;
        self.validate_codec_size(A::SIZE, declared)?;
        let mut buf = vec![0u8; declared];
        attrs.encode(&mut buf[..A::SIZE]);
        self.set_edge(src, dst, &buf)
    }

    /// Replace the edge's user attribute record wholesale.
    pub fn set_edge(&mut self, src: &str, dst: &str, attrs: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let slot = self
            .find_edge(src, dst)?
            .ok_or(GraphError::NotFound("edge"))?;
        let mut record = self.sf.read_edge(slot)?;
        record.attrs = vec![0u8; self.sf.layout().edge_attr_size];
        fill_attr_region(&mut record.attrs, Some(attrs))?;
        self.sf.write_edge(slot, &record)
    }

    /// Remove the edge `src -> dst` and free its slot.
    pub fn remove_edge(&mut self, src: &str, dst: &str) -> Result<()> {
        self.ensure_writable()?;
        let src_slot = keybst::lookup(&mut self.sf, src)?.ok_or(GraphError::NotFound("edge"))?;
        let dst_slot = keybst::lookup(&mut self.sf, dst)?.ok_or(GraphError::NotFound("edge"))?;
        let src_rec = self.sf.read_node(src_slot)?;
        let dst_rec = self.sf.read_node(dst_slot)?;
        let hash = edge_hash(src_rec.key_hash, dst_rec.key_hash);

        let out_probe = EdgeProbe {
            hash,
            endpoint: dst_slot,
            endpoint_key: dst_rec.key,
        };
        let slot = adjacency::unlink(&mut self.sf, src_slot, Dir::Out, &out_probe)?;

        let in_probe = EdgeProbe {
            hash,
            endpoint: src_slot,
            endpoint_key: src_rec.key,
        };
        let in_slot = match adjacency::unlink(&mut self.sf, dst_slot, Dir::In, &in_probe) {
            Ok(slot) => slot,
            Err(GraphError::NotFound(_)) => {
                return Err(GraphError::Corruption(format!(
                    "edge {src:?} -> {dst:?} present in only one adjacency tree"
                )));
            }
            Err(err) => return Err(err),
        };
        if slot != in_slot {
            return Err(GraphError::Corruption(format!(
                "edge {src:?} -> {dst:?} resolves to slot {slot} outgoing but {in_slot} incoming"
            )));
        }

        self.sf.free(slot)?;
        let header = self.sf.header_mut();
        header.edge_count -= 1;
        self.sf.commit_header()?;
        debug!(src, dst, slot, "removed edge");
        Ok(())
    }

    /// Remove `key` and every incident edge.
    pub fn remove_node(&mut self, key: &str) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.resolve(key)?;
        let node = self.sf.read_node(slot)?;

        // Outgoing first: unlink each edge from its target's in-tree. The
        // out-tree itself is not rewired edge by edge; the collected list is
        // the traversal and the whole tree dies with the node.
        let out_edges = adjacency::collect(&mut self.sf, node.out_head, Dir::Out)?;
        for edge_slot in out_edges {
            let edge = self.sf.read_edge(edge_slot)?;
            let probe = EdgeProbe {
                hash: edge.hash,
                endpoint: slot,
                endpoint_key: key.to_owned(),
            };
            let unlinked = adjacency::unlink(&mut self.sf, edge.target, Dir::In, &probe)?;
            if unlinked != edge_slot {
                return Err(GraphError::Corruption(format!(
                    "outgoing edge slot {edge_slot} found as {unlinked} in target in-tree"
                )));
            }
            self.sf.free(edge_slot)?;
            self.sf.header_mut().edge_count -= 1;
        }
        let mut node = self.sf.read_node(slot)?;
        node.out_head = 0;
        self.sf.write_node(&node)?;

        // Then incoming: self-loops are already gone from the in-tree, so
        // every remaining edge unlinks from some other node's out-tree.
        let in_edges = adjacency::collect(&mut self.sf, node.in_head, Dir::In)?;
        for edge_slot in in_edges {
            let edge = self.sf.read_edge(edge_slot)?;
            let probe = EdgeProbe {
                hash: edge.hash,
                endpoint: slot,
                endpoint_key: key.to_owned(),
            };
            let unlinked = adjacency::unlink(&mut self.sf, edge.source, Dir::Out, &probe)?;
            if unlinked != edge_slot {
                return Err(GraphError::Corruption(format!(
                    "incoming edge slot {edge_slot} found as {unlinked} in source out-tree"
                )));
            }
            self.sf.free(edge_slot)?;
            self.sf.header_mut().edge_count -= 1;
        }
        let mut node = self.sf.read_node(slot)?;
        node.in_head = 0;
        self.sf.write_node(&node)?;

        let vacated = keybst::remove(&mut self.sf, key)?;
        self.sf.free(vacated)?;
        let header = self.sf.header_mut();
        header.node_count -= 1;
        self.sf.commit_header()?;
        debug!(key, slot, "removed node");
        Ok(())
    }

    /// Out-degree of `key`.
    pub fn degree(&mut self, key: &str) -> Result<usize> {
        let slot = self.resolve(key)?;
        let node = self.sf.read_node(slot)?;
        Ok(adjacency::collect(&mut self.sf, node.out_head, Dir::Out)?.len())
    }

    /// In-degree of `key`.
    pub fn in_degree(&mut self, key: &str) -> Result<usize> {
        let slot = self.resolve(key)?;
        let node = self.sf.read_node(slot)?;
        Ok(adjacency::collect(&mut self.sf, node.in_head, Dir::In)?.len())
    }

    /// Iterate the keys of `key`'s successors, in edge-hash order.
    pub fn neighbors(&mut self, key: &str) -> Result<Neighbors<'_>> {
        let slot = self.resolve(key)?;
        let node = self.sf.read_node(slot)?;
        Ok(Neighbors::new(self, node.out_head))
    }

    /// Iterate the keys of `key`'s predecessors, in edge-hash order.
    pub fn predecessors(&mut self, key: &str) -> Result<Predecessors<'_>> {
        let slot = self.resolve(key)?;
        let node = self.sf.read_node(slot)?;
        Ok(Predecessors::new(self, node.in_head))
    }

    /// Iterate every node key, bucket by bucket.
    pub fn nodes(&mut self) -> Nodes<'_> {
        Nodes::new(self)
    }

    /// Iterate every live edge as a `(source_key, target_key)` pair, in
    /// slot order.
    pub fn edges(&mut self) -> Edges<'_> {
        Edges::new(self)
    }

    /// Push all buffered state to the operating system. Durability of prior
    /// mutations is only guaranteed after this returns.
    pub fn flush(&mut self) -> Result<()> {
        self.sf.flush()
    }

    /// Flush and release the handle.
    pub fn close(mut self) -> Result<()> {
        if !self.sf.is_read_only() {
            self.sf.flush()?;
        }
        debug!("closed graph");
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.sf.is_read_only() {
            return Err(GraphError::ReadOnly);
        }
        Ok(())
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        let max = self.sf.layout().max_key_len;
        if key.len() > max {
            return Err(GraphError::KeyTooLong {
                len: key.len(),
                max,
            });
        }
        if key.as_bytes().contains(&0) {
            return Err(GraphError::InvalidArgument(
                "key may not contain NUL bytes".into(),
            ));
        }
        Ok(())
    }

    fn validate_codec_size(&self, codec_size: usize, declared: usize) -> Result<()> {
        if codec_size > declared {
            return Err(GraphError::InvalidArgument(format!(
                "attribute codec of {codec_size} bytes exceeds declared size {declared}"
            )));
        }
        Ok(())
    }

    fn validate_attr_len(&self, attrs: Option<&[u8]>, declared: usize, kind: &str) -> Result<()> {
        if let Some(bytes) = attrs {
            if bytes.len() > declared {
                return Err(GraphError::InvalidArgument(format!(
                    "{kind} attribute buffer of {} bytes exceeds declared size {declared}",
                    bytes.len()
                )));
            }
        }
        Ok(())
    }

    fn resolve(&mut self, key: &str) -> Result<SlotId> {
        keybst::lookup(&mut self.sf, key)?.ok_or(GraphError::NotFound("node"))
    }

    fn resolve_or_create(&mut self, key: &str) -> Result<NodeRecord> {
        if let Some(slot) = keybst::lookup(&mut self.sf, key)? {
            return self.sf.read_node(slot);
        }
        self.insert_node_record(key, None)
    }

    fn insert_node_record(&mut self, key: &str, attrs: Option<&[u8]>) -> Result<NodeRecord> {
        let slot = self.sf.allocate()?;
        let id = self.sf.header().next_node_id;
        let mut record = NodeRecord::new(slot, id, key, order_hash(key));
        if let Some(bytes) = attrs {
            record.attrs = bytes.to_vec();
        }

        if let Err(err) = keybst::insert(&mut self.sf, &record) {
            if matches!(err, GraphError::AlreadyExists(_)) {
                self.sf.free(slot)?;
            }
            return Err(err);
        }

        let header = self.sf.header_mut();
        header.next_node_id += 1;
        header.node_count += 1;
        self.sf.commit_header()?;
        Ok(record)
    }

    fn find_edge(&mut self, src: &str, dst: &str) -> Result<Option<SlotId>> {
        let Some(src_slot) = keybst::lookup(&mut self.sf, src)? else {
            return Ok(None);
        };
        let Some(dst_slot) = keybst::lookup(&mut self.sf, dst)? else {
            return Ok(None);
        };
        let src_rec = self.sf.read_node(src_slot)?;
        let dst_rec = self.sf.read_node(dst_slot)?;
        let probe = EdgeProbe {
            hash: edge_hash(src_rec.key_hash, dst_rec.key_hash),
            endpoint: dst_slot,
            endpoint_key: dst_rec.key,
        };
        adjacency::find(&mut self.sf, src_slot, Dir::Out, &probe)
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        if !self.sf.is_read_only() {
            if let Err(err) = self.sf.flush() {
                warn!(error = %err, "flush on drop failed");
            }
        }
    }
}
