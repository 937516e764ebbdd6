//! Fixed-size record codecs.
//!
//! Every slot in the file holds one of three record kinds behind a one-byte
//! discriminator. All records are encoded at fixed offsets and padded to the
//! file's uniform record size, so a freed slot can be recycled as any kind.

use std::convert::TryInto;

use crate::error::{GraphError, Result};
use crate::model::SlotId;

/// Fixed prefix of a node record before the key field.
pub const NODE_PREFIX_SIZE: usize = 64;
/// Fixed prefix of an edge record before the attribute field.
pub const EDGE_PREFIX_SIZE: usize = 72;
/// Full size of a tombstone record.
pub const TOMBSTONE_SIZE: usize = 16;

#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecordKind {
    Tombstone = 0x00,
    Node = 0x01,
    Edge = 0x02,
}

impl RecordKind {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(Self::Tombstone),
            0x01 => Ok(Self::Node),
            0x02 => Ok(Self::Edge),
            other => Err(GraphError::Corruption(format!(
                "unknown record kind: 0x{other:02X}"
            ))),
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Per-file record geometry, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub max_key_len: usize,
    pub node_attr_size: usize,
    pub edge_attr_size: usize,
}

impl Layout {
    pub fn node_size(&self) -> usize {
        NODE_PREFIX_SIZE + self.max_key_len + self.node_attr_size
    }

    pub fn edge_size(&self) -> usize {
        EDGE_PREFIX_SIZE + self.edge_attr_size
    }

    /// Uniform slot size: the widest of the three kinds.
    pub fn record_size(&self) -> usize {
        self.node_size().max(self.edge_size()).max(TOMBSTONE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: u64,
    /// The slot's own position, validated on every read.
    pub position: SlotId,
    pub left: SlotId,
    pub right: SlotId,
    pub key_hash: u64,
    pub out_head: SlotId,
    pub in_head: SlotId,
    pub key: String,
    pub attrs: Vec<u8>,
}

impl NodeRecord {
    pub fn new(position: SlotId, id: u64, key: &str, key_hash: u64) -> Self {
        Self {
            id,
            position,
            left: 0,
            right: 0,
            key_hash,
            out_head: 0,
            in_head: 0,
            key: key.to_owned(),
            attrs: Vec::new(),
        }
    }

    pub fn encode(&self, layout: &Layout, buf: &mut [u8]) -> Result<()> {
        debug_assert!(buf.len() >= layout.node_size());
        buf.fill(0);
        buf[0] = RecordKind::Node.to_byte();
        buf[8..16].copy_from_slice(&self.id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.position.to_le_bytes());
        buf[24..32].copy_from_slice(&self.left.to_le_bytes());
        buf[32..40].copy_from_slice(&self.right.to_le_bytes());
        buf[40..48].copy_from_slice(&self.key_hash.to_le_bytes());
        buf[48..56].copy_from_slice(&self.out_head.to_le_bytes());
        buf[56..64].copy_from_slice(&self.in_head.to_le_bytes());

        let key_bytes = self.key.as_bytes();
        if key_bytes.len() > layout.max_key_len {
            return Err(GraphError::KeyTooLong {
                len: key_bytes.len(),
                max: layout.max_key_len,
            });
        }
        let key_region = &mut buf[NODE_PREFIX_SIZE..NODE_PREFIX_SIZE + layout.max_key_len];
        key_region[..key_bytes.len()].copy_from_slice(key_bytes);

        let attr_base = NODE_PREFIX_SIZE + layout.max_key_len;
        if self.attrs.len() > layout.node_attr_size {
            return Err(GraphError::InvalidArgument(
                "node attribute buffer exceeds declared size".into(),
            ));
        }
        buf[attr_base..attr_base + self.attrs.len()].copy_from_slice(&self.attrs);
        Ok(())
    }

    pub fn decode(layout: &Layout, slot: SlotId, buf: &[u8]) -> Result<Self> {
        if buf.len() < layout.node_size() {
            return Err(GraphError::Corruption("node record truncated".into()));
        }
        if buf[0] != RecordKind::Node.to_byte() {
            return Err(GraphError::Corruption(format!(
                "slot {slot} does not hold a node record"
            )));
        }

        let position = u64::from_le_bytes(buf[16..24].try_into().expect("slice is 8 bytes"));
        if position != slot {
            return Err(GraphError::Corruption(format!(
                "node at slot {slot} records position {position}"
            )));
        }

        let key_region = &buf[NODE_PREFIX_SIZE..NODE_PREFIX_SIZE + layout.max_key_len];
        let key_len = key_region
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(layout.max_key_len);
        let key = std::str::from_utf8(&key_region[..key_len])
            .map_err(|_| GraphError::Corruption(format!("slot {slot} key is not UTF-8")))?
            .to_owned();

        let attr_base = NODE_PREFIX_SIZE + layout.max_key_len;
        Ok(Self {
            id: u64::from_le_bytes(buf[8..16].try_into().expect("slice is 8 bytes")),
            position,
            left: u64::from_le_bytes(buf[24..32].try_into().expect("slice is 8 bytes")),
            right: u64::from_le_bytes(buf[32..40].try_into().expect("slice is 8 bytes")),
            key_hash: u64::from_le_bytes(buf[40..48].try_into().expect("slice is 8 bytes")),
            out_head: u64::from_le_bytes(buf[48..56].try_into().expect("slice is 8 bytes")),
            in_head: u64::from_le_bytes(buf[56..64].try_into().expect("slice is 8 bytes")),
            key,
            attrs: buf[attr_base..attr_base + layout.node_attr_size].to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub source: SlotId,
    pub target: SlotId,
    pub hash: u64,
    pub out_left: SlotId,
    pub out_right: SlotId,
    pub in_left: SlotId,
    pub in_right: SlotId,
    pub ty: u32,
    pub attrs: Vec<u8>,
}

impl EdgeRecord {
    pub fn new(source: SlotId, target: SlotId, hash: u64, ty: u32) -> Self {
        Self {
            source,
            target,
            hash,
            out_left: 0,
            out_right: 0,
            in_left: 0,
            in_right: 0,
            ty,
            attrs: Vec::new(),
        }
    }

    pub fn encode(&self, layout: &Layout, buf: &mut [u8]) -> Result<()> {
        debug_assert!(buf.len() >= layout.edge_size());
        buf.fill(0);
        buf[0] = RecordKind::Edge.to_byte();
        buf[8..16].copy_from_slice(&self.source.to_le_bytes());
        buf[16..24].copy_from_slice(&self.target.to_le_bytes());
        buf[24..32].copy_from_slice(&self.hash.to_le_bytes());
        buf[32..40].copy_from_slice(&self.out_left.to_le_bytes());
        buf[40..48].copy_from_slice(&self.out_right.to_le_bytes());
        buf[48..56].copy_from_slice(&self.in_left.to_le_bytes());
        buf[56..64].copy_from_slice(&self.in_right.to_le_bytes());
        buf[64..68].copy_from_slice(&self.ty.to_le_bytes());

        if self.attrs.len() > layout.edge_attr_size {
            return Err(GraphError::InvalidArgument(
                "edge attribute buffer exceeds declared size".into(),
            ));
        }
        buf[EDGE_PREFIX_SIZE..EDGE_PREFIX_SIZE + self.attrs.len()].copy_from_slice(&self.attrs);
        Ok(())
    }

    pub fn decode(layout: &Layout, slot: SlotId, buf: &[u8]) -> Result<Self> {
        if buf.len() < layout.edge_size() {
            return Err(GraphError::Corruption("edge record truncated".into()));
        }
        if buf[0] != RecordKind::Edge.to_byte() {
            return Err(GraphError::Corruption(format!(
                "slot {slot} does not hold an edge record"
            )));
        }

        Ok(Self {
            source: u64::from_le_bytes(buf[8..16].try_into().expect("slice is 8 bytes")),
            target: u64::from_le_bytes(buf[16..24].try_into().expect("slice is 8 bytes")),
            hash: u64::from_le_bytes(buf[24..32].try_into().expect("slice is 8 bytes")),
            out_left: u64::from_le_bytes(buf[32..40].try_into().expect("slice is 8 bytes")),
            out_right: u64::from_le_bytes(buf[40..48].try_into().expect("slice is 8 bytes")),
            in_left: u64::from_le_bytes(buf[48..56].try_into().expect("slice is 8 bytes")),
            in_right: u64::from_le_bytes(buf[56..64].try_into().expect("slice is 8 bytes")),
            ty: u32::from_le_bytes(buf[64..68].try_into().expect("slice is 4 bytes")),
            attrs: buf[EDGE_PREFIX_SIZE..EDGE_PREFIX_SIZE + layout.edge_attr_size].to_vec(),
        })
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tombstone {
    pub next_free: SlotId,
}

impl Tombstone {
    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= TOMBSTONE_SIZE);
        buf.fill(0);
        buf[0] = RecordKind::Tombstone.to_byte();
        buf[8..16].copy_from_slice(&self.next_free.to_le_bytes());
    }

    pub fn decode(slot: SlotId, buf: &[u8]) -> Result<Self> {
        if buf.len() < TOMBSTONE_SIZE {
            return Err(GraphError::Corruption("tombstone record truncated".into()));
        }
        if buf[0] != RecordKind::Tombstone.to_byte() {
            return Err(GraphError::Corruption(format!(
                "slot {slot} does not hold a tombstone"
            )));
        }
        Ok(Self {
            next_free: u64::from_le_bytes(buf[8..16].try_into().expect("slice is 8 bytes")),
        })
    }
}
