use std::convert::TryInto;

use crate::error::{GraphError, Result};
use crate::model::SlotId;

const MAGIC: &[u8; 8] = b"HIMOGRF\0";
const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;
const ENDIAN_LITTLE: u8 = 0x01;

/// Size of the fixed header region at the start of the file. The bucket
/// directory follows immediately after.
pub const HEADER_SIZE: usize = 96;

/// Size of one bucket directory entry.
pub const DIR_ENTRY_SIZE: usize = 8;

/// Singleton file metadata, cached in memory and rewritten on every
/// structural mutation. Durable only after a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub node_count: u64,
    pub edge_count: u64,
    pub next_node_id: u64,
    /// Next unallocated slot index (1-based; slot 0 denotes nil).
    pub tail: SlotId,
    /// Head of the tombstone freelist, 0 when empty.
    pub free_head: SlotId,
    pub table_size: u64,
    pub max_key_len: u32,
    pub record_size: u32,
    pub node_attr_size: u32,
    pub edge_attr_size: u32,
}

impl Header {
    pub fn new(
        table_size: u64,
        max_key_len: u32,
        record_size: u32,
        node_attr_size: u32,
        edge_attr_size: u32,
    ) -> Self {
        Self {
            node_count: 0,
            edge_count: 0,
            next_node_id: 1,
            tail: 1,
            free_head: 0,
            table_size,
            max_key_len,
            record_size,
            node_attr_size,
            edge_attr_size,
        }
    }

    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(GraphError::Corruption(
                "header region shorter than expected".into(),
            ));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(GraphError::Corruption("invalid header magic".into()));
        }

        let major = u16::from_le_bytes([data[8], data[9]]);
        let minor = u16::from_le_bytes([data[10], data[11]]);
        if major != VERSION_MAJOR || minor != VERSION_MINOR {
            return Err(GraphError::Corruption(format!(
                "unsupported format version {major}.{minor}"
            )));
        }
        if data[12] != ENDIAN_LITTLE {
            return Err(GraphError::Corruption(format!(
                "unsupported endianness tag 0x{:02X}",
                data[12]
            )));
        }

        let header = Self {
            node_count: u64::from_le_bytes(data[16..24].try_into().expect("slice is 8 bytes")),
            edge_count: u64::from_le_bytes(data[24..32].try_into().expect("slice is 8 bytes")),
            next_node_id: u64::from_le_bytes(data[32..40].try_into().expect("slice is 8 bytes")),
            tail: u64::from_le_bytes(data[40..48].try_into().expect("slice is 8 bytes")),
            free_head: u64::from_le_bytes(data[48..56].try_into().expect("slice is 8 bytes")),
            table_size: u64::from_le_bytes(data[56..64].try_into().expect("slice is 8 bytes")),
            max_key_len: u32::from_le_bytes(data[64..68].try_into().expect("slice is 4 bytes")),
            record_size: u32::from_le_bytes(data[68..72].try_into().expect("slice is 4 bytes")),
            node_attr_size: u32::from_le_bytes(data[72..76].try_into().expect("slice is 4 bytes")),
            edge_attr_size: u32::from_le_bytes(data[76..80].try_into().expect("slice is 4 bytes")),
        };

        if header.table_size == 0 {
            return Err(GraphError::Corruption("header table size is zero".into()));
        }
        if header.tail == 0 {
            return Err(GraphError::Corruption("header tail is zero".into()));
        }

        Ok(header)
    }

    pub fn write(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < HEADER_SIZE {
            return Err(GraphError::Corruption(
                "header region shorter than expected".into(),
            ));
        }

        data[..HEADER_SIZE].fill(0);
        data[..MAGIC.len()].copy_from_slice(MAGIC);
        data[8..10].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
        data[10..12].copy_from_slice(&VERSION_MINOR.to_le_bytes());
        data[12] = ENDIAN_LITTLE;
        data[16..24].copy_from_slice(&self.node_count.to_le_bytes());
        data[24..32].copy_from_slice(&self.edge_count.to_le_bytes());
        data[32..40].copy_from_slice(&self.next_node_id.to_le_bytes());
        data[40..48].copy_from_slice(&self.tail.to_le_bytes());
        data[48..56].copy_from_slice(&self.free_head.to_le_bytes());
        data[56..64].copy_from_slice(&self.table_size.to_le_bytes());
        data[64..68].copy_from_slice(&self.max_key_len.to_le_bytes());
        data[68..72].copy_from_slice(&self.record_size.to_le_bytes());
        data[72..76].copy_from_slice(&self.node_attr_size.to_le_bytes());
        data[76..80].copy_from_slice(&self.edge_attr_size.to_le_bytes());
        Ok(())
    }

    /// Byte offset where the slot region begins.
    pub fn slots_base(&self) -> u64 {
        HEADER_SIZE as u64 + self.table_size * DIR_ENTRY_SIZE as u64
    }
}
