//! Paged random-access slot file.
//!
//! One growable file holds the header, the bucket directory and a uniform
//! array of fixed-size record slots. Reads go through a small LRU cache and
//! an optional memory map; writes go straight to the file and refresh the
//! cache. The map is dropped on any write and lazily re-established, so the
//! read path never observes stale bytes.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use memmap2::Mmap;
use tracing::{debug, trace};

use crate::error::{GraphError, Result};
use crate::model::SlotId;
use crate::storage::header::{Header, DIR_ENTRY_SIZE, HEADER_SIZE};
use crate::storage::record::{EdgeRecord, Layout, NodeRecord, RecordKind, Tombstone};

pub const PAGE_SIZE: u64 = 8192;
pub const DEFAULT_CACHE_SLOTS: usize = 4096;

#[derive(Debug)]
pub struct SlotFile {
    file: File,
    header: Header,
    layout: Layout,
    record_size: usize,
    cache: LruCache<SlotId, Vec<u8>>,
    file_len: u64,
    mmap: Option<Mmap>,
    use_mmap: bool,
    read_only: bool,
}

impl SlotFile {
    /// Truncate `path` and lay down a fresh header and zeroed bucket
    /// directory.
    pub fn create(
        path: &Path,
        layout: Layout,
        table_size: u64,
        cache_slots: usize,
        use_mmap: bool,
    ) -> Result<Self> {
        if table_size == 0 {
            return Err(GraphError::InvalidArgument("table size must be nonzero".into()));
        }
        if layout.max_key_len == 0 {
            return Err(GraphError::InvalidArgument(
                "maximum key length must be nonzero".into(),
            ));
        }
        let record_size = layout.record_size();
        let record_size_u32 = u32::try_from(record_size)
            .map_err(|_| GraphError::InvalidArgument("record size exceeds u32::MAX".into()))?;

        let header = Header::new(
            table_size,
            layout.max_key_len as u32,
            record_size_u32,
            layout.node_attr_size as u32,
            layout.edge_attr_size as u32,
        );

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut region = vec![0u8; HEADER_SIZE];
        header.write(&mut region)?;
        file.write_all(&region)?;

        let initial_len = page_align(header.slots_base());
        file.set_len(initial_len)?;

        debug!(
            path = %path.display(),
            table_size,
            record_size,
            "created slot file"
        );

        Ok(Self {
            file,
            header,
            layout,
            record_size,
            cache: new_cache(cache_slots),
            file_len: initial_len,
            mmap: None,
            use_mmap,
            read_only: false,
        })
    }

    /// Open an existing file; geometry comes from the header and is never
    /// overridden by the caller.
    pub fn open(path: &Path, read_only: bool, cache_slots: usize, use_mmap: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;

        let mut region = vec![0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut region).map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                GraphError::Corruption("file shorter than header region".into())
            } else {
                GraphError::Io(err)
            }
        })?;
        let header = Header::read(&region)?;

        let layout = Layout {
            max_key_len: header.max_key_len as usize,
            node_attr_size: header.node_attr_size as usize,
            edge_attr_size: header.edge_attr_size as usize,
        };
        if layout.record_size() != header.record_size as usize {
            return Err(GraphError::Corruption(format!(
                "header record size {} does not match layout {}",
                header.record_size,
                layout.record_size()
            )));
        }

        let file_len = file.metadata()?.len();
        let record_size = header.record_size as usize;

        debug!(path = %path.display(), read_only, file_len, "opened slot file");

        Ok(Self {
            file,
            header,
            layout,
            record_size,
            cache: new_cache(cache_slots),
            file_len,
            mmap: None,
            use_mmap,
            read_only,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Rewrite the cached header region. Callers do this after every
    /// structural mutation; durability still waits for [`Self::flush`].
    pub fn commit_header(&mut self) -> Result<()> {
        let mut region = vec![0u8; HEADER_SIZE];
        self.header.write(&mut region)?;
        self.write_at(0, &region)
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.commit_header()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Reserve a slot: pop the freelist head, else take the tail position,
    /// growing the file by page-aligned extension when the new slot crosses
    /// the current length. The caller must write a record before linking the
    /// slot anywhere.
    pub fn allocate(&mut self) -> Result<SlotId> {
        if self.header.free_head != 0 {
            let slot = self.header.free_head;
            let bytes = self.read_slot_raw(slot)?;
            let tombstone = Tombstone::decode(slot, &bytes)?;
            self.header.free_head = tombstone.next_free;
            self.commit_header()?;
            trace!(slot, "allocated recycled slot");
            return Ok(slot);
        }

        let slot = self.header.tail;
        self.header.tail = slot
            .checked_add(1)
            .ok_or_else(|| GraphError::Corruption("slot tail overflow".into()))?;

        let end = self
            .slot_offset(slot)?
            .checked_add(self.record_size as u64)
            .ok_or_else(|| GraphError::InvalidArgument("slot offset overflow".into()))?;
        if end > self.file_len {
            let new_len = page_align(end);
            self.file.set_len(new_len)?;
            self.file_len = new_len;
            self.invalidate_mmap();
        }
        self.commit_header()?;
        trace!(slot, "allocated tail slot");
        Ok(slot)
    }

    /// Overwrite `slot` with a tombstone and push it onto the freelist.
    pub fn free(&mut self, slot: SlotId) -> Result<()> {
        let tombstone = Tombstone {
            next_free: self.header.free_head,
        };
        let mut bytes = vec![0u8; self.record_size];
        tombstone.encode(&mut bytes);
        self.write_slot(slot, &bytes)?;
        self.header.free_head = slot;
        self.commit_header()?;
        trace!(slot, "freed slot");
        Ok(())
    }

    pub fn read_slot(&mut self, slot: SlotId) -> Result<Vec<u8>> {
        if slot == 0 || slot >= self.header.tail {
            return Err(GraphError::Corruption(format!(
                "slot index {slot} out of bounds (tail {})",
                self.header.tail
            )));
        }
        self.read_slot_raw(slot)
    }

    pub fn write_slot(&mut self, slot: SlotId, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.record_size {
            return Err(GraphError::InvalidArgument(
                "record buffer does not match record size".into(),
            ));
        }
        if slot == 0 || slot >= self.header.tail {
            return Err(GraphError::Corruption(format!(
                "slot index {slot} out of bounds (tail {})",
                self.header.tail
            )));
        }
        let offset = self.slot_offset(slot)?;
        self.write_at(offset, bytes)?;
        self.cache.put(slot, bytes.to_vec());
        Ok(())
    }

    pub fn dir_get(&mut self, bucket: u64) -> Result<SlotId> {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        let offset = self.dir_offset(bucket)?;
        self.read_at(offset, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn dir_set(&mut self, bucket: u64, slot: SlotId) -> Result<()> {
        let offset = self.dir_offset(bucket)?;
        self.write_at(offset, &slot.to_le_bytes())
    }

    fn dir_offset(&self, bucket: u64) -> Result<u64> {
        if bucket >= self.header.table_size {
            return Err(GraphError::Corruption(format!(
                "bucket {bucket} out of range (table size {})",
                self.header.table_size
            )));
        }
        Ok(HEADER_SIZE as u64 + bucket * DIR_ENTRY_SIZE as u64)
    }

    fn slot_offset(&self, slot: SlotId) -> Result<u64> {
        debug_assert!(slot >= 1);
        (slot - 1)
            .checked_mul(self.record_size as u64)
            .and_then(|rel| rel.checked_add(self.header.slots_base()))
            .ok_or_else(|| GraphError::InvalidArgument("slot offset overflow".into()))
    }

    fn read_slot_raw(&mut self, slot: SlotId) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.get(&slot) {
            return Ok(bytes.clone());
        }
        let offset = self.slot_offset(slot)?;
        let mut bytes = vec![0u8; self.record_size];
        self.read_at(offset, &mut bytes)?;
        self.cache.put(slot, bytes.clone());
        Ok(bytes)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.ensure_mmap();
        if let Some(ref mmap) = self.mmap {
            let start = offset as usize;
            if start + buf.len() <= mmap.len() {
                buf.copy_from_slice(&mmap[start..start + buf.len()]);
                return Ok(());
            }
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            let n = self.file.read(&mut buf[read..])?;
            if n == 0 {
                // reading within set_len'd space never comes up short, but a
                // truncated file must not panic the reader
                buf[read..].fill(0);
                break;
            }
            read += n;
        }
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(GraphError::ReadOnly);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        let end = offset + bytes.len() as u64;
        if end > self.file_len {
            self.file_len = end;
        }
        self.invalidate_mmap();
        Ok(())
    }

    fn ensure_mmap(&mut self) {
        if self.use_mmap && self.mmap.is_none() && self.file_len > 0 {
            self.mmap = unsafe { Mmap::map(&self.file).ok() };
        }
    }

    fn invalidate_mmap(&mut self) {
        if self.mmap.is_some() {
            self.mmap = None;
        }
    }
}

/// Typed record access. Decoding validates the discriminator (and, for
/// nodes, the stored position) so every descent doubles as a structural
/// integrity check.
impl SlotFile {
    pub fn slot_kind(&mut self, slot: SlotId) -> Result<RecordKind> {
        let bytes = self.read_slot(slot)?;
        RecordKind::from_byte(bytes[0])
    }

    pub fn read_node(&mut self, slot: SlotId) -> Result<NodeRecord> {
        let bytes = self.read_slot(slot)?;
        NodeRecord::decode(&self.layout, slot, &bytes)
    }

    pub fn write_node(&mut self, node: &NodeRecord) -> Result<()> {
        let mut bytes = vec![0u8; self.record_size];
        node.encode(&self.layout, &mut bytes)?;
        self.write_slot(node.position, &bytes)
    }

    pub fn read_edge(&mut self, slot: SlotId) -> Result<EdgeRecord> {
        let bytes = self.read_slot(slot)?;
        EdgeRecord::decode(&self.layout, slot, &bytes)
    }

    pub fn write_edge(&mut self, slot: SlotId, edge: &EdgeRecord) -> Result<()> {
        let mut bytes = vec![0u8; self.record_size];
        edge.encode(&self.layout, &mut bytes)?;
        self.write_slot(slot, &bytes)
    }
}

fn new_cache(cache_slots: usize) -> LruCache<SlotId, Vec<u8>> {
    let capacity = NonZeroUsize::new(cache_slots)
        .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_SLOTS).expect("nonzero default"));
    LruCache::new(capacity)
}

fn page_align(len: u64) -> u64 {
    len.div_ceil(PAGE_SIZE) * PAGE_SIZE
}
