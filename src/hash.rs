//! Key and edge hashing.
//!
//! Two independent 64-bit hashes are drawn over node keys: the primary hash
//! selects the index bucket, the secondary hash orders the bucket's search
//! tree. Keeping them independent decorrelates bucket assignment from tree
//! shape. Edge hashes are derived from both endpoints' secondary hashes, so
//! within one adjacency tree (where one endpoint is fixed) the hash is a
//! stable function of the opposite endpoint alone.

use xxhash_rust::xxh64::xxh64;

const BUCKET_SEED: u64 = 0x68696d6f_0000_0001;
const ORDER_SEED: u64 = 0x68696d6f_0000_0002;
const EDGE_SEED: u64 = 0x68696d6f_0000_0003;

/// Primary key hash; reduced modulo the table size to pick a bucket.
pub fn bucket_hash(key: &str) -> u64 {
    xxh64(key.as_bytes(), BUCKET_SEED)
}

/// Secondary key hash; orders nodes within a bucket's search tree.
pub fn order_hash(key: &str) -> u64 {
    xxh64(key.as_bytes(), ORDER_SEED)
}

/// Edge hash over the two endpoints' secondary key hashes.
pub fn edge_hash(source_hash: u64, target_hash: u64) -> u64 {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&source_hash.to_le_bytes());
    buf[8..].copy_from_slice(&target_hash.to_le_bytes());
    xxh64(&buf, EDGE_SEED)
}
