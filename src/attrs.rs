//! User attribute records.
//!
//! Nodes and edges may carry a fixed-width attribute region whose size is
//! declared at file creation. The engine stores and returns raw bytes; this
//! trait is the seam for callers that want typed access.

use crate::error::{GraphError, Result};

/// Fixed-layout attribute record.
///
/// `SIZE` must not exceed the attribute size the file was created with.
/// Encoding writes into a zeroed buffer of the declared size; decoding reads
/// the same region back.
pub trait FixedAttrs: Sized {
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Result<Self>;
}

impl FixedAttrs for () {
    const SIZE: usize = 0;

    fn encode(&self, _buf: &mut [u8]) {}

    fn decode(_buf: &[u8]) -> Result<Self> {
        Ok(())
    }
}

pub(crate) fn fill_attr_region(region: &mut [u8], attrs: Option<&[u8]>) -> Result<()> {
    region.fill(0);
    if let Some(bytes) = attrs {
        if bytes.len() > region.len() {
            return Err(GraphError::InvalidArgument(format!(
                "attribute buffer of {} bytes exceeds declared size {}",
                bytes.len(),
                region.len()
            )));
        }
        region[..bytes.len()].copy_from_slice(bytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_pads_and_rejects_oversize() {
        let mut region = [0xAAu8; 8];
        fill_attr_region(&mut region, Some(b"abc")).unwrap();
        assert_eq!(&region, b"abc\0\0\0\0\0");

        let err = fill_attr_region(&mut region, Some(b"123456789")).unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }
}
