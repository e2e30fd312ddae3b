//! Block headers and the stored form the difficulty engine reads.

use bitcoin::consensus::encode::serialize;
use serde::{Deserialize, Serialize};

use crate::hashes::{HEADER_SIZE, HashError, HashPipeline};
use crate::pow::{CompactTarget, Target};

pub use bitcoin::BlockHash;
pub use bitcoin::block::{Header as BlockHeader, Version};

/// Serializes a header into its fixed 80-byte consensus form.
pub fn header_bytes(header: &BlockHeader) -> [u8; HEADER_SIZE] {
    #[allow(clippy::expect_used, reason = "A header always serializes to 80 bytes")]
    serialize(header)
        .try_into()
        .expect("A header always serializes to 80 bytes")
}

/// A header together with its identity hash and height.
///
/// The hash is whatever the chain's block-hash pipeline produced, which for
/// Darkcoin is not the double SHA-256 `BlockHeader::block_hash` returns, so it
/// is carried alongside the header rather than recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlock {
    pub hash: BlockHash,
    pub header: BlockHeader,
    pub height: u32,
}

impl StoredBlock {
    pub fn new(hash: BlockHash, header: BlockHeader, height: u32) -> Self {
        StoredBlock {
            hash,
            header,
            height,
        }
    }

    /// Hashes `header` with `pipeline` and wraps it at `height`.
    pub fn from_header(
        header: BlockHeader,
        height: u32,
        pipeline: &HashPipeline,
    ) -> Result<Self, HashError> {
        let hash = pipeline.hash(&header_bytes(&header))?.to_block_hash();
        Ok(StoredBlock::new(hash, header, height))
    }

    /// Header timestamp.
    pub fn time(&self) -> u32 {
        self.header.time
    }

    /// Declared compact target.
    pub fn bits(&self) -> CompactTarget {
        self.header.bits.into()
    }

    /// Decoded declared target, `None` when the encoding is negative or
    /// overflows.
    pub fn target(&self) -> Option<Target> {
        Target::from_compact(self.bits())
    }

    pub fn prev_blockhash(&self) -> BlockHash {
        self.header.prev_blockhash
    }
}
