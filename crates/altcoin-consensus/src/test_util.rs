//! Synthetic chains for difficulty tests.
//!
//! Blocks are keyed by a hash derived from their height, so a chain can be
//! laid out without mining anything and ancestors can be dropped from the
//! store to simulate gaps.

use bitcoin::hashes::Hash;
use bitcoin::{CompactTarget as HeaderBits, TxMerkleNode};

use crate::blockdata::block::{BlockHash, BlockHeader, StoredBlock, Version};
use crate::store::MemoryChainStore;

const MARKER: u8 = 0xab;

/// Hash standing in for the block at `height`.
pub(crate) fn synthetic_hash(height: u32) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&height.to_le_bytes());
    bytes[31] = MARKER;
    BlockHash::from_byte_array(bytes)
}

/// A header following `prev`.
pub(crate) fn header(prev: BlockHash, time: u32, bits: u32) -> BlockHeader {
    BlockHeader {
        version: Version::ONE,
        prev_blockhash: prev,
        merkle_root: TxMerkleNode::all_zeros(),
        time,
        bits: HeaderBits::from_consensus(bits),
        nonce: 0,
    }
}

/// A candidate block on top of `prev`.
pub(crate) fn candidate(prev: &StoredBlock, time: u32, bits: u32) -> BlockHeader {
    header(prev.hash, time, bits)
}

/// Lays out consecutive blocks in a [`MemoryChainStore`].
pub(crate) struct ChainBuilder {
    store: MemoryChainStore,
    tip: StoredBlock,
}

impl ChainBuilder {
    /// Starts a chain whose first stored block sits at `height`.
    pub(crate) fn start(height: u32, time: u32, bits: u32) -> Self {
        let prev = if height == 0 {
            BlockHash::all_zeros()
        } else {
            synthetic_hash(height - 1)
        };
        let tip = StoredBlock::new(synthetic_hash(height), header(prev, time, bits), height);
        let mut store = MemoryChainStore::new();
        store.insert(tip);
        ChainBuilder { store, tip }
    }

    /// Appends one block `spacing` seconds after the tip.
    pub(crate) fn push(&mut self, spacing: u32, bits: u32) -> StoredBlock {
        let height = self.tip.height + 1;
        let block = StoredBlock::new(
            synthetic_hash(height),
            header(self.tip.hash, self.tip.time() + spacing, bits),
            height,
        );
        self.store.insert(block);
        self.tip = block;
        block
    }

    /// Appends `count` evenly spaced blocks.
    pub(crate) fn extend(&mut self, count: u32, spacing: u32, bits: u32) -> StoredBlock {
        for _ in 0..count {
            self.push(spacing, bits);
        }
        self.tip
    }

    pub(crate) fn tip(&self) -> StoredBlock {
        self.tip
    }

    pub(crate) fn store(&self) -> &MemoryChainStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut MemoryChainStore {
        &mut self.store
    }
}
