//! Chain storage consumed by the difficulty engine.
//!
//! The engine only ever asks for "the stored block with this hash"; ancestors
//! are reached by following `prev_blockhash`. A missing block is not an error
//! at this layer: the classic retarget treats it as fatal, the gravity-well
//! walks skip over it.

use std::collections::HashMap;

use crate::blockdata::block::{BlockHash, StoredBlock};

/// Lookup of stored blocks by identity hash.
pub trait ChainStore {
    /// Returns the block stored under `hash`, if any.
    fn get(&self, hash: &BlockHash) -> Option<StoredBlock>;
}

impl<S: ChainStore + ?Sized> ChainStore for &S {
    fn get(&self, hash: &BlockHash) -> Option<StoredBlock> {
        (**self).get(hash)
    }
}

/// A `HashMap` backed store.
#[derive(Debug, Clone, Default)]
pub struct MemoryChainStore {
    blocks: HashMap<BlockHash, StoredBlock>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `block` under its hash, replacing any previous entry.
    pub fn insert(&mut self, block: StoredBlock) -> Option<StoredBlock> {
        self.blocks.insert(block.hash, block)
    }

    /// Removes the block stored under `hash`.
    pub fn remove(&mut self, hash: &BlockHash) -> Option<StoredBlock> {
        self.blocks.remove(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl ChainStore for MemoryChainStore {
    fn get(&self, hash: &BlockHash) -> Option<StoredBlock> {
        self.blocks.get(hash).copied()
    }
}

impl FromIterator<StoredBlock> for MemoryChainStore {
    fn from_iter<I: IntoIterator<Item = StoredBlock>>(iter: I) -> Self {
        MemoryChainStore {
            blocks: iter.into_iter().map(|block| (block.hash, block)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;
    use crate::blockdata::genesis::GenesisInfo;
    use crate::hashes::HashPipeline;

    fn genesis() -> StoredBlock {
        let header = GenesisInfo::BITCOIN.to_header().unwrap();
        StoredBlock::from_header(header, 0, &HashPipeline::Sha256d).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = MemoryChainStore::new();
        assert!(store.is_empty());

        let block = genesis();
        assert_eq!(store.insert(block), None);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&block.hash));
        assert_eq!(store.get(&block.hash), Some(block));
        assert_eq!(store.get(&BlockHash::all_zeros()), None);
    }

    #[test]
    fn test_remove_and_collect() {
        let block = genesis();
        let mut store: MemoryChainStore = std::iter::once(block).collect();
        assert_eq!(store.get(&block.hash), Some(block));
        assert_eq!(store.remove(&block.hash), Some(block));
        assert!(store.is_empty());
    }
}
