/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its associated methods.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    crypto_primitives::{hash, CryptoHasher, Digest},
    data_types::{BlockHeight, CryptoHash, Data},
    encode,
};

/// A block proposed by a leader in a [`PrepareReq`](crate::pbft::messages::PrepareReq).
///
/// The `hash` of a block commits to its `height`, its `parent`, and (through `data_hash`) its `data`,
/// so the `block_hash` field of a PBFT message identifies exactly one block.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub hash: CryptoHash,
    pub parent: CryptoHash,
    pub data_hash: CryptoHash,
    pub data: Data,
}

impl Block {
    /// Create a new block at `height` that extends the block with hash `parent`.
    pub fn new(height: BlockHeight, parent: CryptoHash, data: Data) -> Block {
        let data_hash = hash(&encode(&data));
        Block {
            height,
            hash: Block::hash(height, &parent, &data_hash),
            parent,
            data_hash,
            data,
        }
    }

    /// Create the block every ledger starts with.
    pub fn genesis() -> Block {
        Block::new(BlockHeight::new(0), CryptoHash::default(), Data::default())
    }

    pub fn hash(height: BlockHeight, parent: &CryptoHash, data_hash: &CryptoHash) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&height.to_le_bytes());
        hasher.update(&parent.bytes());
        hasher.update(&data_hash.bytes());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Checks if `data_hash` and `hash` are consistent with the contents of the block.
    pub fn is_correct(&self) -> bool {
        self.data_hash == hash(&encode(&self.data))
            && self.hash == Block::hash(self.height, &self.parent, &self.data_hash)
    }

    /// An empty block carries no data. Whether empty blocks are proposed at all is decided by the
    /// replica's `omit_empty` configuration.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_types::Datum;

    #[test]
    fn tampered_data_is_detected() {
        let mut block = Block::new(
            BlockHeight::new(1),
            Block::genesis().hash,
            Data::new(vec![Datum::new(vec![1, 2, 3])]),
        );
        assert!(block.is_correct());
        assert!(!block.is_empty());

        block.data = Data::new(vec![Datum::new(vec![4])]);
        assert!(!block.is_correct());
    }

    #[test]
    fn hash_depends_on_parent() {
        let genesis = Block::genesis();
        let a = Block::new(BlockHeight::new(1), genesis.hash, Data::default());
        let b = Block::new(BlockHeight::new(1), a.hash, Data::default());
        assert_ne!(a.hash, b.hash);
        assert!(a.is_empty());
    }
}
