/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable ledger that consensus produces blocks for and appends blocks to.
//!
//! The engine does not know how blocks are built, executed, or stored. It asks the [`Ledger`] three
//! things:
//! 1. Where the chain currently ends ([`current_height`](Ledger::current_height) and
//!    [`highest_block_hash`](Ledger::highest_block_hash)).
//! 2. To produce a block when the node leads a round ([`produce_block`](Ledger::produce_block)), and to
//!    check the block of someone else's proposal ([`validate_block`](Ledger::validate_block)).
//! 3. To append a block once a quorum has committed it ([`submit`](Ledger::submit)).

use thiserror::Error;

use crate::types::{
    block::Block,
    data_types::{BlockHeight, CryptoHash},
};

pub trait Ledger: Send {
    /// Height of the highest block in the ledger. 0 if the ledger only holds the genesis block.
    fn current_height(&self) -> BlockHeight;

    fn highest_block_hash(&self) -> CryptoHash;

    /// Build a block at `height` extending `parent`. A block with empty data is an "empty block".
    fn produce_block(&mut self, height: BlockHeight, parent: CryptoHash) -> Block;

    /// Check whether `block` may be appended to the ledger, e.g., whether its data executes correctly.
    fn validate_block(&self, block: &Block) -> bool;

    /// Append a committed block to the ledger.
    fn submit(&mut self, block: Block) -> Result<(), SubmitError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// The block does not extend the highest block, e.g., because the ledger was advanced by another
    /// path such as block sync.
    #[error("Block at height {block_height} does not extend ledger at height {ledger_height}")]
    NotNextBlock {
        block_height: BlockHeight,
        ledger_height: BlockHeight,
    },

    #[error("Block rejected by ledger: {0}")]
    Rejected(String),
}
