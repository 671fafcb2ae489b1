/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the state types owned by the [`PBFTEngine`](super::implementation::PBFTEngine).

use crate::types::data_types::{BlockHeight, CryptoHash, ViewNumber};

/// Whether the node takes part in consensus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountType {
    /// The node is in the validator set: it proposes, signs, and commits.
    Validator,

    /// The node is not in the validator set. It never signs anything, and ignores consensus messages.
    Observer,
}

/// Progress of the current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundState {
    /// Waiting for the round's prepare.
    Idle,

    /// A prepare was accepted and our sign vote was sent.
    Prepared,

    /// A quorum of sign votes was seen and our commit vote was sent.
    ReadyToCommit,

    /// The round's block was submitted to the ledger. Transient: the engine moves to the next height's
    /// `Idle` within the same call.
    Committed,

    /// The view timed out and a view change was requested.
    ViewChanging,
}

/// All mutable counters of the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineState {
    /// Height of the block that consensus is currently trying to agree on. Always one more than the
    /// height of the highest block in the ledger.
    pub consensus_height: BlockHeight,

    /// The view that the engine is in.
    pub view: ViewNumber,

    /// The view that the engine is trying to move to. Equal to `view` unless a view change is in
    /// progress, in which case it is higher.
    pub to_view: ViewNumber,

    /// Hash of the highest block in the ledger.
    pub highest_block_hash: CryptoHash,

    pub round_state: RoundState,

    /// Set when at least f + 1 validators were seen asking for views above `to_view`, so that the next
    /// tick joins them without waiting for the view to time out.
    pub fast_view_change: bool,
}

impl EngineState {
    /// Initial state for a ledger whose highest block is at `highest_height` with hash `highest_block_hash`.
    pub fn new(highest_height: BlockHeight, highest_block_hash: CryptoHash) -> EngineState {
        EngineState {
            consensus_height: highest_height + 1,
            view: ViewNumber::init(),
            to_view: ViewNumber::init(),
            highest_block_hash,
            round_state: RoundState::Idle,
            fast_view_change: false,
        }
    }

    /// Height of the highest block in the ledger.
    pub fn highest_height(&self) -> BlockHeight {
        self.consensus_height - 1
    }
}
