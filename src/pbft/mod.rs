/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The PBFT consensus protocol.
//!
//! # Protocol
//!
//! Consensus proceeds one height at a time. At every height, validators try to agree on a single block
//! in a sequence of views, starting from view 0. Every view has a single leader, determined by
//! [`roles::leader_index`]. With `n` validators, `f = (n - 1) / 3` of which may be faulty, a round of
//! consensus at a given `(height, view)` goes as follows:
//! 1. **Prepare**: the leader proposes a block that extends the highest block of the ledger, in a
//!    [`PrepareReq`](messages::PrepareReq).
//! 2. **Sign**: every validator that accepts the prepare broadcasts a [`SignReq`](messages::SignReq)
//!    for its block.
//! 3. **Commit**: every validator that collects `n - f` signs for the block broadcasts a
//!    [`CommitReq`](messages::CommitReq).
//! 4. Every validator that collects `n - f` commits persists the prepare to its
//!    [backup store](crate::backup), and appends the block to the [ledger](crate::ledger). It then moves
//!    to view 0 of the next height.
//!
//! If a view does not produce a block before its timeout, validators broadcast a
//! [`ViewChangeReq`](messages::ViewChangeReq) for the next view. A validator that collects `n - f`
//! requests for the same view moves into it. Timeouts double with every consecutive failed view
//! change, up to a cap (see [`TimeManager`](crate::time_manager::TimeManager)).
//!
//! # Message flow
//!
//! All PBFT messages are re-broadcast by the validators that accept them, through a
//! [`BroadcastFilter`](crate::networking::broadcast_filter::BroadcastFilter) that keeps a validator
//! from being sent the same message twice.

pub mod implementation;

pub mod messages;

pub mod request_cache;

pub mod roles;

pub mod types;
