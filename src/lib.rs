/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A Rust implementation of the Practical Byzantine Fault Tolerance (PBFT) consensus protocol for
//! permissioned blockchains.
//!
//! pbft_rs keeps a [ledger](ledger::Ledger) replicated across a fixed set of validators, of which up to
//! `f = (n - 1) / 3` may be faulty. It is made of:
//! - The [consensus engine](pbft::implementation::PBFTEngine), a deterministic state machine that
//!   consumes [messages](pbft::messages) and clock ticks.
//! - A [request cache](pbft::request_cache) that holds the votes of the round in progress.
//! - A [time manager](time_manager) that decides when views time out.
//! - A [broadcast filter](networking::broadcast_filter) that keeps peers from being sent messages
//!   they already have.
//! - A [backup store](backup) that persists the last committed prepare across restarts.
//!
//! Library users provide the [network](networking::network::Network) and the
//! [ledger](ledger::Ledger), and start a [replica](replica) that runs the engine on its own threads.

pub mod backup;

pub mod events;

pub mod ledger;

pub mod logging;

pub mod networking;

pub mod pbft;

pub mod replica;

pub mod time_manager;

pub mod types;

pub(crate) mod algorithm;

pub(crate) mod event_bus;
