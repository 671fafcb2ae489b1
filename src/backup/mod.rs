/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Crash-safe persistence of the last committed proposal.
//!
//! Before a block is submitted to the [`Ledger`](crate::ledger::Ledger), the engine writes the
//! [`PrepareReq`](crate::pbft::messages::PrepareReq) that reached a commit quorum under
//! [`BACKUP_KEY_COMMITTED`]. On start-up, the engine reads the key back and restores its committed
//! prepare slot, so a validator that crashed between persisting and submitting still knows what it
//! committed to.
//!
//! The prepare a validator is locked on is written under [`BACKUP_KEY_LOCKED`] before its commit vote
//! is sent, so that a restart does not release the lock.
//!
//! The store is pluggable through the [`BackupStore`] trait. [`SledBackupStore`] is the on-disk
//! implementation used by the [`Replica`](crate::replica::Replica).

use thiserror::Error;

mod sled_store;

pub use sled_store::SledBackupStore;

/// The key under which the borsh encoding of the committed `PrepareReq` is stored.
pub const BACKUP_KEY_COMMITTED: &[u8] = b"committed";

/// The key under which the borsh encoding of the locked `PrepareReq` is stored.
pub const BACKUP_KEY_LOCKED: &[u8] = b"locked";

pub trait BackupStore: Send {
    /// Durably store `value` under `key`, replacing any previous value. Must not return until the write
    /// has reached stable storage.
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackupError>;

    /// Get the value stored under `key`, if any.
    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackupError>;
}

#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup directory could not be created, or the database in it could not be opened.
    #[error("Not enough available space to open backup store at {path}: {reason}")]
    NotEnoughAvailableSpace { path: String, reason: String },

    #[error("Backup write failed: {0}")]
    WriteFailed(String),

    #[error("Backup read failed: {0}")]
    ReadFailed(String),

    /// The stored committed prepare could not be decoded.
    #[error("Backup record is corrupted: {0}")]
    Corrupted(String),
}
