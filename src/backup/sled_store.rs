/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::{fs, path::Path};

use super::{BackupError, BackupStore};

/// [`BackupStore`] backed by a [`sled`] database.
pub struct SledBackupStore {
    db: sled::Db,
}

impl SledBackupStore {
    /// Open (or create) the backup database rooted at `dir`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<SledBackupStore, BackupError> {
        let dir = dir.as_ref();
        let not_enough_space = |reason: String| BackupError::NotEnoughAvailableSpace {
            path: dir.display().to_string(),
            reason,
        };

        fs::create_dir_all(dir).map_err(|err| not_enough_space(err.to_string()))?;
        let db = sled::open(dir).map_err(|err| not_enough_space(err.to_string()))?;
        log::info!("Opened backup store at {}", dir.display());
        Ok(SledBackupStore { db })
    }
}

impl BackupStore for SledBackupStore {
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackupError> {
        self.db
            .insert(key, value)
            .map_err(|err| BackupError::WriteFailed(err.to_string()))?;
        self.db
            .flush()
            .map_err(|err| BackupError::WriteFailed(err.to_string()))?;
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackupError> {
        self.db
            .get(key)
            .map(|value| value.map(|ivec| ivec.to_vec()))
            .map_err(|err| BackupError::ReadFailed(err.to_string()))
    }
}
