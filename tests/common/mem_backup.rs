use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use pbft_rs::backup::{BackupError, BackupStore};

/// An in-memory backup store. Clones share the same storage, so that a test can inspect what an engine
/// wrote, or start a second engine on the same backup to simulate a restart.
#[derive(Clone, Default)]
pub(crate) struct MemBackup(Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>);

impl MemBackup {
    pub(crate) fn new() -> MemBackup {
        Self::default()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(key).cloned()
    }
}

impl BackupStore for MemBackup {
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackupError> {
        self.0.lock().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackupError> {
        Ok(self.get(key))
    }
}
