use std::sync::{Arc, Mutex};

use pbft_rs::{
    ledger::{Ledger, SubmitError},
    types::{
        block::Block,
        data_types::{BlockHeight, CryptoHash, Data, Datum},
    },
};

/// An in-memory ledger with a queue of pending transactions. Clones share the same chain, so that a
/// test can keep a handle to a ledger that was moved into an engine or a replica.
#[derive(Clone)]
pub(crate) struct MemLedger(Arc<Mutex<MemLedgerState>>);

struct MemLedgerState {
    blocks: Vec<Block>,
    tx_queue: Vec<Datum>,
}

impl MemLedger {
    pub(crate) fn new() -> MemLedger {
        MemLedger(Arc::new(Mutex::new(MemLedgerState {
            blocks: vec![Block::genesis()],
            tx_queue: Vec::new(),
        })))
    }

    /// Queue a transaction to be included in the next block this ledger produces.
    pub(crate) fn submit_transaction(&self, tx: &[u8]) {
        self.0.lock().unwrap().tx_queue.push(Datum::new(tx.to_vec()))
    }

    pub(crate) fn height(&self) -> BlockHeight {
        self.current_height()
    }

    pub(crate) fn block(&self, height: BlockHeight) -> Option<Block> {
        self.0
            .lock()
            .unwrap()
            .blocks
            .get(height.int() as usize)
            .cloned()
    }
}

impl Ledger for MemLedger {
    fn current_height(&self) -> BlockHeight {
        BlockHeight::new(self.0.lock().unwrap().blocks.len() as u64 - 1)
    }

    fn highest_block_hash(&self) -> CryptoHash {
        let state = self.0.lock().unwrap();
        let highest_block_hash = state.blocks.last().map(|block| block.hash);
        highest_block_hash.unwrap_or_default()
    }

    fn produce_block(&mut self, height: BlockHeight, parent: CryptoHash) -> Block {
        let data = Data::new(self.0.lock().unwrap().tx_queue.clone());
        Block::new(height, parent, data)
    }

    fn validate_block(&self, block: &Block) -> bool {
        block.height == self.current_height() + 1
    }

    fn submit(&mut self, block: Block) -> Result<(), SubmitError> {
        let mut state = self.0.lock().unwrap();
        let ledger_height = BlockHeight::new(state.blocks.len() as u64 - 1);
        if block.height != ledger_height + 1 {
            return Err(SubmitError::NotNextBlock {
                block_height: block.height,
                ledger_height,
            });
        }

        state
            .tx_queue
            .retain(|tx| !block.data.iter().any(|included| included == tx));
        state.blocks.push(block);
        Ok(())
    }
}
