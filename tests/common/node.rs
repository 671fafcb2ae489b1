use std::{path::Path, time::Duration};

use ed25519_dalek::{SigningKey, VerifyingKey};
use pbft_rs::{
    events::{CommitBlockEvent, ViewTimeoutEvent},
    replica::{Configuration, Replica, ReplicaSpec},
    types::{
        data_types::{BlockHeight, BufferSize},
        validator_set::ValidatorSet,
    },
};

use super::{
    logging::{first_seven_base64_chars, log_with_context},
    mem_ledger::MemLedger,
    network::NetworkStub,
};

/// Things the Nodes will have in common:
/// - Validator Set.
/// - Configuration, apart from the keypair and backup directory.
///
/// Things that they will differ in:
/// - Ledger.
/// - Network instance.
/// - Backup directory.
/// - Keypair.
pub(crate) struct Node {
    verifying_key: VerifyingKey,
    ledger: MemLedger,
    // Dropping the replica shuts down its threads.
    _replica: Replica,
}

impl Node {
    pub(crate) fn new(
        keypair: SigningKey,
        network: NetworkStub,
        validator_set: ValidatorSet,
        backup_dir: &Path,
    ) -> Node {
        let verifying_key = keypair.verifying_key();
        let ledger = MemLedger::new();

        let configuration = Configuration::builder()
            .me(keypair)
            .validator_set(validator_set)
            .interval_block_time(Duration::from_millis(100))
            .omit_empty(false)
            .backup_dir(backup_dir.to_path_buf())
            .broadcast_window(Duration::from_secs(60))
            .msg_buffer_capacity(BufferSize::new(1024 * 1024))
            .tick_interval(Duration::from_millis(5))
            .log_events(false)
            .build();

        let replica = ReplicaSpec::builder()
            .ledger(ledger.clone())
            .network(network)
            .configuration(configuration)
            .on_commit_block(commit_block_handler(verifying_key))
            .on_view_timeout(view_timeout_handler(verifying_key))
            .build()
            .start()
            .unwrap();

        Node {
            verifying_key,
            ledger,
            _replica: replica,
        }
    }

    pub(crate) fn submit_transaction(&self, tx: &[u8]) {
        self.ledger.submit_transaction(tx)
    }

    pub(crate) fn height(&self) -> BlockHeight {
        self.ledger.height()
    }

    pub(crate) fn ledger(&self) -> &MemLedger {
        &self.ledger
    }

    pub(crate) fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }
}

fn commit_block_handler(
    verifying_key: VerifyingKey,
) -> impl Fn(&CommitBlockEvent) + Send + 'static {
    move |commit_block_event: &CommitBlockEvent| {
        log_with_context(
            &verifying_key,
            &format!(
                "Committed Block, block hash: {}, height: {}, view: {}",
                first_seven_base64_chars(&commit_block_event.block.bytes()),
                commit_block_event.height,
                commit_block_event.view
            ),
        );
    }
}

fn view_timeout_handler(
    verifying_key: VerifyingKey,
) -> impl Fn(&ViewTimeoutEvent) + Send + 'static {
    move |view_timeout_event: &ViewTimeoutEvent| {
        log_with_context(
            &verifying_key,
            &format!(
                "View Timeout, view: {}, to view: {}",
                view_timeout_event.view, view_timeout_event.to_view
            ),
        );
    }
}
