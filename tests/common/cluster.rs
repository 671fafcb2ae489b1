use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use ed25519_dalek::{SigningKey, VerifyingKey};
use pbft_rs::{
    networking::broadcast_filter::BroadcastFilter,
    pbft::{
        implementation::{PBFTConfiguration, PBFTEngine},
        messages::PBFTMessage,
    },
    types::{crypto_primitives::Keypair, validator_set::ValidatorSet},
};
use rand_core::OsRng;

use super::{mem_backup::MemBackup, mem_ledger::MemLedger, network::mock_network, network::NetworkStub};

pub(crate) type TestEngine = PBFTEngine<NetworkStub, MemLedger, MemBackup>;

pub(crate) const INTERVAL_BLOCK_TIME: Duration = Duration::from_millis(1000);

/// A set of engines connected by a [mock network](super::network::mock_network), driven
/// synchronously by the test instead of by replica threads.
///
/// Like the poller and message stub of a running replica, the cluster holds on to messages for
/// heights that an engine has not reached yet, and delivers them once it does.
pub(crate) struct Cluster {
    pub(crate) nodes: Vec<ClusterNode>,
    pub(crate) validator_set: ValidatorSet,
}

pub(crate) struct ClusterNode {
    pub(crate) keypair: SigningKey,
    pub(crate) engine: TestEngine,
    pub(crate) network: NetworkStub,
    pub(crate) ledger: MemLedger,
    pub(crate) backup: MemBackup,
    pub(crate) online: bool,
    backlog: Vec<(VerifyingKey, PBFTMessage)>,
}

impl Cluster {
    /// Create `n` validators, plus `observers` replicas that are connected to the network but not in
    /// the validator set.
    pub(crate) fn new(n: usize, observers: usize) -> Cluster {
        let mut csprg = OsRng {};
        let keypairs: Vec<SigningKey> = (0..n + observers)
            .map(|_| SigningKey::generate(&mut csprg))
            .collect();
        let validator_set =
            ValidatorSet::new(keypairs.iter().take(n).map(|kp| kp.verifying_key()).collect());
        let network_stubs = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));

        let nodes = keypairs
            .into_iter()
            .zip(network_stubs)
            .map(|(keypair, network)| {
                let ledger = MemLedger::new();
                let backup = MemBackup::new();
                let engine = engine(
                    &keypair,
                    &validator_set,
                    network.clone(),
                    ledger.clone(),
                    backup.clone(),
                );
                ClusterNode {
                    keypair,
                    engine,
                    network,
                    ledger,
                    backup,
                    online: true,
                    backlog: Vec::new(),
                }
            })
            .collect();

        Cluster {
            nodes,
            validator_set,
        }
    }

    pub(crate) fn verifying_key(&self, i: usize) -> VerifyingKey {
        self.nodes[i].keypair.verifying_key()
    }

    /// Queue a transaction in every node's ledger.
    pub(crate) fn submit_transaction(&self, tx: &[u8]) {
        self.nodes
            .iter()
            .for_each(|node| node.ledger.submit_transaction(tx))
    }

    /// Make node `i` stop processing messages. Messages sent to it while it is offline are lost.
    pub(crate) fn take_offline(&mut self, i: usize) {
        self.nodes[i].online = false;
    }

    pub(crate) fn tick(&mut self, i: usize) {
        self.nodes[i].engine.tick().unwrap()
    }

    pub(crate) fn tick_at(&mut self, i: usize, now: Instant) {
        self.nodes[i].engine.tick_at(now).unwrap()
    }

    /// Deliver messages to every online node until no node has anything left to process.
    ///
    /// Returns the number of messages processed.
    pub(crate) fn deliver_all(&mut self) -> usize {
        let mut total = 0;
        loop {
            let mut delivered = 0;
            for node in self.nodes.iter_mut() {
                delivered += node.deliver();
            }
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
    }
}

impl ClusterNode {
    fn deliver(&mut self) -> usize {
        let msgs = self.network.drain();
        if !self.online {
            return 0;
        }

        let mut delivered = 0;
        let mut pending: Vec<(VerifyingKey, PBFTMessage)> = self.backlog.drain(..).collect();
        pending.extend(msgs.into_iter().filter_map(|(origin, msg)| {
            PBFTMessage::try_from(&msg)
                .ok()
                .map(|pbft_msg| (origin, pbft_msg))
        }));

        for (origin, msg) in pending {
            if msg.height() > self.engine.consensus_height() {
                self.backlog.push((origin, msg));
            } else {
                self.engine.on_receive_msg(&origin, msg).unwrap();
                delivered += 1;
            }
        }
        delivered
    }

    /// Create a new engine on this node's ledger and backup, as if the node had restarted.
    pub(crate) fn restart(&mut self, validator_set: &ValidatorSet) {
        self.engine = engine(
            &self.keypair,
            validator_set,
            self.network.clone(),
            self.ledger.clone(),
            self.backup.clone(),
        );
    }
}

pub(crate) fn engine(
    keypair: &SigningKey,
    validator_set: &ValidatorSet,
    network: NetworkStub,
    ledger: MemLedger,
    backup: MemBackup,
) -> TestEngine {
    let config = PBFTConfiguration {
        keypair: Keypair::new(keypair.clone()),
        validator_set: validator_set.clone(),
        interval_block_time: INTERVAL_BLOCK_TIME,
        omit_empty: false,
    };
    PBFTEngine::new(
        config,
        network,
        Arc::new(BroadcastFilter::new(Duration::from_secs(60))),
        ledger,
        backup,
        None,
    )
    .unwrap()
}
