use std::{
    thread,
    time::{Duration, Instant},
};

use ed25519_dalek::SigningKey;
use log::LevelFilter;
use pbft_rs::types::{data_types::BlockHeight, validator_set::ValidatorSet};
use rand_core::OsRng;

mod common;

use crate::common::{logging::setup_logger, network::mock_network, node::Node};

#[test]
fn replicas_commit_blocks_test() {
    setup_logger(LevelFilter::Info);

    // 1. Initialize test components.

    // 1.1. Create signing keys for 4 replicas, all of which are validators.
    let mut csprg = OsRng {};
    let keypairs: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();
    let validator_set = ValidatorSet::new(keypairs.iter().map(|kp| kp.verifying_key()).collect());

    // 1.2. Create a mock network connecting the 4 replicas.
    let network_stubs = mock_network(keypairs.iter().map(|kp| kp.verifying_key()));

    // 1.3. Give every replica its own backup directory.
    let backup_dirs: Vec<tempfile::TempDir> = (0..4).map(|_| tempfile::tempdir().unwrap()).collect();

    // 1.4. Simultaneously start all replicas.
    let nodes: Vec<Node> = keypairs
        .into_iter()
        .zip(network_stubs)
        .zip(backup_dirs.iter())
        .map(|((keypair, network), backup_dir)| {
            Node::new(keypair, network, validator_set.clone(), backup_dir.path())
        })
        .collect();

    // 2. Submit a transaction to every replica, so that whoever leads proposes it.
    nodes
        .iter()
        .for_each(|node| node.submit_transaction(b"tx-1"));

    // 3. Poll the ledger of every replica until it has 3 blocks.
    let deadline = Instant::now() + Duration::from_secs(60);
    while nodes
        .iter()
        .any(|node| node.height() < BlockHeight::new(3))
    {
        assert!(Instant::now() < deadline, "replicas made no progress");
        thread::sleep(Duration::from_millis(50));
    }

    // 4. All replicas have the same chain.
    for height in 1..=3 {
        let block = nodes[0].ledger().block(BlockHeight::new(height)).unwrap();
        for node in &nodes[1..] {
            assert_eq!(
                node.ledger().block(BlockHeight::new(height)).as_ref(),
                Some(&block),
                "{:?} disagrees at height {}",
                node.verifying_key(),
                height
            );
        }
    }

    // 5. The transaction made it into one of them.
    assert!((1..=3).any(|height| {
        nodes[0]
            .ledger()
            .block(BlockHeight::new(height))
            .is_some_and(|block| !block.is_empty())
    }));
}
