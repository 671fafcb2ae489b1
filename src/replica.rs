/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! pbft_rs replicates a ledger across multiple processes, called 'replicas'. Each replica is uniquely
//! identified by an [Ed25519 public key](ed25519_dalek::VerifyingKey).
//!
//! The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [ReplicaSpec],
//! - The function to [start](ReplicaSpec::start) a [Replica] given its specification,
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Validators and Observers
//!
//! Only the replicas in the configured [validator set](crate::types::validator_set::ValidatorSet)
//! take part in consensus. A replica whose key is not in the set runs as an observer: its threads run,
//! but it never signs anything and ignores consensus messages.
//!
//! ## Starting a replica
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .ledger(ledger)
//!     .network(network)
//!     .configuration(configuration)
//!     .on_commit_block(commit_block_handler)
//!     .build()
//!     .start()?;
//! ```
//!
//! The replica's [configuration](Configuration) is also defined using the builder pattern:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(signing_key)
//!     .validator_set(validator_set)
//!     .interval_block_time(Duration::from_millis(1000))
//!     .omit_empty(false)
//!     .backup_dir(PathBuf::from("./pbftMsgBackup"))
//!     .broadcast_window(Duration::from_secs(60))
//!     .msg_buffer_capacity(BufferSize::new(1024 * 1024))
//!     .tick_interval(Duration::from_millis(10))
//!     .log_events(true)
//!     .build()
//! ```

use std::{
    path::PathBuf,
    sync::{
        mpsc::{self, Sender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use ed25519_dalek::SigningKey;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{
    algorithm::Algorithm,
    backup::{BackupError, SledBackupStore},
    event_bus::*,
    events::*,
    ledger::Ledger,
    networking::{
        broadcast_filter::BroadcastFilter,
        network::Network,
        receiving::{start_polling, PBFTMessageStub},
    },
    pbft::implementation::{PBFTConfiguration, PBFTEngine, PBFTError},
    types::{crypto_primitives::Keypair, data_types::BufferSize, validator_set::ValidatorSet},
};

/// Stores the user-defined parameters required to start the replica.
///
/// ## Interval block time
///
/// The view timeout is three times the interval block time, doubled for every consecutive view change
/// that fails to produce a block, up to a cap. A leader with nothing to propose waits one interval
/// before proposing an empty block, or, if `omit_empty` is set, before handing its turn to the next
/// leader.
///
/// ## Backup directory
///
/// The last prepare that reached a commit quorum is stored under `backup_dir`, so that a replica that
/// restarts remembers what it committed to.
///
/// ## Log Events
///
/// pbft_rs logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.validator_set(...)`
    - `.interval_block_time(...)`
    - `.omit_empty(...)`
    - `.backup_dir(...)`
    - `.broadcast_window(...)`
    - `.msg_buffer_capacity(...)`
    - `.tick_interval(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's keypair, used to sign messages. Required."))]
    pub me: SigningKey,
    #[builder(setter(doc = "Set the validators that take part in consensus, in order. Required."))]
    pub validator_set: ValidatorSet,
    #[builder(setter(doc = "Set the target time between blocks. Required."))]
    pub interval_block_time: Duration,
    #[builder(setter(doc = "Skip empty blocks instead of proposing them? Required."))]
    pub omit_empty: bool,
    #[builder(setter(doc = "Set the directory that the committed prepare is backed up in. Required."))]
    pub backup_dir: PathBuf,
    #[builder(setter(
        doc = "Set how long a peer is remembered to have a given message, which suppresses re-sending it. Required."
    ))]
    pub broadcast_window: Duration,
    #[builder(setter(
        doc = "Set the maximum number of bytes of future-height messages that the replica buffers. Required."
    ))]
    pub msg_buffer_capacity: BufferSize,
    #[builder(setter(doc = "Set how often the algorithm thread ticks the consensus engine. Required."))]
    pub tick_interval: Duration,
    #[builder(setter(doc = "Enable logging? Required."))]
    pub log_events: bool,
}

impl From<&Configuration> for PBFTConfiguration {
    fn from(value: &Configuration) -> Self {
        PBFTConfiguration {
            keypair: Keypair::new(value.me.clone()),
            validator_set: value.validator_set.clone(),
            interval_block_time: value.interval_block_time,
            omit_empty: value.omit_empty,
        }
    }
}

/// Stores all necessary parameters and trait implementations required to run the [Replica].
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.ledger(...)`
    - `.network(...)`
    - `.configuration(...)`

    Optional:
    - `.on_commit_block(...)`
    - `.on_update_committed_prepare(...)`
    - `.on_propose(...)`
    - `.on_sign(...)`
    - `.on_commit(...)`
    - `.on_view_change(...)`
    - `.on_receive_prepare(...)`
    - `.on_receive_sign(...)`
    - `.on_receive_commit(...)`
    - `.on_receive_view_change(...)`
    - `.on_start_view(...)`
    - `.on_view_timeout(...)`
"))]
pub struct ReplicaSpec<N: Network + 'static, L: Ledger + 'static> {
    // Required parameters
    #[builder(setter(
        doc = "Set the ledger that committed blocks are appended to. The argument must implement the [Ledger](crate::ledger::Ledger) trait. Required."
    ))]
    ledger: L,
    #[builder(setter(
        doc = "Set the implementation of peer-to-peer networking. The argument must implement the [Network](crate::networking::network::Network) trait. Required."
    ))]
    network: N,
    #[builder(setter(
        doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."
    ))]
    configuration: Configuration,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&CommitBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is appended to the ledger. Optional."))]
    on_commit_block: Option<HandlerPtr<CommitBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateCommittedPrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateCommittedPrepareEvent>),
    doc = "Register a handler closure to be invoked after the committed prepare is backed up. Optional."))]
    on_update_committed_prepare: Option<HandlerPtr<UpdateCommittedPrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a prepare for a block. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&SignEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<SignEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a sign vote. Optional."))]
    on_sign: Option<HandlerPtr<SignEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a commit vote. Optional."))]
    on_commit: Option<HandlerPtr<CommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a view change request. Optional."))]
    on_view_change: Option<HandlerPtr<ViewChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceivePrepareEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceivePrepareEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a prepare. Optional."))]
    on_receive_prepare: Option<HandlerPtr<ReceivePrepareEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveSignEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveSignEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a sign vote. Optional."))]
    on_receive_sign: Option<HandlerPtr<ReceiveSignEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveCommitEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveCommitEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a commit vote. Optional."))]
    on_receive_commit: Option<HandlerPtr<ReceiveCommitEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveViewChangeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveViewChangeEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a view change request. Optional."))]
    on_receive_view_change: Option<HandlerPtr<ReceiveViewChangeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a new view. Optional."))]
    on_start_view: Option<HandlerPtr<StartViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's view times out. Optional."))]
    on_view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
}

impl<N: Network + 'static, L: Ledger + 'static> ReplicaSpec<N, L> {
    /// Starts all threads and channels associated with running a replica, and returns the handles to
    /// them in a [Replica] struct.
    pub fn start(mut self) -> Result<Replica, StartReplicaError> {
        self.network
            .init_validator_set(self.configuration.validator_set.clone());

        let backup = SledBackupStore::open(&self.configuration.backup_dir)?;
        let broadcast_filter = Arc::new(BroadcastFilter::new(self.configuration.broadcast_window));

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            self.on_commit_block,
            self.on_update_committed_prepare,
            self.on_propose,
            self.on_sign,
            self.on_commit,
            self.on_view_change,
            self.on_receive_prepare,
            self.on_receive_sign,
            self.on_receive_commit,
            self.on_receive_view_change,
            self.on_start_view,
            self.on_view_timeout,
        );

        let (event_publisher, event_subscriber) = if !event_handlers.is_empty() {
            Some(mpsc::channel()).unzip()
        } else {
            (None, None)
        };

        let engine = PBFTEngine::new(
            PBFTConfiguration::from(&self.configuration),
            self.network.clone(),
            Arc::clone(&broadcast_filter),
            self.ledger,
            backup,
            event_publisher,
        )?;

        let (poller_shutdown, poller_shutdown_receiver) = mpsc::channel();
        let (poller, pbft_msgs) = start_polling(self.network, poller_shutdown_receiver);

        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = Algorithm::new(
            engine,
            PBFTMessageStub::new(pbft_msgs, self.configuration.msg_buffer_capacity),
            self.configuration.tick_interval,
            algorithm_shutdown_receiver,
        )
        .start();

        let (event_bus, event_bus_shutdown) = match event_subscriber {
            Some(event_subscriber) => {
                let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
                let event_bus = start_event_bus(
                    event_handlers,
                    event_subscriber,
                    event_bus_shutdown_receiver,
                );
                (Some(event_bus), Some(event_bus_shutdown))
            }
            None => (None, None),
        };

        Ok(Replica {
            broadcast_filter,
            poller: Some(poller),
            poller_shutdown,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            event_bus_shutdown,
        })
    }
}

/// Enumerates the ways in which [starting](ReplicaSpec::start) a replica can fail.
#[derive(Debug, Error)]
pub enum StartReplicaError {
    #[error("failed to open the backup store: {0}")]
    Backup(#[from] BackupError),
}

impl From<PBFTError> for StartReplicaError {
    fn from(value: PBFTError) -> Self {
        match value {
            PBFTError::BackupError(err) => StartReplicaError::Backup(err),
        }
    }
}

/// A handle to the background threads of a pbft_rs replica. When this value is dropped, all background
/// threads are gracefully shut down.
pub struct Replica {
    broadcast_filter: Arc<BroadcastFilter>,
    poller: Option<JoinHandle<()>>,
    poller_shutdown: Sender<()>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    event_bus_shutdown: Option<Sender<()>>,
}

impl Replica {
    /// Returns the filter that records which peers have which messages.
    pub fn broadcast_filter(&self) -> &Arc<BroadcastFilter> {
        &self.broadcast_filter
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        // The order of thread shutdown matters: the event bus receives events from the algorithm thread,
        // which in turn receives messages from the poller, and each assumes that its source outlives it.

        if let Some(event_bus_shutdown) = self.event_bus_shutdown.take() {
            let _ = event_bus_shutdown.send(());
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }

        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            let _ = algorithm.join();
        }

        let _ = self.poller_shutdown.send(());
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
    }
}
