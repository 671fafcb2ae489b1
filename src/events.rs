/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of the events that a replica emits, for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Events are published by
//! the algorithm thread into a channel, and consumed by the event bus thread, which invokes the
//! handlers registered through [`ReplicaSpec`](crate::replica::ReplicaSpec) as well as, if
//! [enabled](crate::replica::Configuration::log_events), the default loggers in
//! [`logging`](crate::logging).

use std::{
    sync::mpsc::Sender,
    time::{Duration, SystemTime},
};

use ed25519_dalek::VerifyingKey;

use crate::{
    pbft::messages::{CommitReq, PrepareReq, SignReq, ViewChangeReq},
    types::data_types::{BlockHeight, CryptoHash, ViewNumber},
};

pub enum Event {
    // Events that change persistent state.
    CommitBlock(CommitBlockEvent),
    UpdateCommittedPrepare(UpdateCommittedPrepareEvent),
    // Events that involve broadcasting a PBFT message.
    Propose(ProposeEvent),
    Sign(SignEvent),
    Commit(CommitEvent),
    ViewChange(ViewChangeEvent),
    // Events that involve receiving a PBFT message.
    ReceivePrepare(ReceivePrepareEvent),
    ReceiveSign(ReceiveSignEvent),
    ReceiveCommit(ReceiveCommitEvent),
    ReceiveViewChange(ReceiveViewChangeEvent),
    // View events.
    StartView(StartViewEvent),
    ViewTimeout(ViewTimeoutEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            // The event bus is shut down before the algorithm thread, so a send can only fail during
            // shutdown, when the event is of no use to anybody.
            let _ = event_publisher.send(self);
        }
    }
}

/// A block was appended to the ledger.
pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub block: CryptoHash,
    pub height: BlockHeight,
    pub view: ViewNumber,
}

/// The prepare that reached a commit quorum was written to the backup store.
pub struct UpdateCommittedPrepareEvent {
    pub timestamp: SystemTime,
    pub prepare: PrepareReq,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub prepare: PrepareReq,
}

pub struct SignEvent {
    pub timestamp: SystemTime,
    pub sign: SignReq,
}

pub struct CommitEvent {
    pub timestamp: SystemTime,
    pub commit: CommitReq,
}

pub struct ViewChangeEvent {
    pub timestamp: SystemTime,
    pub view_change: ViewChangeReq,
}

pub struct ReceivePrepareEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub prepare: PrepareReq,
}

pub struct ReceiveSignEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub sign: SignReq,
}

pub struct ReceiveCommitEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub commit: CommitReq,
}

pub struct ReceiveViewChangeEvent {
    pub timestamp: SystemTime,
    pub origin: VerifyingKey,
    pub view_change: ViewChangeReq,
}

/// The replica entered a new view, either by agreeing on a view change or by advancing to a new height.
pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub leader: Option<VerifyingKey>,
    pub height: BlockHeight,
    pub view: ViewNumber,
}

/// The current view timed out, and the replica asked to move to `to_view`.
pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub to_view: ViewNumber,
    pub timeout: Duration,
}
