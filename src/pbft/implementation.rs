/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the PBFT protocol.
//!
//! Main type: [`PBFTEngine`].

use std::{
    collections::HashSet,
    sync::{mpsc::Sender, Arc},
    time::{Duration, Instant, SystemTime},
};

use borsh::BorshDeserialize;
use ed25519_dalek::VerifyingKey;

use crate::{
    backup::{BackupError, BackupStore, BACKUP_KEY_COMMITTED, BACKUP_KEY_LOCKED},
    events::{
        CommitBlockEvent, CommitEvent, Event, ProposeEvent, ReceiveCommitEvent,
        ReceivePrepareEvent, ReceiveSignEvent, ReceiveViewChangeEvent, SignEvent, StartViewEvent,
        UpdateCommittedPrepareEvent, ViewChangeEvent, ViewTimeoutEvent,
    },
    ledger::Ledger,
    networking::{
        broadcast_filter::BroadcastFilter,
        messages::Message,
        network::Network,
        sending::SenderHandle,
    },
    time_manager::TimeManager,
    types::{
        crypto_primitives::Keypair,
        data_types::{BlockHeight, ValidatorIndex, ViewNumber},
        encode,
        validator_set::ValidatorSet,
    },
};

use super::{
    messages::{CommitReq, PBFTMessage, PrepareReq, SignReq, ViewChangeReq},
    request_cache::RequestCache,
    roles::{account_type, is_leader, leader_index},
    types::{AccountType, EngineState, RoundState},
};

/// Immutable parameters of a [`PBFTEngine`].
#[derive(Clone)]
pub struct PBFTConfiguration {
    pub keypair: Keypair,
    pub validator_set: ValidatorSet,
    /// Target time between blocks. The view timeout is three times this.
    pub interval_block_time: Duration,
    /// If set, a leader with nothing to propose gives up its turn instead of proposing an empty block.
    pub omit_empty: bool,
}

/// A single participant in the PBFT protocol.
///
/// # Usage
///
/// After creating an instance of `PBFTEngine` using [`new`](Self::new), the caller interacts with it by
/// calling two methods:
/// 1. [`on_recv_pbft_message`](Self::on_recv_pbft_message) or [`on_receive_msg`](Self::on_receive_msg):
///    whenever a message is received from the network.
/// 2. [`tick`](Self::tick): *as often as is practical*. Ticking is what times out views and what makes
///    the leader propose.
///
/// The engine is not thread-safe. All calls must come from the same thread (in a
/// [`Replica`](crate::replica::Replica), the algorithm thread).
///
/// # Errors
///
/// Every method that can commit a block returns `Err` if the committed prepare could not be written to
/// the [`BackupStore`]. Continuing after such an error could make the node forget what it committed
/// to after a crash, so callers should stop the engine.
pub struct PBFTEngine<N: Network, L: Ledger, B: BackupStore> {
    config: PBFTConfiguration,
    state: EngineState,
    node_idx: Option<ValidatorIndex>,
    account_type: AccountType,
    request_cache: RequestCache,
    time_manager: TimeManager,
    sender: SenderHandle<N>,
    ledger: L,
    backup: B,
    event_publisher: Option<Sender<Event>>,
}

impl<N: Network, L: Ledger, B: BackupStore> PBFTEngine<N, L, B> {
    /// Create a new `PBFTEngine` that starts consensus on the block after the ledger's highest block.
    ///
    /// If `backup` holds a committed prepare from an earlier run, it is restored into the request
    /// cache's committed slot. A lock on a block at the height that consensus starts on is restored
    /// too.
    pub fn new(
        config: PBFTConfiguration,
        network: N,
        broadcast_filter: Arc<BroadcastFilter>,
        ledger: L,
        backup: B,
        event_publisher: Option<Sender<Event>>,
    ) -> Result<Self, PBFTError> {
        let state = EngineState::new(ledger.current_height(), ledger.highest_block_hash());
        let me = config.keypair.public();
        let node_idx = config.validator_set.position(&me);
        let account_type = account_type(&me, &config.validator_set);
        let time_manager = TimeManager::new(config.interval_block_time);

        let mut engine = Self {
            config,
            state,
            node_idx,
            account_type,
            request_cache: RequestCache::new(),
            time_manager,
            sender: SenderHandle::new(network, broadcast_filter),
            ledger,
            backup,
            event_publisher,
        };
        engine.reload_backup()?;

        log::info!(
            "Started PBFT engine at height {} as {:?} {:?}",
            engine.state.consensus_height,
            engine.account_type,
            engine.node_idx
        );
        Ok(engine)
    }

    /* ↓↓↓ Message intake ↓↓↓ */

    /// Decode `msg` and process it as if it had been received from `origin`.
    ///
    /// Returns whether the message was accepted.
    pub fn on_recv_pbft_message(
        &mut self,
        origin: &VerifyingKey,
        msg: &Message,
    ) -> Result<bool, PBFTError> {
        match PBFTMessage::try_from(msg) {
            Ok(pbft_msg) => self.on_receive_msg(origin, pbft_msg),
            Err(err) => {
                log::debug!(
                    "Rejected undecodable {:?} packet: {}",
                    err.packet_type,
                    err.reason
                );
                Ok(false)
            }
        }
    }

    /// Execute the required steps in the PBFT protocol upon receiving `msg` from the peer identified by
    /// `origin`.
    ///
    /// Returns whether the message was accepted. Messages for heights above the current consensus height
    /// are not accepted: the caller is expected to hold on to them until the engine gets there.
    pub fn on_receive_msg(
        &mut self,
        origin: &VerifyingKey,
        msg: PBFTMessage,
    ) -> Result<bool, PBFTError> {
        // 1. Observers do not take part in consensus.
        if self.account_type == AccountType::Observer {
            log::debug!("Observer ignored {:?}", msg.packet_type());
            return Ok(false);
        }

        // 2. Only validators may send consensus messages, and our own messages echoed back to us are
        //    of no use.
        if !self.config.validator_set.contains(origin) {
            log::debug!("Rejected {:?} from non-validator", msg.packet_type());
            return Ok(false);
        }
        if origin == &self.config.keypair.public() || Some(msg.idx()) == self.node_idx {
            return Ok(false);
        }

        // 3. The signer must be the validator at `msg.idx()`.
        let signer_is_correct = self
            .config
            .validator_set
            .get(msg.idx())
            .is_some_and(|signer| msg.is_correct(signer));
        if !signer_is_correct {
            log::debug!(
                "Rejected {:?} with bad index or signature, idx: {}",
                msg.packet_type(),
                msg.idx()
            );
            return Ok(false);
        }

        // 4. Messages for past heights can never be used again, but `origin` evidently has them.
        let packet_type = msg.packet_type();
        if msg.height() < self.state.consensus_height {
            self.sender
                .filter()
                .mark(origin, packet_type, &msg.signature().to_hex());
            return Ok(false);
        }
        if msg.height() > self.state.consensus_height {
            log::debug!(
                "Rejected {:?} for future height {}, current: {}",
                packet_type,
                msg.height(),
                self.state.consensus_height
            );
            return Ok(false);
        }

        // 5. Relay the message to the validators that do not have it yet.
        self.broadcast(msg.clone(), &HashSet::from([*origin]));

        // 6. Process the message.
        match msg {
            PBFTMessage::Prepare(prepare) => {
                Event::ReceivePrepare(ReceivePrepareEvent {
                    timestamp: SystemTime::now(),
                    origin: *origin,
                    prepare: prepare.clone(),
                })
                .publish(&self.event_publisher);
                self.handle_prepare_msg(prepare, false)
            }
            PBFTMessage::Sign(sign) => {
                Event::ReceiveSign(ReceiveSignEvent {
                    timestamp: SystemTime::now(),
                    origin: *origin,
                    sign: sign.clone(),
                })
                .publish(&self.event_publisher);
                self.handle_sign_msg(sign)
            }
            PBFTMessage::Commit(commit) => {
                Event::ReceiveCommit(ReceiveCommitEvent {
                    timestamp: SystemTime::now(),
                    origin: *origin,
                    commit: commit.clone(),
                })
                .publish(&self.event_publisher);
                self.handle_commit_msg(commit)
            }
            PBFTMessage::ViewChange(view_change) => {
                Event::ReceiveViewChange(ReceiveViewChangeEvent {
                    timestamp: SystemTime::now(),
                    origin: *origin,
                    view_change: view_change.clone(),
                })
                .publish(&self.event_publisher);
                self.handle_view_change_msg(view_change)
            }
        }
    }

    /* ↓↓↓ Prepare, sign, commit ↓↓↓ */

    /// Validate `req` and, if it is the first valid prepare of the current round, sign it.
    ///
    /// `self_generated` is set when the prepare was just created by this node as leader, in which case
    /// its block is not re-validated with the ledger.
    ///
    /// Returns whether the prepare was accepted, either for the current round or for a future view.
    pub fn handle_prepare_msg(
        &mut self,
        req: PrepareReq,
        self_generated: bool,
    ) -> Result<bool, PBFTError> {
        let Some(idx) = self.node_idx else {
            return Ok(false);
        };

        // 1. Check that the prepare is for the current height, comes from the leader of its view, and
        //    carries the block it claims to.
        if req.height != self.state.consensus_height
            || !is_leader(
                req.idx,
                req.view,
                self.state.highest_height(),
                &self.config.validator_set,
            )
            || req.block.hash != req.block_hash
            || req.block.height != req.height
            || !req.block.is_correct()
        {
            log::debug!(
                "Rejected invalid prepare, height: {}, view: {}, idx: {}",
                req.height,
                req.view,
                req.idx
            );
            return Ok(false);
        }

        // 2. Prepares for views we have not entered yet are kept until we do.
        if req.view < self.state.view {
            return Ok(false);
        }
        if req.view > self.state.view {
            self.request_cache.add_future_prepare(req);
            return Ok(true);
        }

        // 3. The first valid prepare of a round wins. A validator that asked to leave the view does not
        //    sign anything in it.
        if self.request_cache.is_exist_prepare(&req) {
            log::debug!("Rejected duplicate prepare for view {}", req.view);
            return Ok(false);
        }
        if self.state.to_view > self.state.view {
            log::debug!("Rejected prepare while changing view to {}", self.state.to_view);
            return Ok(false);
        }

        // 4. The block must extend the highest block, and be acceptable to the ledger.
        if req.block.parent != self.state.highest_block_hash
            || (!self_generated && !self.ledger.validate_block(&req.block))
        {
            log::debug!("Rejected prepare with unacceptable block {}", req.block_hash);
            return Ok(false);
        }

        // 5. Accept the prepare. A validator locked on another block at this height records it without
        //    signing, and votes to commit it only if a quorum of others signs it.
        self.request_cache.set_prepare_cache(req.clone());
        if self.request_cache.conflicts_with_lock(&req) {
            log::debug!(
                "Withheld sign for block {}, locked on another block at height {}",
                req.block_hash,
                req.height
            );
            self.check_sign_quorum()?;
            self.check_and_commit()?;
            return Ok(true);
        }
        self.state.round_state = RoundState::Prepared;

        let sign = SignReq::new(&self.config.keypair, &req, idx);
        self.request_cache.add_sign(sign.clone());
        self.broadcast(sign.clone().into(), &HashSet::new());
        self.time_manager.update_sign_time(Instant::now());
        Event::Sign(SignEvent {
            timestamp: SystemTime::now(),
            sign,
        })
        .publish(&self.event_publisher);

        // 6. Signs and commits may have arrived before the prepare.
        self.check_sign_quorum()?;
        self.check_and_commit()?;
        Ok(true)
    }

    fn handle_sign_msg(&mut self, req: SignReq) -> Result<bool, PBFTError> {
        if req.view < self.state.view || self.request_cache.is_exist_sign(&req) {
            return Ok(false);
        }

        let prepare_hash = self
            .request_cache
            .prepare_for_round(req.height, req.view)
            .map(|prepare| prepare.block_hash);
        match prepare_hash {
            Some(hash) if hash != req.block_hash => {
                log::debug!("Rejected sign for conflicting block {}", req.block_hash);
                Ok(false)
            }
            Some(_) => {
                self.request_cache.add_sign(req);
                self.check_sign_quorum()?;
                self.check_and_commit()?;
                Ok(true)
            }
            // The prepare has not arrived yet, or the sign is for a future view.
            None => {
                self.request_cache.add_sign(req);
                Ok(true)
            }
        }
    }

    fn handle_commit_msg(&mut self, req: CommitReq) -> Result<bool, PBFTError> {
        if req.view < self.state.view || self.request_cache.is_exist_commit(&req) {
            return Ok(false);
        }

        let prepare_hash = self
            .request_cache
            .prepare_for_round(req.height, req.view)
            .map(|prepare| prepare.block_hash);
        match prepare_hash {
            Some(hash) if hash != req.block_hash => {
                log::debug!("Rejected commit for conflicting block {}", req.block_hash);
                Ok(false)
            }
            Some(_) => {
                self.request_cache.add_commit(req);
                self.check_and_commit()?;
                Ok(true)
            }
            None => {
                self.request_cache.add_commit(req);
                Ok(true)
            }
        }
    }

    /// If a quorum of validators signed the current round's prepare, lock on its block and send our
    /// commit vote (once).
    fn check_sign_quorum(&mut self) -> Result<(), PBFTError> {
        let Some(idx) = self.node_idx else {
            return Ok(());
        };
        if !matches!(
            self.state.round_state,
            RoundState::Idle | RoundState::Prepared
        ) || self.state.to_view != self.state.view
        {
            return Ok(());
        }
        let Some(prepare) = self
            .request_cache
            .prepare_for_round(self.state.consensus_height, self.state.view)
            .cloned()
        else {
            return Ok(());
        };

        let signs = self
            .request_cache
            .sig_cache_size(prepare.height, prepare.view, &prepare.block_hash);
        if signs < self.min_valid() {
            return Ok(());
        }

        // A sign quorum in a later view moves the lock. The lock is persisted before the commit leaves.
        self.request_cache.lock_prepare(prepare.clone());
        self.backup.write(BACKUP_KEY_LOCKED, &encode(&prepare))?;

        let commit = CommitReq::new(&self.config.keypair, &prepare, idx);
        self.request_cache.add_commit(commit.clone());
        self.broadcast(commit.clone().into(), &HashSet::new());
        self.state.round_state = RoundState::ReadyToCommit;
        Event::Commit(CommitEvent {
            timestamp: SystemTime::now(),
            commit,
        })
        .publish(&self.event_publisher);
        Ok(())
    }

    /// If a quorum of validators committed the current round's prepare, persist it and append its block
    /// to the ledger.
    ///
    /// Nothing happens if the raw prepare is not for the current view and height.
    ///
    /// Returns whether a block was appended.
    pub fn check_and_commit(&mut self) -> Result<bool, PBFTError> {
        let Some(prepare) = self.request_cache.raw_prepare_cache().cloned() else {
            return Ok(false);
        };
        if prepare.view != self.state.view || prepare.height != self.state.consensus_height {
            return Ok(false);
        }
        let commits =
            self.request_cache
                .commit_cache_size(prepare.height, prepare.view, &prepare.block_hash);
        if commits < self.min_valid() {
            return Ok(false);
        }

        // 1. Persist the prepare before touching the ledger, so that a crash in between leaves a record
        //    of what was committed.
        self.request_cache.update_committed_prepare();
        self.backup.write(BACKUP_KEY_COMMITTED, &encode(&prepare))?;
        Event::UpdateCommittedPrepare(UpdateCommittedPrepareEvent {
            timestamp: SystemTime::now(),
            prepare: prepare.clone(),
        })
        .publish(&self.event_publisher);

        // 2. Append the block.
        match self.ledger.submit(prepare.block.clone()) {
            Ok(()) => {
                self.on_block_committed(&prepare);
                Ok(true)
            }
            Err(err) => {
                log::warn!(
                    "Ledger refused block {} at height {}: {}",
                    prepare.block_hash,
                    prepare.height,
                    err
                );
                self.resync_with_ledger();
                Ok(false)
            }
        }
    }

    /// Move on to the height after the block of `prepare`.
    fn on_block_committed(&mut self, prepare: &PrepareReq) {
        let now = Instant::now();

        self.state.round_state = RoundState::Committed;
        Event::CommitBlock(CommitBlockEvent {
            timestamp: SystemTime::now(),
            block: prepare.block_hash,
            height: prepare.height,
            view: prepare.view,
        })
        .publish(&self.event_publisher);

        self.state.consensus_height = prepare.height + 1;
        self.state.highest_block_hash = prepare.block_hash;
        self.state.view = ViewNumber::init();
        self.state.to_view = ViewNumber::init();
        self.state.fast_view_change = false;

        self.time_manager.reset_change_cycle();
        self.time_manager.update_consensus_time(now);
        self.time_manager.update_exec_finish_time(now);
        self.request_cache.clear_all();
        self.request_cache
            .collect_garbage(self.state.consensus_height);

        self.start_view();
    }

    /// Re-read the end of the chain from the ledger, and abandon the current round.
    fn resync_with_ledger(&mut self) {
        let ledger_height = self.ledger.current_height();
        if ledger_height + 1 != self.state.consensus_height {
            self.state.consensus_height = ledger_height + 1;
            self.state.view = ViewNumber::init();
            self.state.to_view = ViewNumber::init();
            self.state.fast_view_change = false;
            self.time_manager.reset_change_cycle();
        }
        self.state.highest_block_hash = self.ledger.highest_block_hash();
        self.request_cache.clear_all();
        self.request_cache
            .collect_garbage(self.state.consensus_height);
        self.state.round_state = RoundState::Idle;
    }

    /* ↓↓↓ View change ↓↓↓ */

    fn handle_view_change_msg(&mut self, req: ViewChangeReq) -> Result<bool, PBFTError> {
        // 1. Only requests to move forward from the current view, at the current height, count.
        if req.height != self.state.consensus_height
            || req.view <= self.state.view
            || req.block_hash != self.state.highest_block_hash
        {
            log::debug!(
                "Ignored view change to {} at height {}",
                req.view,
                req.height
            );
            return Ok(false);
        }
        if self.request_cache.is_exist_view_change(&req) {
            return Ok(false);
        }
        self.request_cache.add_view_change(req);

        // 2. If at least f + 1 validators are already past our target view, at least one honest
        //    validator is, so join them without waiting for our own timeout.
        let (ahead, min_view) = self
            .request_cache
            .future_view_changes(self.state.consensus_height, self.state.to_view);
        if ahead > self.f() && !self.state.fast_view_change {
            if let Some(min_view) = min_view {
                self.state.to_view = min_view - 1;
                self.state.fast_view_change = true;
            }
        }

        // 3. Adopt a view that a quorum agrees on.
        self.check_and_change_view()?;
        Ok(true)
    }

    /// Ask to move to the view after `to_view`.
    fn change_view(&mut self, now: Instant) -> Result<(), PBFTError> {
        let Some(idx) = self.node_idx else {
            return Ok(());
        };
        let timeout = self.time_manager.current_view_timeout();

        // 1. Advance the target view and back off the timeout.
        self.state.fast_view_change = false;
        self.state.to_view += 1;
        self.state.round_state = RoundState::ViewChanging;
        self.time_manager.update_change_cycle();
        self.time_manager.update_consensus_time(now);
        Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view: self.state.view,
            to_view: self.state.to_view,
            timeout,
        })
        .publish(&self.event_publisher);

        // 2. Record and broadcast our request.
        let view_change = ViewChangeReq::new(
            &self.config.keypair,
            self.state.consensus_height,
            self.state.to_view,
            idx,
            self.state.highest_block_hash,
        );
        self.request_cache.add_view_change(view_change.clone());
        self.broadcast(view_change.clone().into(), &HashSet::new());
        Event::ViewChange(ViewChangeEvent {
            timestamp: SystemTime::now(),
            view_change,
        })
        .publish(&self.event_publisher);

        // 3. Our request may be the last one needed for a quorum.
        self.check_and_change_view()
    }

    fn check_and_change_view(&mut self) -> Result<(), PBFTError> {
        let quorum_view = self.request_cache.view_change_quorum_view(
            self.state.consensus_height,
            self.state.view,
            self.min_valid(),
        );
        match quorum_view {
            Some(new_view) => self.enter_view(new_view),
            None => Ok(()),
        }
    }

    /// Enter `new_view`, abandoning whatever round was in progress.
    fn enter_view(&mut self, new_view: ViewNumber) -> Result<(), PBFTError> {
        log::debug!(
            "Changing view from {} to {} at height {}",
            self.state.view,
            new_view,
            self.state.consensus_height
        );
        let now = Instant::now();

        // 1. Reset the round.
        self.state.view = new_view;
        self.state.to_view = new_view;
        self.state.fast_view_change = false;
        self.request_cache
            .remove_invalid_votes(self.state.consensus_height, new_view);
        self.time_manager.reset_change_cycle();
        self.time_manager.update_consensus_time(now);
        self.start_view();

        // 2. Pick up the prepare of the new view if it arrived early, or propose it ourselves.
        if let Some(prepare) = self
            .request_cache
            .take_future_prepare(self.state.consensus_height, new_view)
        {
            self.handle_prepare_msg(prepare, false)?;
        }
        self.try_propose(now)
    }

    /// Enter the `Idle` state of the current `(height, view)`.
    fn start_view(&mut self) {
        self.state.round_state = RoundState::Idle;
        let leader = leader_index(
            self.state.view,
            self.state.highest_height(),
            &self.config.validator_set,
        )
        .and_then(|idx| self.config.validator_set.get(idx).copied());
        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            leader,
            height: self.state.consensus_height,
            view: self.state.view,
        })
        .publish(&self.event_publisher);
    }

    /* ↓↓↓ Clock ↓↓↓ */

    /// Cause the engine to check the current time, possibly changing view or proposing a block.
    pub fn tick(&mut self) -> Result<(), PBFTError> {
        self.tick_at(Instant::now())
    }

    /// Same as [`tick`](Self::tick), with the current time supplied by the caller.
    pub fn tick_at(&mut self, now: Instant) -> Result<(), PBFTError> {
        // 1. Drop cache entries that can never be used again.
        if self.time_manager.should_collect_garbage(now) {
            self.request_cache
                .collect_garbage(self.state.consensus_height);
            self.sender.filter().collect_garbage();
            self.time_manager.record_garbage_collection(now);
        }

        if self.account_type == AccountType::Observer {
            return Ok(());
        }

        // 2. Ask to change view if the current one timed out, or if enough validators are ahead of us.
        if self.state.fast_view_change || self.time_manager.is_timeout_at(now) {
            return self.change_view(now);
        }

        // 3. Propose if we lead the current round.
        self.try_propose(now)
    }

    /// Propose a block if this node is the leader of an `Idle` round that has no prepare yet.
    fn try_propose(&mut self, now: Instant) -> Result<(), PBFTError> {
        let Some(idx) = self.node_idx else {
            return Ok(());
        };
        if self.state.round_state != RoundState::Idle
            || self.state.to_view != self.state.view
            || !is_leader(
                idx,
                self.state.view,
                self.state.highest_height(),
                &self.config.validator_set,
            )
            || self
                .request_cache
                .prepare_for_round(self.state.consensus_height, self.state.view)
                .is_some()
        {
            return Ok(());
        }

        // A leader locked on a block may have voted to commit it, so it proposes that block again.
        let block = match self
            .request_cache
            .locked_prepare(self.state.consensus_height)
        {
            Some(locked) => {
                log::debug!(
                    "Re-proposing locked block {} in view {}",
                    locked.block_hash,
                    self.state.view
                );
                locked.block.clone()
            }
            None => {
                let block = self
                    .ledger
                    .produce_block(self.state.consensus_height, self.state.highest_block_hash);
                if block.is_empty() {
                    if !self.time_manager.is_time_to_seal_empty(now) {
                        return Ok(());
                    }
                    if self.config.omit_empty {
                        // Hand the turn to the next leader instead of sealing an empty block.
                        log::debug!(
                            "Skipping empty block at height {}, view {}",
                            self.state.consensus_height,
                            self.state.view
                        );
                        self.state.fast_view_change = true;
                        return Ok(());
                    }
                }
                block
            }
        };

        let prepare = PrepareReq::new(&self.config.keypair, self.state.view, idx, block);
        self.broadcast(prepare.clone().into(), &HashSet::new());
        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            prepare: prepare.clone(),
        })
        .publish(&self.event_publisher);
        self.handle_prepare_msg(prepare, true)?;
        Ok(())
    }

    /* ↓↓↓ Configuration and recovery ↓↓↓ */

    /// Replace the validator set, recomputing this node's index and account type.
    pub fn reset_config(&mut self, validator_set: ValidatorSet) {
        let me = self.config.keypair.public();
        self.node_idx = validator_set.position(&me);
        self.account_type = account_type(&me, &validator_set);
        self.sender.init_validator_set(validator_set.clone());
        self.config.validator_set = validator_set;
        log::info!(
            "Reset validator set, n: {}, f: {}, idx: {:?}",
            self.config.validator_set.len(),
            self.f(),
            self.node_idx
        );
    }

    /// Restore the committed prepare slot and the lock from the backup store.
    fn reload_backup(&mut self) -> Result<(), PBFTError> {
        if let Some(committed) = self.read_backup(BACKUP_KEY_COMMITTED)? {
            log::info!(
                "Reloaded committed prepare, height: {}, view: {}",
                committed.height,
                committed.view
            );
            self.request_cache.set_committed_prepare(committed);
        }
        if let Some(locked) = self.read_backup(BACKUP_KEY_LOCKED)? {
            if locked.height == self.state.consensus_height {
                log::info!(
                    "Reloaded lock on block {} at height {}",
                    locked.block_hash,
                    locked.height
                );
                self.request_cache.lock_prepare(locked);
            }
        }
        Ok(())
    }

    fn read_backup(&self, key: &[u8]) -> Result<Option<PrepareReq>, PBFTError> {
        match self.backup.read(key)? {
            Some(bytes) => PrepareReq::try_from_slice(&bytes)
                .map(Some)
                .map_err(|err| BackupError::Corrupted(err.to_string()).into()),
            None => Ok(None),
        }
    }

    fn broadcast(&mut self, msg: PBFTMessage, exclude: &HashSet<VerifyingKey>) {
        let packet_type = msg.packet_type();
        let sent = self
            .sender
            .broadcast_msg(&self.config.validator_set, msg, exclude);
        log::trace!("Broadcast {:?} to {} peers", packet_type, sent);
    }

    /* ↓↓↓ Accessors ↓↓↓ */

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn view(&self) -> ViewNumber {
        self.state.view
    }

    /// Set the current view, and the target view along with it.
    pub fn set_view(&mut self, view: ViewNumber) {
        self.state.view = view;
        self.state.to_view = view;
    }

    pub fn to_view(&self) -> ViewNumber {
        self.state.to_view
    }

    pub fn consensus_height(&self) -> BlockHeight {
        self.state.consensus_height
    }

    pub fn round_state(&self) -> RoundState {
        self.state.round_state
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn node_idx(&self) -> Option<ValidatorIndex> {
        self.node_idx
    }

    pub fn validator_set(&self) -> &ValidatorSet {
        &self.config.validator_set
    }

    pub fn min_valid(&self) -> usize {
        self.config.validator_set.min_valid()
    }

    pub fn f(&self) -> usize {
        self.config.validator_set.f()
    }

    pub fn request_cache(&self) -> &RequestCache {
        &self.request_cache
    }

    #[cfg(test)]
    pub(crate) fn request_cache_mut(&mut self) -> &mut RequestCache {
        &mut self.request_cache
    }

    pub fn time_manager(&self) -> &TimeManager {
        &self.time_manager
    }

    pub fn broadcast_filter(&self) -> &Arc<BroadcastFilter> {
        self.sender.filter()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn backup(&self) -> &B {
        &self.backup
    }
}

/// Enumerates the ways in which the [`PBFTEngine`] can fail.
#[derive(Debug)]
pub enum PBFTError {
    /// The committed prepare could not be written to, or read from, the backup store.
    BackupError(BackupError),
}

impl From<BackupError> for PBFTError {
    fn from(value: BackupError) -> Self {
        PBFTError::BackupError(value)
    }
}
