/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! In-memory store of the PBFT messages of the current round.
//!
//! ## Votes
//!
//! Sign, commit and view-change votes are each kept in a map from the voter's [`ValidatorIndex`] to the
//! most recent vote of that kind the voter sent. A later vote from the same validator replaces the
//! earlier one, so no validator is ever counted twice towards a quorum. Entries are never mutated in
//! place: a new vote is a new value placed into the validator's slot.
//!
//! Quorum queries count the entries that match a particular `(height, view, block_hash)`, which means
//! that votes for a different round can sit in the cache without being counted.
//!
//! ## Prepare slots
//!
//! The cache holds two prepare slots:
//! 1. The **raw** slot, holding the proposal accepted for the current round.
//! 2. The **committed** slot, holding the last proposal that reached a commit quorum. This is the only
//!    part of the cache that is written to the [`BackupStore`](crate::backup::BackupStore), and is
//!    restored from it on start-up.
//!
//! Prepares for the current height but a future view are parked in a separate future-prepare slot
//! until the engine enters that view.
//!
//! ## Lock
//!
//! A validator that sends a commit vote for a block has seen a quorum sign it, and from then on is
//! locked on that block for the rest of the height: it signs no other block at that height, and
//! re-proposes the locked block whenever it leads a later view. The lock survives view changes, and
//! moves only to a block that a quorum signed in a later view.

use std::collections::HashMap;

use crate::types::data_types::{BlockHeight, CryptoHash, ValidatorIndex, ViewNumber};

use super::messages::{CommitReq, PrepareReq, SignReq, ViewChangeReq};

#[derive(Default)]
pub struct RequestCache {
    raw_prepare_cache: Option<PrepareReq>,
    committed_prepare_cache: Option<PrepareReq>,
    locked_prepare_cache: Option<PrepareReq>,
    future_prepare_cache: HashMap<BlockHeight, PrepareReq>,
    sign_cache: HashMap<ValidatorIndex, SignReq>,
    commit_cache: HashMap<ValidatorIndex, CommitReq>,
    view_change_cache: HashMap<ValidatorIndex, ViewChangeReq>,
}

impl RequestCache {
    pub fn new() -> RequestCache {
        Self::default()
    }

    /* ↓↓↓ Prepare slots ↓↓↓ */

    /// Replace the raw prepare slot with `req`.
    pub fn set_prepare_cache(&mut self, req: PrepareReq) {
        self.raw_prepare_cache = Some(req)
    }

    /// Copy the raw prepare slot into the committed prepare slot.
    pub fn update_committed_prepare(&mut self) {
        self.committed_prepare_cache = self.raw_prepare_cache.clone()
    }

    /// Restore the committed prepare slot, e.g., from the backup store on start-up.
    pub fn set_committed_prepare(&mut self, req: PrepareReq) {
        self.committed_prepare_cache = Some(req)
    }

    pub fn raw_prepare_cache(&self) -> Option<&PrepareReq> {
        self.raw_prepare_cache.as_ref()
    }

    pub fn committed_prepare_cache(&self) -> Option<&PrepareReq> {
        self.committed_prepare_cache.as_ref()
    }

    /// Lock on the block of `req`, replacing any earlier lock.
    pub fn lock_prepare(&mut self, req: PrepareReq) {
        self.locked_prepare_cache = Some(req)
    }

    /// Get the prepare this node is locked on at `height`, if any.
    pub fn locked_prepare(&self, height: BlockHeight) -> Option<&PrepareReq> {
        self.locked_prepare_cache
            .as_ref()
            .filter(|locked| locked.height == height)
    }

    /// Check whether signing the block of `req` would go against the lock held at its height.
    pub fn conflicts_with_lock(&self, req: &PrepareReq) -> bool {
        self.locked_prepare(req.height)
            .is_some_and(|locked| !locked.same_block(req))
    }

    /// Check whether a prepare has already been accepted for the round `(req.height, req.view)`.
    pub fn is_exist_prepare(&self, req: &PrepareReq) -> bool {
        self.prepare_for_round(req.height, req.view).is_some()
    }

    /// Get the prepare accepted for the round `(height, view)`, if any.
    pub fn prepare_for_round(&self, height: BlockHeight, view: ViewNumber) -> Option<&PrepareReq> {
        self.raw_prepare_cache
            .as_ref()
            .filter(|prepare| prepare.height == height && prepare.view == view)
    }

    /// Park a prepare for a view that the engine has not entered yet. Of two parked prepares for the
    /// same height, the one with the higher view is kept.
    pub fn add_future_prepare(&mut self, req: PrepareReq) {
        match self.future_prepare_cache.get(&req.height) {
            Some(parked) if parked.view >= req.view => (),
            _ => {
                self.future_prepare_cache.insert(req.height, req);
            }
        }
    }

    /// Take the parked prepare for `height` if it was sent for `view`.
    pub fn take_future_prepare(
        &mut self,
        height: BlockHeight,
        view: ViewNumber,
    ) -> Option<PrepareReq> {
        if self
            .future_prepare_cache
            .get(&height)
            .is_some_and(|parked| parked.view == view)
        {
            self.future_prepare_cache.remove(&height)
        } else {
            None
        }
    }

    /* ↓↓↓ Votes ↓↓↓ */

    pub fn add_sign(&mut self, req: SignReq) {
        self.sign_cache.insert(req.idx, req);
    }

    pub fn add_commit(&mut self, req: CommitReq) {
        self.commit_cache.insert(req.idx, req);
    }

    pub fn add_view_change(&mut self, req: ViewChangeReq) {
        self.view_change_cache.insert(req.idx, req);
    }

    /// Check whether the sender of `req` has already been recorded signing the same block in the same
    /// round.
    pub fn is_exist_sign(&self, req: &SignReq) -> bool {
        self.sign_cache.get(&req.idx).is_some_and(|cached| {
            cached.height == req.height
                && cached.view == req.view
                && cached.block_hash == req.block_hash
        })
    }

    /// Check whether the sender of `req` has already been recorded committing the same block in the
    /// same round.
    pub fn is_exist_commit(&self, req: &CommitReq) -> bool {
        self.commit_cache.get(&req.idx).is_some_and(|cached| {
            cached.height == req.height
                && cached.view == req.view
                && cached.block_hash == req.block_hash
        })
    }

    /// Check whether the sender of `req` has already been recorded asking for the same view at the same
    /// height.
    pub fn is_exist_view_change(&self, req: &ViewChangeReq) -> bool {
        self.view_change_cache
            .get(&req.idx)
            .is_some_and(|cached| cached.height == req.height && cached.view == req.view)
    }

    /// Count the sign votes for the block `hash` in the round `(height, view)`.
    pub fn sig_cache_size(&self, height: BlockHeight, view: ViewNumber, hash: &CryptoHash) -> usize {
        self.sign_cache
            .values()
            .filter(|req| req.height == height && req.view == view && &req.block_hash == hash)
            .count()
    }

    /// Count the commit votes for the block `hash` in the round `(height, view)`.
    pub fn commit_cache_size(
        &self,
        height: BlockHeight,
        view: ViewNumber,
        hash: &CryptoHash,
    ) -> usize {
        self.commit_cache
            .values()
            .filter(|req| req.height == height && req.view == view && &req.block_hash == hash)
            .count()
    }

    /// Count the validators asking to move to `view` at `height`.
    pub fn view_change_size(&self, height: BlockHeight, view: ViewNumber) -> usize {
        self.view_change_cache
            .values()
            .filter(|req| req.height == height && req.view == view)
            .count()
    }

    /// Get the highest view above `above` that at least `quorum` validators ask to move to at `height`.
    pub fn view_change_quorum_view(
        &self,
        height: BlockHeight,
        above: ViewNumber,
        quorum: usize,
    ) -> Option<ViewNumber> {
        let mut counts: HashMap<ViewNumber, usize> = HashMap::new();
        for req in self.view_change_cache.values() {
            if req.height == height && req.view > above {
                *counts.entry(req.view).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= quorum)
            .map(|(view, _)| view)
            .max()
    }

    /// Count the validators asking for some view above `above` at `height`, and the lowest view any of
    /// them asks for.
    pub fn future_view_changes(
        &self,
        height: BlockHeight,
        above: ViewNumber,
    ) -> (usize, Option<ViewNumber>) {
        let views: Vec<ViewNumber> = self
            .view_change_cache
            .values()
            .filter(|req| req.height == height && req.view > above)
            .map(|req| req.view)
            .collect();
        (views.len(), views.into_iter().min())
    }

    /// Drop all sign, commit, and view-change votes. The prepare slots are left untouched.
    pub fn clear_all(&mut self) {
        self.sign_cache.clear();
        self.commit_cache.clear();
        self.view_change_cache.clear();
    }

    /// Drop the votes that cannot count any more once the engine has entered `view` at `height`. Votes
    /// for `view` itself that arrived before the engine entered it are kept.
    pub fn remove_invalid_votes(&mut self, height: BlockHeight, view: ViewNumber) {
        self.sign_cache
            .retain(|_, req| req.height == height && req.view >= view);
        self.commit_cache
            .retain(|_, req| req.height == height && req.view >= view);
        self.view_change_cache
            .retain(|_, req| req.height == height && req.view > view);
    }

    /// Drop cached messages that are for heights below `height`, which can never be used again. A lock
    /// on a block below `height` is released.
    pub fn collect_garbage(&mut self, height: BlockHeight) {
        if self
            .locked_prepare_cache
            .as_ref()
            .is_some_and(|locked| locked.height < height)
        {
            self.locked_prepare_cache = None;
        }
        self.sign_cache.retain(|_, req| req.height >= height);
        self.commit_cache.retain(|_, req| req.height >= height);
        self.view_change_cache.retain(|_, req| req.height >= height);
        self.future_prepare_cache
            .retain(|parked_height, _| *parked_height >= height);
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::types::{block::Block, crypto_primitives::Keypair, data_types::Data};

    fn keypairs(n: usize) -> Vec<Keypair> {
        let mut csprg = OsRng {};
        (0..n)
            .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
            .collect()
    }

    fn prepare(keypair: &Keypair, height: u64, view: u64) -> PrepareReq {
        let block = Block::new(BlockHeight::new(height), Block::genesis().hash, Data::default());
        PrepareReq::new(keypair, ViewNumber::new(view), ValidatorIndex::new(0), block)
    }

    #[test]
    fn later_vote_from_same_validator_replaces_earlier_one() {
        let keypairs = keypairs(2);
        let prepare_a = prepare(&keypairs[0], 1, 0);
        let prepare_b = prepare(&keypairs[0], 1, 1);
        let mut cache = RequestCache::new();

        cache.add_sign(SignReq::new(&keypairs[1], &prepare_a, ValidatorIndex::new(1)));
        cache.add_sign(SignReq::new(&keypairs[1], &prepare_a, ValidatorIndex::new(1)));
        assert_eq!(
            cache.sig_cache_size(prepare_a.height, prepare_a.view, &prepare_a.block_hash),
            1
        );

        let vote_b = SignReq::new(&keypairs[1], &prepare_b, ValidatorIndex::new(1));
        cache.add_sign(vote_b.clone());
        assert!(cache.is_exist_sign(&vote_b));
        assert_eq!(
            cache.sig_cache_size(prepare_a.height, prepare_a.view, &prepare_a.block_hash),
            0
        );
        assert_eq!(
            cache.sig_cache_size(prepare_b.height, prepare_b.view, &prepare_b.block_hash),
            1
        );
    }

    #[test]
    fn commit_count_only_matches_same_round_and_block() {
        let keypairs = keypairs(4);
        let prepare = prepare(&keypairs[0], 1, 0);
        let other_prepare = {
            let block = Block::new(BlockHeight::new(1), prepare.block_hash, Data::default());
            PrepareReq::new(&keypairs[0], ViewNumber::init(), ValidatorIndex::new(0), block)
        };
        let mut cache = RequestCache::new();

        for (i, keypair) in keypairs.iter().enumerate().take(3) {
            cache.add_commit(CommitReq::new(keypair, &prepare, ValidatorIndex::from(i)));
        }
        cache.add_commit(CommitReq::new(&keypairs[3], &other_prepare, ValidatorIndex::new(3)));

        assert_eq!(
            cache.commit_cache_size(prepare.height, prepare.view, &prepare.block_hash),
            3
        );
        assert_eq!(
            cache.commit_cache_size(prepare.height, prepare.view + 1, &prepare.block_hash),
            0
        );
    }

    #[test]
    fn committed_slot_tracks_raw_slot_only_when_updated() {
        let keypairs = keypairs(1);
        let mut cache = RequestCache::new();
        let first = prepare(&keypairs[0], 1, 0);

        cache.set_prepare_cache(first.clone());
        assert!(cache.committed_prepare_cache().is_none());
        assert!(cache.is_exist_prepare(&first));

        cache.update_committed_prepare();
        assert_eq!(cache.raw_prepare_cache(), cache.committed_prepare_cache());

        cache.set_prepare_cache(prepare(&keypairs[0], 2, 0));
        assert_ne!(cache.raw_prepare_cache(), cache.committed_prepare_cache());

        // Clearing the votes does not touch either prepare slot.
        cache.clear_all();
        assert_eq!(cache.committed_prepare_cache(), Some(&first));
    }

    #[test]
    fn view_change_quorum_picks_highest_view_with_quorum() {
        let keypairs = keypairs(4);
        let height = BlockHeight::new(1);
        let mut cache = RequestCache::new();
        let hash = Block::genesis().hash;

        for i in 0..3 {
            cache.add_view_change(ViewChangeReq::new(
                &keypairs[i],
                height,
                ViewNumber::new(1),
                ValidatorIndex::from(i),
                hash,
            ));
        }
        assert_eq!(cache.view_change_size(height, ViewNumber::new(1)), 3);
        assert_eq!(
            cache.view_change_quorum_view(height, ViewNumber::init(), 3),
            Some(ViewNumber::new(1))
        );
        assert_eq!(
            cache.view_change_quorum_view(height, ViewNumber::new(1), 3),
            None
        );

        cache.add_view_change(ViewChangeReq::new(
            &keypairs[3],
            height,
            ViewNumber::new(2),
            ValidatorIndex::new(3),
            hash,
        ));
        assert_eq!(
            cache.future_view_changes(height, ViewNumber::init()),
            (4, Some(ViewNumber::new(1)))
        );
        assert_eq!(
            cache.future_view_changes(height, ViewNumber::new(1)),
            (1, Some(ViewNumber::new(2)))
        );
    }

    #[test]
    fn future_prepare_is_returned_only_for_its_view() {
        let keypairs = keypairs(1);
        let mut cache = RequestCache::new();
        let parked = prepare(&keypairs[0], 1, 2);

        cache.add_future_prepare(parked.clone());
        cache.add_future_prepare(prepare(&keypairs[0], 1, 1));
        assert!(cache
            .take_future_prepare(BlockHeight::new(1), ViewNumber::new(1))
            .is_none());
        assert_eq!(
            cache.take_future_prepare(BlockHeight::new(1), ViewNumber::new(2)),
            Some(parked)
        );
        assert!(cache
            .take_future_prepare(BlockHeight::new(1), ViewNumber::new(2))
            .is_none());
    }

    #[test]
    fn entering_a_view_keeps_its_early_votes() {
        let keypairs = keypairs(3);
        let height = BlockHeight::new(1);
        let old_round = prepare(&keypairs[0], 1, 0);
        let new_round = prepare(&keypairs[0], 1, 1);
        let mut cache = RequestCache::new();

        cache.add_sign(SignReq::new(&keypairs[0], &old_round, ValidatorIndex::new(0)));
        cache.add_sign(SignReq::new(&keypairs[1], &new_round, ValidatorIndex::new(1)));
        cache.add_commit(CommitReq::new(&keypairs[2], &old_round, ValidatorIndex::new(2)));
        cache.add_view_change(ViewChangeReq::new(
            &keypairs[2],
            height,
            ViewNumber::new(1),
            ValidatorIndex::new(2),
            Block::genesis().hash,
        ));

        cache.remove_invalid_votes(height, ViewNumber::new(1));
        assert_eq!(
            cache.sig_cache_size(height, old_round.view, &old_round.block_hash),
            0
        );
        assert_eq!(
            cache.sig_cache_size(height, new_round.view, &new_round.block_hash),
            1
        );
        assert_eq!(
            cache.commit_cache_size(height, old_round.view, &old_round.block_hash),
            0
        );
        assert_eq!(cache.view_change_size(height, ViewNumber::new(1)), 0);
    }

    #[test]
    fn lock_survives_vote_clearing_until_height_passes() {
        let keypairs = keypairs(1);
        let locked = prepare(&keypairs[0], 1, 0);
        let same_block_later = PrepareReq::new(
            &keypairs[0],
            ViewNumber::new(2),
            ValidatorIndex::new(0),
            locked.block.clone(),
        );
        let other_block = {
            let block = Block::new(BlockHeight::new(1), locked.block_hash, Data::default());
            PrepareReq::new(&keypairs[0], ViewNumber::new(2), ValidatorIndex::new(0), block)
        };
        let mut cache = RequestCache::new();
        assert!(!cache.conflicts_with_lock(&other_block));

        cache.lock_prepare(locked.clone());
        cache.clear_all();
        cache.remove_invalid_votes(BlockHeight::new(1), ViewNumber::new(2));
        cache.collect_garbage(BlockHeight::new(1));
        assert_eq!(cache.locked_prepare(BlockHeight::new(1)), Some(&locked));
        assert!(!cache.conflicts_with_lock(&same_block_later));
        assert!(cache.conflicts_with_lock(&other_block));
        assert!(!cache.conflicts_with_lock(&prepare(&keypairs[0], 2, 0)));

        cache.collect_garbage(BlockHeight::new(2));
        assert!(cache.locked_prepare(BlockHeight::new(1)).is_none());
        assert!(!cache.conflicts_with_lock(&other_block));
    }

    #[test]
    fn garbage_collection_drops_past_heights() {
        let keypairs = keypairs(2);
        let old = prepare(&keypairs[0], 1, 0);
        let current = prepare(&keypairs[0], 2, 0);
        let mut cache = RequestCache::new();

        cache.add_sign(SignReq::new(&keypairs[0], &old, ValidatorIndex::new(0)));
        cache.add_sign(SignReq::new(&keypairs[1], &current, ValidatorIndex::new(1)));
        cache.add_future_prepare(prepare(&keypairs[0], 1, 1));

        cache.collect_garbage(BlockHeight::new(2));
        assert_eq!(cache.sig_cache_size(old.height, old.view, &old.block_hash), 0);
        assert_eq!(
            cache.sig_cache_size(current.height, current.view, &current.block_hash),
            1
        );
        assert!(cache
            .take_future_prepare(BlockHeight::new(1), ViewNumber::new(1))
            .is_none());
    }
}
