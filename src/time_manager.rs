/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Timekeeping for consensus rounds.
//!
//! The [`TimeManager`] answers three questions for the engine:
//! 1. Has the current view timed out, so that the validator should ask to change view?
//! 2. Has enough time passed since the last block for the leader to propose an empty block?
//! 3. Is it time to garbage collect the request cache and the broadcast filter?
//!
//! ## View timeout
//!
//! The base view timeout is three block intervals. Every consecutive view change without a commit doubles
//! the timeout, so that validators whose clocks are out of step eventually spend long enough in the same
//! view to agree on a block. The exponent is capped at [`MAX_BACKOFF_EXPONENT`].
//!
//! All instants are taken from the monotonic clock. Every query has a pure `_at` form that takes the
//! current instant as an argument.

use std::time::{Duration, Instant};

/// The highest power of two that the view timeout is multiplied by.
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

/// How often the engine drops expired entries from its caches.
pub const GARBAGE_COLLECTION_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub struct TimeManager {
    last_consensus_time: Instant,
    last_sign_time: Instant,
    last_exec_finish_time: Instant,
    last_garbage_collection: Instant,
    interval_block_time: Duration,
    view_timeout: Duration,
    change_cycle: u32,
}

impl TimeManager {
    pub fn new(interval_block_time: Duration) -> TimeManager {
        Self::new_at(interval_block_time, Instant::now())
    }

    pub fn new_at(interval_block_time: Duration, now: Instant) -> TimeManager {
        TimeManager {
            last_consensus_time: now,
            last_sign_time: now,
            last_exec_finish_time: now,
            last_garbage_collection: now,
            interval_block_time,
            view_timeout: interval_block_time * 3,
            change_cycle: 0,
        }
    }

    /// Check whether the current view has timed out.
    pub fn is_timeout(&self) -> bool {
        self.is_timeout_at(Instant::now())
    }

    /// Check whether more than `view_timeout × 2^min(change_cycle, MAX_BACKOFF_EXPONENT)` has passed
    /// between the last consensus time and `now`.
    pub fn is_timeout_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_consensus_time) > self.current_view_timeout()
    }

    /// Get the timeout of the current view, taking the backoff into account.
    pub fn current_view_timeout(&self) -> Duration {
        self.view_timeout
            .saturating_mul(1 << self.change_cycle.min(MAX_BACKOFF_EXPONENT))
    }

    /// Check whether a leader with no data to propose may propose an empty block.
    pub fn is_time_to_seal_empty(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_consensus_time) >= self.interval_block_time
    }

    pub fn should_collect_garbage(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_garbage_collection) >= GARBAGE_COLLECTION_INTERVAL
    }

    pub fn record_garbage_collection(&mut self, now: Instant) {
        self.last_garbage_collection = now
    }

    /// Restart the view timer, e.g., on committing a block or on entering a new view.
    pub fn update_consensus_time(&mut self, now: Instant) {
        self.last_consensus_time = now
    }

    pub fn update_sign_time(&mut self, now: Instant) {
        self.last_sign_time = now
    }

    pub fn update_exec_finish_time(&mut self, now: Instant) {
        self.last_exec_finish_time = now
    }

    pub fn update_change_cycle(&mut self) {
        self.change_cycle = self.change_cycle.saturating_add(1)
    }

    pub fn reset_change_cycle(&mut self) {
        self.change_cycle = 0
    }

    pub fn change_cycle(&self) -> u32 {
        self.change_cycle
    }

    pub fn view_timeout(&self) -> Duration {
        self.view_timeout
    }

    pub fn interval_block_time(&self) -> Duration {
        self.interval_block_time
    }

    pub fn last_consensus_time(&self) -> Instant {
        self.last_consensus_time
    }

    pub fn last_sign_time(&self) -> Instant {
        self.last_sign_time
    }

    pub fn last_exec_finish_time(&self) -> Instant {
        self.last_exec_finish_time
    }
}
