/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Time-windowed de-duplication of outgoing messages.
//!
//! In a gossip network every validator re-broadcasts the consensus messages it receives, so without a
//! filter the same message would bounce between validators indefinitely. The [`BroadcastFilter`]
//! remembers, for each `(peer, packet type, signature)` triple, when the message was last sent to (or
//! received from) the peer, and suppresses sending it again until the record is older than the filter's
//! window.
//!
//! The filter is shared between the algorithm thread and any thread that sends messages, so it is backed
//! by a [`DashMap`], which allows concurrent lookups and insertions without an external lock.

use std::time::{Duration, Instant};

use dashmap::{mapref::entry::Entry, DashMap};
use ed25519_dalek::VerifyingKey;

use super::messages::PacketType;

type FilterKey = ([u8; 32], PacketType, String);

pub struct BroadcastFilter {
    window: Duration,
    records: DashMap<FilterKey, Instant>,
}

impl BroadcastFilter {
    /// Create an empty filter that suppresses re-sending a message to the same peer for `window`.
    pub fn new(window: Duration) -> BroadcastFilter {
        BroadcastFilter {
            window,
            records: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether the message identified by `(packet_type, signature_hex)` should be sent to `peer`.
    ///
    /// If there is no unexpired record for the triple, a record is made and `true` is returned.
    /// Otherwise `false` is returned and the existing record is left as is.
    pub fn should_send(
        &self,
        peer: &VerifyingKey,
        packet_type: PacketType,
        signature_hex: &str,
    ) -> bool {
        self.should_send_at(peer, packet_type, signature_hex, Instant::now())
    }

    pub(crate) fn should_send_at(
        &self,
        peer: &VerifyingKey,
        packet_type: PacketType,
        signature_hex: &str,
        now: Instant,
    ) -> bool {
        match self.records.entry(key(peer, packet_type, signature_hex)) {
            Entry::Occupied(mut record) => {
                if self.is_expired(*record.get(), now) {
                    record.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(record) => {
                record.insert(now);
                true
            }
        }
    }

    /// Record that `peer` already has the message identified by `(packet_type, signature_hex)`, e.g.,
    /// because it sent it to us.
    pub fn mark(&self, peer: &VerifyingKey, packet_type: PacketType, signature_hex: &str) {
        self.records
            .insert(key(peer, packet_type, signature_hex), Instant::now());
    }

    /// Check whether there is an unexpired record for the triple.
    pub fn contains(
        &self,
        peer: &VerifyingKey,
        packet_type: PacketType,
        signature_hex: &str,
    ) -> bool {
        let now = Instant::now();
        self.records
            .get(&key(peer, packet_type, signature_hex))
            .is_some_and(|record| !self.is_expired(*record, now))
    }

    /// Drop every expired record.
    pub fn collect_garbage(&self) {
        let now = Instant::now();
        self.records
            .retain(|_, recorded_at| !self.is_expired(*recorded_at, now));
    }

    pub fn clear(&self) {
        self.records.clear()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn is_expired(&self, recorded_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(recorded_at) > self.window
    }
}

fn key(peer: &VerifyingKey, packet_type: PacketType, signature_hex: &str) -> FilterKey {
    (peer.to_bytes(), packet_type, signature_hex.to_string())
}
