/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions and types for sending messages to the P2P network.

use std::{collections::HashSet, sync::Arc};

use ed25519_dalek::VerifyingKey;

use crate::{pbft::messages::PBFTMessage, types::validator_set::ValidatorSet};

use super::{broadcast_filter::BroadcastFilter, messages::Message, network::Network};

/// Handle for sending and broadcasting [`PBFTMessage`]s to the [`Network`].
///
/// Broadcasts go through a shared [`BroadcastFilter`], so that a message is delivered to each validator
/// at most once per filter window no matter how many times it is re-broadcast.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
    filter: Arc<BroadcastFilter>,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N, filter: Arc<BroadcastFilter>) -> Self {
        Self { network, filter }
    }

    pub(crate) fn filter(&self) -> &Arc<BroadcastFilter> {
        &self.filter
    }

    /// Inform the network of a new validator set.
    pub(crate) fn init_validator_set(&mut self, validator_set: ValidatorSet) {
        self.network.init_validator_set(validator_set)
    }

    /// Send `msg` to every connected validator that does not already have it.
    ///
    /// For each peer reported by the network:
    /// 1. Peers that are not in `validators` are skipped.
    /// 2. Peers in `exclude` are recorded in the filter as already having the message, but not sent to.
    /// 3. Other peers are sent to if the filter allows it.
    ///
    /// Returns the number of peers that the message was sent to.
    pub(crate) fn broadcast_msg(
        &mut self,
        validators: &ValidatorSet,
        msg: PBFTMessage,
        exclude: &HashSet<VerifyingKey>,
    ) -> usize {
        let packet_type = msg.packet_type();
        let signature_hex = msg.signature().to_hex();
        let message = Message::from(msg);

        let mut sent = 0;
        for peer in self.network.peers() {
            if !validators.contains(&peer) {
                continue;
            }

            if exclude.contains(&peer) {
                self.filter.mark(&peer, packet_type, &signature_hex);
                continue;
            }

            if self.filter.should_send(&peer, packet_type, &signature_hex) {
                self.network.send(peer, message.clone());
                sent += 1;
            }
        }
        sent
    }
}
