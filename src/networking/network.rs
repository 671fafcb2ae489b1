/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The pluggable peer-to-peer transport.

use ed25519_dalek::VerifyingKey;

use crate::types::validator_set::ValidatorSet;

use super::messages::Message;

pub trait Network: Clone + Send {
    /// Inform the network provider the validator set on wake-up, and on every reconfiguration.
    fn init_validator_set(&mut self, validator_set: ValidatorSet);

    /// Get the public keys of the peers that the network provider is currently connected to.
    ///
    /// The list may include peers that are not validators. These never receive consensus messages.
    fn peers(&self) -> Vec<VerifyingKey>;

    /// Send a message to the specified peer without blocking.
    fn send(&mut self, peer: VerifyingKey, message: Message);

    /// Receive a message from any peer. Returns immediately with a None if no message is available now.
    fn recv(&mut self) -> Option<(VerifyingKey, Message)>;
}
