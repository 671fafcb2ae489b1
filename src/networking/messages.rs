/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The envelope in which PBFT messages travel through the [`Network`](super::network::Network).
//!
//! A [`Message`] is a `(packet_type, payload)` pair. The payload is the borsh encoding of the request
//! named by the packet type. Converting between a `Message` and a typed
//! [`PBFTMessage`](crate::pbft::messages::PBFTMessage) is done with `From`/`TryFrom`.

use borsh::{BorshDeserialize, BorshSerialize};

/// Type tag of a PBFT packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum PacketType {
    PrepareReq,
    SignReq,
    CommitReq,
    ViewChangeReq,
}

/// A serialized PBFT message as handed to and received from the network provider.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Message {
    pub packet_type: PacketType,
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new `Message` from a packet type and an already-encoded payload.
    pub fn new(packet_type: PacketType, payload: Vec<u8>) -> Message {
        Message {
            packet_type,
            payload,
        }
    }
}
