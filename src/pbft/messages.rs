/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the structured messages that validators exchange in the PBFT protocol.
//!
//! There are four kinds of messages, one for each phase of the protocol and one for replacing the
//! leader:
//! 1. [`PrepareReq`]: sent by the leader of a view to propose a block.
//! 2. [`SignReq`]: sent by a validator that accepted a `PrepareReq`.
//! 3. [`CommitReq`]: sent by a validator that collected a quorum of `SignReq`s.
//! 4. [`ViewChangeReq`]: sent by a validator whose view timed out, asking to move to a new view.
//!
//! Every message is signed by its sender over all of its fields except the signature (and, in the case
//! of `PrepareReq`, the block, which is bound to the signature through `block_hash`).

use std::{
    mem,
    time::{SystemTime, UNIX_EPOCH},
};

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    networking::messages::{Message, PacketType},
    types::{
        block::Block,
        crypto_primitives::Keypair,
        data_types::{BlockHeight, CryptoHash, SignatureBytes, ValidatorIndex, ViewNumber},
        encode,
        signed_messages::SignedMessage,
    },
};

/// All PBFT message variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PBFTMessage {
    Prepare(PrepareReq),
    Sign(SignReq),
    Commit(CommitReq),
    ViewChange(ViewChangeReq),
}

impl PBFTMessage {
    /// Get the [`PacketType`] that tags this message on the wire.
    pub fn packet_type(&self) -> PacketType {
        match self {
            PBFTMessage::Prepare(_) => PacketType::PrepareReq,
            PBFTMessage::Sign(_) => PacketType::SignReq,
            PBFTMessage::Commit(_) => PacketType::CommitReq,
            PBFTMessage::ViewChange(_) => PacketType::ViewChangeReq,
        }
    }

    pub fn height(&self) -> BlockHeight {
        match self {
            PBFTMessage::Prepare(req) => req.height,
            PBFTMessage::Sign(req) => req.height,
            PBFTMessage::Commit(req) => req.height,
            PBFTMessage::ViewChange(req) => req.height,
        }
    }

    pub fn view(&self) -> ViewNumber {
        match self {
            PBFTMessage::Prepare(req) => req.view,
            PBFTMessage::Sign(req) => req.view,
            PBFTMessage::Commit(req) => req.view,
            PBFTMessage::ViewChange(req) => req.view,
        }
    }

    pub fn idx(&self) -> ValidatorIndex {
        match self {
            PBFTMessage::Prepare(req) => req.idx,
            PBFTMessage::Sign(req) => req.idx,
            PBFTMessage::Commit(req) => req.idx,
            PBFTMessage::ViewChange(req) => req.idx,
        }
    }

    pub fn signature(&self) -> SignatureBytes {
        match self {
            PBFTMessage::Prepare(req) => req.signature,
            PBFTMessage::Sign(req) => req.signature,
            PBFTMessage::Commit(req) => req.signature,
            PBFTMessage::ViewChange(req) => req.signature,
        }
    }

    /// Check whether the signature of the inner message was created by `verifying_key`.
    pub fn is_correct(&self, verifying_key: &ed25519_dalek::VerifyingKey) -> bool {
        match self {
            PBFTMessage::Prepare(req) => req.is_correct(verifying_key),
            PBFTMessage::Sign(req) => req.is_correct(verifying_key),
            PBFTMessage::Commit(req) => req.is_correct(verifying_key),
            PBFTMessage::ViewChange(req) => req.is_correct(verifying_key),
        }
    }

    /// Returns the number of bytes required to store a given instance of the [`PBFTMessage`] enum.
    ///
    /// For a `Prepare`, the bytes of the block's data are counted too, since these dominate its size.
    pub fn size(&self) -> u64 {
        match self {
            PBFTMessage::Prepare(req) => {
                let data_size: usize = req.block.data.iter().map(|datum| datum.bytes().len()).sum();
                (mem::size_of::<PrepareReq>() + data_size) as u64
            }
            PBFTMessage::Sign(_) => mem::size_of::<SignReq>() as u64,
            PBFTMessage::Commit(_) => mem::size_of::<CommitReq>() as u64,
            PBFTMessage::ViewChange(_) => mem::size_of::<ViewChangeReq>() as u64,
        }
    }
}

impl From<PBFTMessage> for Message {
    fn from(value: PBFTMessage) -> Self {
        let packet_type = value.packet_type();
        let payload = match &value {
            PBFTMessage::Prepare(req) => encode(req),
            PBFTMessage::Sign(req) => encode(req),
            PBFTMessage::Commit(req) => encode(req),
            PBFTMessage::ViewChange(req) => encode(req),
        };
        Message::new(packet_type, payload)
    }
}

impl TryFrom<&Message> for PBFTMessage {
    type Error = DecodeError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        let payload = message.payload.as_slice();
        let decoded = match message.packet_type {
            PacketType::PrepareReq => PrepareReq::try_from_slice(payload).map(PBFTMessage::Prepare),
            PacketType::SignReq => SignReq::try_from_slice(payload).map(PBFTMessage::Sign),
            PacketType::CommitReq => CommitReq::try_from_slice(payload).map(PBFTMessage::Commit),
            PacketType::ViewChangeReq => {
                ViewChangeReq::try_from_slice(payload).map(PBFTMessage::ViewChange)
            }
        };
        decoded.map_err(|err| DecodeError {
            packet_type: message.packet_type,
            reason: err.to_string(),
        })
    }
}

/// The payload of a [`Message`] could not be decoded into the request named by its packet type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub packet_type: PacketType,
    pub reason: String,
}

/// A proposal for the block at `height`, sent by the leader of `view`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PrepareReq {
    pub height: BlockHeight,
    pub view: ViewNumber,
    pub idx: ValidatorIndex,
    pub timestamp: u64,
    pub block_hash: CryptoHash,
    pub block: Block,
    pub signature: SignatureBytes,
}

impl PrepareReq {
    /// Create a `PrepareReq` proposing `block` in `view`, signed by `me`, the validator at `idx`.
    pub fn new(me: &Keypair, view: ViewNumber, idx: ValidatorIndex, block: Block) -> PrepareReq {
        let (height, block_hash, timestamp) = (block.height, block.hash, utc_time_millis());
        let signature = me.sign(&encode(&(height, view, idx, timestamp, block_hash)));
        PrepareReq {
            height,
            view,
            idx,
            timestamp,
            block_hash,
            block,
            signature,
        }
    }

    /// Check whether this prepare and `other` propose the same block, possibly in different views.
    pub fn same_block(&self, other: &PrepareReq) -> bool {
        self.height == other.height && self.block_hash == other.block_hash
    }
}

impl SignedMessage for PrepareReq {
    fn message_bytes(&self) -> Vec<u8> {
        encode(&(
            self.height,
            self.view,
            self.idx,
            self.timestamp,
            self.block_hash,
        ))
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// A validator's acceptance of the [`PrepareReq`] identified by `(height, view, block_hash)`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignReq {
    pub height: BlockHeight,
    pub view: ViewNumber,
    pub idx: ValidatorIndex,
    pub timestamp: u64,
    pub block_hash: CryptoHash,
    pub signature: SignatureBytes,
}

impl SignReq {
    /// Create a `SignReq` for `prepare`, signed by `me`, the validator at `idx`.
    pub fn new(me: &Keypair, prepare: &PrepareReq, idx: ValidatorIndex) -> SignReq {
        let timestamp = utc_time_millis();
        let signature = me.sign(&vote_bytes(
            PacketType::SignReq,
            prepare.height,
            prepare.view,
            idx,
            timestamp,
            prepare.block_hash,
        ));
        SignReq {
            height: prepare.height,
            view: prepare.view,
            idx,
            timestamp,
            block_hash: prepare.block_hash,
            signature,
        }
    }
}

impl SignedMessage for SignReq {
    fn message_bytes(&self) -> Vec<u8> {
        vote_bytes(
            PacketType::SignReq,
            self.height,
            self.view,
            self.idx,
            self.timestamp,
            self.block_hash,
        )
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// A validator's statement that it has seen a quorum of [`SignReq`]s for `(height, view, block_hash)`
/// and is ready to commit the block.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitReq {
    pub height: BlockHeight,
    pub view: ViewNumber,
    pub idx: ValidatorIndex,
    pub timestamp: u64,
    pub block_hash: CryptoHash,
    pub signature: SignatureBytes,
}

impl CommitReq {
    /// Create a `CommitReq` for `prepare`, signed by `me`, the validator at `idx`.
    pub fn new(me: &Keypair, prepare: &PrepareReq, idx: ValidatorIndex) -> CommitReq {
        let timestamp = utc_time_millis();
        let signature = me.sign(&vote_bytes(
            PacketType::CommitReq,
            prepare.height,
            prepare.view,
            idx,
            timestamp,
            prepare.block_hash,
        ));
        CommitReq {
            height: prepare.height,
            view: prepare.view,
            idx,
            timestamp,
            block_hash: prepare.block_hash,
            signature,
        }
    }
}

impl SignedMessage for CommitReq {
    fn message_bytes(&self) -> Vec<u8> {
        vote_bytes(
            PacketType::CommitReq,
            self.height,
            self.view,
            self.idx,
            self.timestamp,
            self.block_hash,
        )
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

/// A validator's request to move from its current view to `view` while trying to agree on the block
/// at `height`. `block_hash` is the hash of the highest block the validator knows.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ViewChangeReq {
    pub height: BlockHeight,
    pub view: ViewNumber,
    pub idx: ValidatorIndex,
    pub timestamp: u64,
    pub block_hash: CryptoHash,
    pub signature: SignatureBytes,
}

impl ViewChangeReq {
    pub fn new(
        me: &Keypair,
        height: BlockHeight,
        view: ViewNumber,
        idx: ValidatorIndex,
        block_hash: CryptoHash,
    ) -> ViewChangeReq {
        let timestamp = utc_time_millis();
        let signature = me.sign(&vote_bytes(
            PacketType::ViewChangeReq,
            height,
            view,
            idx,
            timestamp,
            block_hash,
        ));
        ViewChangeReq {
            height,
            view,
            idx,
            timestamp,
            block_hash,
            signature,
        }
    }
}

impl SignedMessage for ViewChangeReq {
    fn message_bytes(&self) -> Vec<u8> {
        vote_bytes(
            PacketType::ViewChangeReq,
            self.height,
            self.view,
            self.idx,
            self.timestamp,
            self.block_hash,
        )
    }

    fn signature_bytes(&self) -> SignatureBytes {
        self.signature
    }
}

impl From<PrepareReq> for PBFTMessage {
    fn from(value: PrepareReq) -> Self {
        PBFTMessage::Prepare(value)
    }
}

impl From<SignReq> for PBFTMessage {
    fn from(value: SignReq) -> Self {
        PBFTMessage::Sign(value)
    }
}

impl From<CommitReq> for PBFTMessage {
    fn from(value: CommitReq) -> Self {
        PBFTMessage::Commit(value)
    }
}

impl From<ViewChangeReq> for PBFTMessage {
    fn from(value: ViewChangeReq) -> Self {
        PBFTMessage::ViewChange(value)
    }
}

// Votes of different kinds share a shape, so the packet type is signed too. This keeps a `SignReq`
// signature from being replayed as a `CommitReq`.
fn vote_bytes(
    packet_type: PacketType,
    height: BlockHeight,
    view: ViewNumber,
    idx: ValidatorIndex,
    timestamp: u64,
    block_hash: CryptoHash,
) -> Vec<u8> {
    encode(&(packet_type, height, view, idx, timestamp, block_hash))
}

/// Milliseconds since the Unix Epoch, used to timestamp outgoing messages.
pub(crate) fn utc_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;
    use crate::types::data_types::{Data, Datum};

    fn prepare(keypair: &Keypair) -> PrepareReq {
        let block = Block::new(
            BlockHeight::new(1),
            Block::genesis().hash,
            Data::new(vec![Datum::new(b"tx".to_vec())]),
        );
        PrepareReq::new(keypair, ViewNumber::init(), ValidatorIndex::new(0), block)
    }

    #[test]
    fn signatures_verify_against_signer_only() {
        let mut csprg = OsRng {};
        let keypair = Keypair::new(SigningKey::generate(&mut csprg));
        let other = Keypair::new(SigningKey::generate(&mut csprg));

        let prepare = prepare(&keypair);
        let sign = SignReq::new(&keypair, &prepare, ValidatorIndex::new(0));
        let commit = CommitReq::new(&keypair, &prepare, ValidatorIndex::new(0));

        assert!(prepare.is_correct(&keypair.public()));
        assert!(sign.is_correct(&keypair.public()));
        assert!(commit.is_correct(&keypair.public()));
        assert!(!sign.is_correct(&other.public()));
    }

    #[test]
    fn sign_signature_cannot_be_replayed_as_commit() {
        let mut csprg = OsRng {};
        let keypair = Keypair::new(SigningKey::generate(&mut csprg));
        let prepare = prepare(&keypair);
        let sign = SignReq::new(&keypair, &prepare, ValidatorIndex::new(2));

        let forged = CommitReq {
            height: sign.height,
            view: sign.view,
            idx: sign.idx,
            timestamp: sign.timestamp,
            block_hash: sign.block_hash,
            signature: sign.signature,
        };
        assert!(!forged.is_correct(&keypair.public()));
    }

    #[test]
    fn reproposal_in_later_view_is_same_block() {
        let mut csprg = OsRng {};
        let keypair = Keypair::new(SigningKey::generate(&mut csprg));
        let original = prepare(&keypair);
        let reproposal = PrepareReq::new(
            &keypair,
            ViewNumber::new(2),
            ValidatorIndex::new(2),
            original.block.clone(),
        );
        assert!(original.same_block(&reproposal));

        let other = PrepareReq::new(
            &keypair,
            ViewNumber::new(2),
            ValidatorIndex::new(2),
            Block::new(BlockHeight::new(1), Block::genesis().hash, Data::default()),
        );
        assert!(!original.same_block(&other));
    }

    #[test]
    fn message_envelope_decodes_to_same_request() {
        let mut csprg = OsRng {};
        let keypair = Keypair::new(SigningKey::generate(&mut csprg));
        let prepare = prepare(&keypair);

        let message = Message::from(PBFTMessage::Prepare(prepare.clone()));
        assert_eq!(message.packet_type, PacketType::PrepareReq);
        assert_eq!(
            PBFTMessage::try_from(&message),
            Ok(PBFTMessage::Prepare(prepare))
        );
    }

    #[test]
    fn mismatched_packet_type_fails_to_decode() {
        let mut csprg = OsRng {};
        let keypair = Keypair::new(SigningKey::generate(&mut csprg));
        let sign = SignReq::new(&keypair, &prepare(&keypair), ValidatorIndex::new(0));

        let mut message = Message::from(PBFTMessage::Sign(sign));
        message.packet_type = PacketType::PrepareReq;
        let err = PBFTMessage::try_from(&message).unwrap_err();
        assert_eq!(err.packet_type, PacketType::PrepareReq);
    }
}
