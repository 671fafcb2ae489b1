/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types that exist only to store bytes, and do not have any major "active" behavior.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Add, AddAssign, Sub, SubAssign},
};

use borsh::{BorshDeserialize, BorshSerialize};

/// Height of a block in the ledger.
///
/// Starts at 0 for the Genesis Block and increases by 1 for every block appended after it. PBFT
/// messages carry the height of the block that they are trying to agree on, which is always one more
/// than the height of the highest block in the ledger.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    /// Create a new `BlockHeight` with an `int` inner value.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BlockHeight`.
    pub const fn int(&self) -> u64 {
        self.0
    }

    /// Get the little-endian representation of the inner `u64` value of this `BlockHeight`.
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Display for BlockHeight {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl AddAssign<u64> for BlockHeight {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl Add<u64> for BlockHeight {
    type Output = BlockHeight;
    fn add(self, rhs: u64) -> Self::Output {
        BlockHeight::new(self.0.add(rhs))
    }
}

impl Sub<u64> for BlockHeight {
    type Output = BlockHeight;
    fn sub(self, rhs: u64) -> Self::Output {
        BlockHeight::new(self.0.saturating_sub(rhs))
    }
}

/// View number. Starts at 0 for every height and increases by 1 every time a quorum of validators
/// agrees to replace the leader of the height.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ViewNumber(u64);

impl ViewNumber {
    /// Create a new `ViewNumber` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the initial `ViewNumber`, which is 0.
    pub const fn init() -> Self {
        Self(0)
    }

    /// Get the inner `u64` of this `ViewNumber`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl Add<u64> for ViewNumber {
    type Output = ViewNumber;

    fn add(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.add(rhs))
    }
}

impl AddAssign<u64> for ViewNumber {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl Sub<u64> for ViewNumber {
    type Output = ViewNumber;

    fn sub(self, rhs: u64) -> Self::Output {
        ViewNumber(self.0.saturating_sub(rhs))
    }
}

/// Position of a validator in the [`ValidatorSet`](super::validator_set::ValidatorSet).
///
/// Every PBFT message carries the index of the validator that signed it, and its signature is checked
/// against the public key found at this position.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ValidatorIndex(u64);

impl ValidatorIndex {
    /// Create a new `ValidatorIndex` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` of this `ValidatorIndex`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ValidatorIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<usize> for ValidatorIndex {
    fn from(value: usize) -> Self {
        ValidatorIndex(value as u64)
    }
}

/// 32-byte cryptographic hash.
///
/// Within this crate, every `CryptoHash` is a SHA256 digest computed with
/// [`CryptoHasher`](super::crypto_primitives::CryptoHasher).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    /// Create a new `CryptoHash` wrapping `bytes`.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 32]` value of this `CryptoHash`.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Ed25519 digital signature.
///
/// Besides authenticating a message, the signature of a PBFT message doubles as its unique identifier
/// in the [`BroadcastFilter`](crate::networking::broadcast_filter::BroadcastFilter). Its hex form is
/// obtained with [`to_hex`](Self::to_hex).
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    /// Create a new `SignatureBytes` wrapping `bytes`.
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the inner `[u8; 64]` value of this `SignatureBytes`.
    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }

    /// Get the lowercase hex encoding of this signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Arbitrary data provided by a [`Ledger`](crate::ledger::Ledger) to be stored in a
/// [`Block`](super::block::Block).
///
/// The contents of `Data` are opaque to consensus. The only property consensus cares about is whether
/// the `Data` is empty, which decides whether the block is an "empty block".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, BorshDeserialize, BorshSerialize)]
pub struct Data(Vec<Datum>);

impl Data {
    /// Create a new `Data` wrapping `datum_vec`.
    pub fn new(datum_vec: Vec<Datum>) -> Self {
        Self(datum_vec)
    }

    /// Get a reference to the inner `Vec<Datum>` of this `Data`.
    pub const fn vec(&self) -> &Vec<Datum> {
        &self.0
    }

    /// Get how many `Datum`s are in this `Data`.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether this `Data` contains no `Datum`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate through the `Datum`s that are in this `Data` in the order they were provided in to
    /// [`new`](Self::new).
    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.0.iter()
    }
}

/// Unit of [`Data`], typically a single transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Datum(Vec<u8>);

impl Datum {
    /// Create a new `Datum` wrapping `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get a reference to the inner `Vec<u8>` of this `Datum`.
    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// Size of a buffer (in bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BufferSize(u64);

impl BufferSize {
    /// Create a new `BufferSize` wrapping `int`.
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    /// Get the inner `u64` value of this `BufferSize`.
    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl AddAssign<u64> for BufferSize {
    fn add_assign(&mut self, rhs: u64) {
        self.0.add_assign(rhs)
    }
}

impl SubAssign<u64> for BufferSize {
    fn sub_assign(&mut self, rhs: u64) {
        self.0.sub_assign(rhs)
    }
}
