/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple components of the crate.
//!
//! Types specific to the PBFT protocol, such as its messages, can be found in [`crate::pbft`].

use borsh::BorshSerialize;

pub mod block;

pub mod crypto_primitives;

pub mod data_types;

pub mod signed_messages;

pub mod validator_set;

/// Serialize `value` into its borsh encoding.
pub(crate) fn encode<T: BorshSerialize>(value: &T) -> Vec<u8> {
    // Safety: serializing into a `Vec<u8>` only fails if the writer fails, which a `Vec` never does.
    value
        .try_to_vec()
        .expect("borsh serialization into a Vec cannot fail")
}
