/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that determine what roles a node should play at any given height and view.

use ed25519_dalek::VerifyingKey;

use crate::types::{
    data_types::{BlockHeight, ValidatorIndex, ViewNumber},
    validator_set::ValidatorSet,
};

use super::types::AccountType;

/// Determine the [`AccountType`] of `me` given the current `validator_set`.
pub(crate) fn account_type(me: &VerifyingKey, validator_set: &ValidatorSet) -> AccountType {
    if validator_set.contains(me) {
        AccountType::Validator
    } else {
        AccountType::Observer
    }
}

/// Select the index of the leader of `view`, given the height of the highest block in the ledger.
///
/// Leadership rotates with both the view and the height: `(view + highest_height) mod n`. Returns `None`
/// if the validator set is empty.
pub fn leader_index(
    view: ViewNumber,
    highest_height: BlockHeight,
    validator_set: &ValidatorSet,
) -> Option<ValidatorIndex> {
    let n = validator_set.len() as u64;
    if n == 0 {
        return None;
    }
    let idx = view.int().wrapping_add(highest_height.int()) % n;
    Some(ValidatorIndex::new(idx))
}

/// Determine whether the validator at `idx` is the leader of `view`.
pub(crate) fn is_leader(
    idx: ValidatorIndex,
    view: ViewNumber,
    highest_height: BlockHeight,
    validator_set: &ValidatorSet,
) -> bool {
    leader_index(view, highest_height, validator_set) == Some(idx)
}
