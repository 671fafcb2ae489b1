/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The ordered set of validators that take part in consensus.
//!
//! Unlike a set ordered by public key, a PBFT validator set keeps the order in which the validators
//! were configured: a validator's position is its [`ValidatorIndex`], which is carried in every message
//! it signs and decides when it becomes leader.

use ed25519_dalek::VerifyingKey;

use super::data_types::ValidatorIndex;

/// Ordered list of the public keys of validators ("miners").
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ValidatorSet {
    validators: Vec<VerifyingKey>,
}

impl ValidatorSet {
    /// Create a `ValidatorSet` from `validators`, keeping their order. Repeated keys after the first
    /// occurrence are ignored.
    pub fn new(validators: Vec<VerifyingKey>) -> ValidatorSet {
        let mut deduplicated: Vec<VerifyingKey> = Vec::with_capacity(validators.len());
        for validator in validators {
            if !deduplicated.contains(&validator) {
                deduplicated.push(validator);
            }
        }
        ValidatorSet {
            validators: deduplicated,
        }
    }

    /// Get the position of `validator` in the set, or `None` if it is not a validator.
    pub fn position(&self, validator: &VerifyingKey) -> Option<ValidatorIndex> {
        self.validators
            .iter()
            .position(|v| v == validator)
            .map(ValidatorIndex::from)
    }

    /// Get the public key of the validator at position `idx`.
    pub fn get(&self, idx: ValidatorIndex) -> Option<&VerifyingKey> {
        usize::try_from(idx.int())
            .ok()
            .and_then(|idx| self.validators.get(idx))
    }

    pub fn contains(&self, validator: &VerifyingKey) -> bool {
        self.validators.contains(validator)
    }

    pub fn validators(&self) -> impl Iterator<Item = &VerifyingKey> {
        self.validators.iter()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// The maximum number of faulty validators the set tolerates: `(n - 1) / 3`.
    pub fn f(&self) -> usize {
        self.len().saturating_sub(1) / 3
    }

    /// The number of matching votes that form a quorum: `n - f`.
    pub fn min_valid(&self) -> usize {
        self.len() - self.f()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    use super::*;

    fn validator_set(n: usize) -> ValidatorSet {
        let mut csprg = OsRng {};
        ValidatorSet::new(
            (0..n)
                .map(|_| SigningKey::generate(&mut csprg).verifying_key())
                .collect(),
        )
    }

    #[test]
    fn quorum_arithmetic_test() {
        // (n, f, min_valid)
        for (n, f, min_valid) in [(1, 0, 1), (3, 0, 3), (4, 1, 3), (7, 2, 5), (10, 3, 7)] {
            let validators = validator_set(n);
            assert_eq!(validators.f(), f);
            assert_eq!(validators.min_valid(), min_valid);
        }
        assert_eq!(ValidatorSet::default().f(), 0);
        assert_eq!(ValidatorSet::default().min_valid(), 0);
    }

    #[test]
    fn position_follows_configured_order() {
        let validators = validator_set(4);
        for (i, validator) in validators.validators().enumerate() {
            assert_eq!(validators.position(validator), Some(ValidatorIndex::from(i)));
            assert_eq!(validators.get(ValidatorIndex::from(i)), Some(validator));
        }
        assert!(validators.get(ValidatorIndex::new(4)).is_none());
    }

    #[test]
    fn repeated_keys_are_ignored() {
        let mut csprg = OsRng {};
        let key = SigningKey::generate(&mut csprg).verifying_key();
        let validators = ValidatorSet::new(vec![key, key]);
        assert_eq!(validators.len(), 1);
    }
}
