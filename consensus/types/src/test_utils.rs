//! Deterministic fixtures for tests that need a populated validator registry without wiring up
//! real BLS key generation. Mirrors the role lighthouse's `generate_deterministic_keypairs` plays
//! in its test suite, minus the actual pairing-crypto key derivation (out of scope here).

use crate::{ChainSpec, Epoch, PublicKeyBytes, Validator};

/// Produces `count` validators with distinct, reproducible "public keys" (the index packed into
/// the low bytes of an otherwise-zero `PublicKeyBytes`) and `spec.max_effective_balance`,
/// already activated at epoch 0. Intended for fork-choice/genesis unit tests, never for anything
/// resembling a production key.
pub fn generate_deterministic_validators(count: usize, spec: &ChainSpec) -> Vec<Validator> {
    (0..count)
        .map(|i| {
            let mut pubkey_bytes = [0u8; 48];
            pubkey_bytes[0..8].copy_from_slice(&(i as u64).to_le_bytes());

            Validator {
                pubkey: PublicKeyBytes(pubkey_bytes),
                withdrawal_credentials: crate::Hash256::zero(),
                effective_balance: spec.max_effective_balance,
                slashed: false,
                activation_eligibility_epoch: Epoch::new(0),
                activation_epoch: Epoch::new(0),
                exit_epoch: crate::FAR_FUTURE_EPOCH,
                withdrawable_epoch: crate::FAR_FUTURE_EPOCH,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_validators_are_distinct_and_active() {
        let spec = ChainSpec::minimal();
        let validators = generate_deterministic_validators(4, &spec);
        assert_eq!(validators.len(), 4);
        assert!(validators.iter().all(|v| v.is_active_at(Epoch::new(0))));
        assert_ne!(validators[0].pubkey, validators[1].pubkey);
    }
}
