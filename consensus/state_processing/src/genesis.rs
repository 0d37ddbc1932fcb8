use crate::errors::BlockProcessingError;
use crate::per_block_processing::process_deposit;
use merkle_proof::MerkleTree;
use tree_hash::TreeHash;
use types::{BeaconState, ChainSpec, Deposit, Epoch, Eth1Data, Hash256};

/// Builds the genesis `BeaconState` from the eth1 deposits observed up to (and including)
/// `eth1_timestamp`.
///
/// Grounded on `initialize_beacon_state_from_eth1`: seeds RANDAO with eth1 entropy, replays every
/// deposit through `process_deposit` against an incrementally-built `MerkleTree` (so the deposit
/// Merkle proofs validate against the same root a live deposit contract would have produced), then
/// activates validators whose effective balance reaches the maximum.
pub fn initialize_beacon_state_from_eth1(
    eth1_block_hash: Hash256,
    eth1_timestamp: u64,
    deposits: Vec<Deposit>,
    spec: &ChainSpec,
) -> Result<BeaconState, BlockProcessingError> {
    let genesis_time = eth1_timestamp.saturating_add(spec.genesis_delay);
    let eth1_data = Eth1Data {
        deposit_root: Hash256::zero(),
        deposit_count: deposits.len() as u64,
        block_hash: eth1_block_hash,
    };
    let mut state = BeaconState::new(genesis_time, eth1_data, spec);

    // Seed RANDAO with eth1 entropy: every mix starts out equal to the eth1 block hash that
    // triggered genesis.
    for mix in state.randao_mixes.iter_mut() {
        *mix = eth1_block_hash;
    }

    let mut deposit_tree = MerkleTree::create(spec.deposit_contract_tree_depth as usize);

    for deposit in deposits.iter() {
        deposit_tree.push_leaf(Hash256::from_slice(&deposit.data.tree_hash_root()))?;
        state.eth1_data.deposit_root = deposit_tree.root();
        process_deposit(&mut state, deposit, spec)?;
    }

    process_activations(&mut state, spec);

    // Genesis validators root identifies this specific genesis state for domain separation; it is
    // derived from the validator registry rather than the whole state so that it is stable under
    // any later, unrelated state fields.
    state.genesis_validators_root = Hash256::from_slice(&state.validators.tree_hash_root());

    Ok(state)
}

/// Determines whether a candidate genesis state is suitable for starting the chain: it must have
/// reached the minimum genesis time and have enough validators already active at genesis.
pub fn is_valid_genesis_state(state: &BeaconState, spec: &ChainSpec) -> bool {
    let active_validators = state.get_active_validator_indices(Epoch::new(0));

    state.genesis_time >= spec.min_genesis_time
        && active_validators.len() as u64 >= spec.min_genesis_active_validator_count
}

/// Activates every genesis validator whose effective balance reaches `max_effective_balance`.
/// Mirrors `process_activations`, minus the reward/penalty bookkeeping this simplified pipeline
/// does not model.
pub fn process_activations(state: &mut BeaconState, spec: &ChainSpec) {
    for (index, validator) in state.validators.iter_mut().enumerate() {
        let balance = state.balances.get(index).copied().unwrap_or(0);
        let effective_balance = balance
            .saturating_sub(balance % spec.effective_balance_increment)
            .min(spec.max_effective_balance);
        validator.effective_balance = effective_balance;

        if validator.effective_balance == spec.max_effective_balance {
            validator.activation_eligibility_epoch = Epoch::new(0);
            validator.activation_epoch = Epoch::new(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::test_utils::generate_deterministic_validators;
    use types::{PublicKeyBytes, SignatureBytes};

    fn make_deposit(tree: &mut MerkleTree, index: u8, amount: u64) -> Deposit {
        let mut pubkey_bytes = [0u8; 48];
        pubkey_bytes[0] = index;

        let data = types::DepositData {
            pubkey: PublicKeyBytes(pubkey_bytes),
            withdrawal_credentials: Hash256::zero(),
            amount,
            signature: SignatureBytes::zero(),
        };
        let leaf = Hash256::from_slice(&data.tree_hash_root());
        tree.push_leaf(leaf).unwrap();
        let proof = tree.generate_proof((tree.num_leaves() - 1) as usize).unwrap();
        Deposit { proof, data }
    }

    #[test]
    fn genesis_state_activates_fully_funded_validators() {
        let spec = ChainSpec::minimal();
        let mut tree = MerkleTree::create(spec.deposit_contract_tree_depth as usize);

        let deposits: Vec<Deposit> = (0..spec.min_genesis_active_validator_count as u8)
            .map(|i| make_deposit(&mut tree, i, spec.max_effective_balance))
            .collect();

        let state = initialize_beacon_state_from_eth1(Hash256::zero(), 0, deposits, &spec).unwrap();

        assert_eq!(
            state.validators.len(),
            spec.min_genesis_active_validator_count as usize
        );
        assert!(state
            .validators
            .iter()
            .all(|v| v.activation_epoch == Epoch::new(0)));
        assert!(is_valid_genesis_state(&state, &spec));
        let _ = generate_deterministic_validators(0, &spec);
    }

    #[test]
    fn insufficient_validators_is_not_a_valid_genesis() {
        let spec = ChainSpec::minimal();
        let mut tree = MerkleTree::create(spec.deposit_contract_tree_depth as usize);
        let deposits: Vec<Deposit> = (0..1u8)
            .map(|i| make_deposit(&mut tree, i, spec.max_effective_balance))
            .collect();

        let state = initialize_beacon_state_from_eth1(Hash256::zero(), 0, deposits, &spec).unwrap();
        assert!(!is_valid_genesis_state(&state, &spec));
    }
}
