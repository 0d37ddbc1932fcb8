use crate::errors::BlockProcessingError;
use merkle_proof::verify_merkle_proof;
use tree_hash::TreeHash;
use types::{
    BeaconBlock, BeaconBlockHeader, BeaconState, ChainSpec, Deposit, Eth1Data, Hash256,
    SignedBeaconBlock, Validator, FAR_FUTURE_EPOCH,
};

/// Verifies the block's header against `state` and installs it as `state.latest_block_header`.
///
/// Grounded on `process_block_header`: the slot and parent-root checks are kept verbatim; the
/// proposer-index and signature checks are dropped, since proposer selection and BLS
/// verification are both injected from outside this crate (see `bls::BlsVerifier`).
pub fn process_block_header(
    state: &mut BeaconState,
    block: &BeaconBlock,
) -> Result<(), BlockProcessingError> {
    if block.slot <= state.slot {
        return Err(BlockProcessingError::BlockSlotNotLaterThanStateSlot {
            block_slot: block.slot.as_u64(),
            state_slot: state.slot.as_u64(),
        });
    }

    let expected_parent_root = state.latest_block_header.canonical_root();
    if block.parent_root != expected_parent_root {
        return Err(BlockProcessingError::ParentRootMismatch {
            expected: expected_parent_root,
            found: block.parent_root,
        });
    }

    state.slot = block.slot;
    state.latest_block_header = BeaconBlockHeader::from(block);

    Ok(())
}

/// Records the block's eth1 vote, adopting it as `state.eth1_data` once it has a strict majority
/// of the votes cast so far.
///
/// Grounded on `process_eth1_data`: the vote is always recorded; lighthouse additionally bounds
/// the window to `EPOCHS_PER_ETH1_VOTING_PERIOD` epochs, which this crate does not model (no
/// epoch-boundary state transition is implemented — see module docs), so the majority is taken
/// over all votes recorded since the last adopted `eth1_data`.
pub fn process_eth1_data(state: &mut BeaconState, eth1_data: &Eth1Data) {
    state.eth1_data_votes.push(eth1_data.clone());

    let matching_votes = state
        .eth1_data_votes
        .iter()
        .filter(|vote| *vote == eth1_data)
        .count();

    if matching_votes * 2 > state.eth1_data_votes.len() {
        state.eth1_data = eth1_data.clone();
    }
}

/// Applies a single deposit: verifies its Merkle inclusion proof against `state.eth1_data`, then
/// either tops up an existing validator's balance or appends a new one.
///
/// Grounded on `verify_deposit_merkle_proof` plus the registry-update half of lighthouse's
/// `process_deposit`; deposit signature verification is out of scope here (BLS is injected
/// externally and a deposit with a bad signature is simply never forwarded by the caller).
pub fn process_deposit(
    state: &mut BeaconState,
    deposit: &Deposit,
    spec: &ChainSpec,
) -> Result<(), BlockProcessingError> {
    let deposit_index = state.eth1_deposit_index;

    let leaf = Hash256::from_slice(&deposit.data.tree_hash_root());
    let generalized_index = (1usize << spec.deposit_contract_tree_depth) + deposit_index as usize;
    let is_valid = verify_merkle_proof(
        leaf,
        &deposit.proof,
        generalized_index,
        state.eth1_data.deposit_root,
    )?;
    if !is_valid {
        return Err(BlockProcessingError::DepositMerkleInvalid {
            deposit_index,
        });
    }

    state.eth1_deposit_index = deposit_index.saturating_add(1);

    let existing_index = state
        .validators
        .iter()
        .position(|validator| validator.pubkey == deposit.data.pubkey);

    match existing_index {
        Some(index) => {
            let balance = state
                .balances
                .get_mut(index)
                .ok_or(BlockProcessingError::BalancesOutOfBounds(index))?;
            *balance = balance.saturating_add(deposit.data.amount);
        }
        None => {
            state.validators.push(Validator {
                pubkey: deposit.data.pubkey,
                withdrawal_credentials: deposit.data.withdrawal_credentials,
                effective_balance: 0,
                slashed: false,
                activation_eligibility_epoch: FAR_FUTURE_EPOCH,
                activation_epoch: FAR_FUTURE_EPOCH,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
            });
            state.balances.push(deposit.data.amount);
        }
    }

    Ok(())
}

/// Applies `signed_block`'s operations to `state` in place: header, eth1 vote, deposits. RANDAO
/// mixing is not advanced here; `state.randao_mixes` is seeded at genesis and left alone by this
/// crate's simplified `stf` (see the field doc on `BeaconState::randao_mixes`).
///
/// Attestations are intentionally not processed here; the Attestation Processor forwards them to
/// fork-choice directly rather than through per-block state mutation, matching this system's
/// choice to keep justification/finalization bookkeeping in `fork_choice` rather than in
/// per-epoch state transitions (see module docs).
pub fn per_block_processing(
    state: &mut BeaconState,
    signed_block: &SignedBeaconBlock,
    spec: &ChainSpec,
) -> Result<(), BlockProcessingError> {
    let block = &signed_block.message;

    process_block_header(state, block)?;
    process_eth1_data(state, &block.body.eth1_data);

    for deposit in &block.body.deposits {
        process_deposit(state, deposit, spec)?;
    }

    Ok(())
}

/// The pure state-transition function: applies `signed_block` on top of `parent_state`, returning
/// the resulting new state without mutating the parent.
pub fn stf(
    parent_state: &BeaconState,
    signed_block: &SignedBeaconBlock,
    spec: &ChainSpec,
) -> Result<BeaconState, BlockProcessingError> {
    let mut state = parent_state.clone();
    per_block_processing(&mut state, signed_block, spec)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use merkle_proof::MerkleTree;
    use types::{BeaconBlockBody, PublicKeyBytes, SignatureBytes};

    fn genesis_state(spec: &ChainSpec) -> BeaconState {
        BeaconState::new(0, Eth1Data {
            deposit_root: Hash256::zero(),
            deposit_count: 0,
            block_hash: Hash256::zero(),
        }, spec)
    }

    #[test]
    fn process_block_header_rejects_stale_slot() {
        let spec = ChainSpec::minimal();
        let mut state = genesis_state(&spec);
        state.slot = types::Slot::new(5);

        let mut block = BeaconBlock::empty();
        block.slot = types::Slot::new(5);
        block.parent_root = state.latest_block_header.canonical_root();

        let err = process_block_header(&mut state, &block).unwrap_err();
        assert_eq!(
            err,
            BlockProcessingError::BlockSlotNotLaterThanStateSlot {
                block_slot: 5,
                state_slot: 5,
            }
        );
    }

    #[test]
    fn process_block_header_rejects_wrong_parent() {
        let spec = ChainSpec::minimal();
        let mut state = genesis_state(&spec);

        let mut block = BeaconBlock::empty();
        block.slot = types::Slot::new(1);
        block.parent_root = Hash256::repeat_byte(0xff);

        assert!(matches!(
            process_block_header(&mut state, &block),
            Err(BlockProcessingError::ParentRootMismatch { .. })
        ));
    }

    #[test]
    fn process_deposit_tops_up_existing_validator() {
        let spec = ChainSpec::minimal();
        let mut state = genesis_state(&spec);
        let mut tree = MerkleTree::create(spec.deposit_contract_tree_depth as usize);

        let data = types::DepositData {
            pubkey: PublicKeyBytes([7u8; 48]),
            withdrawal_credentials: Hash256::zero(),
            amount: 1_000_000_000,
            signature: SignatureBytes::zero(),
        };
        let leaf = Hash256::from_slice(&data.tree_hash_root());
        tree.push_leaf(leaf).unwrap();
        state.eth1_data.deposit_root = tree.root();
        let proof = tree.generate_proof(0).unwrap();

        let deposit = Deposit {
            proof,
            data: data.clone(),
        };
        process_deposit(&mut state, &deposit, &spec).unwrap();
        assert_eq!(state.validators.len(), 1);
        assert_eq!(state.balances[0], 1_000_000_000);

        // A second deposit to the same pubkey tops up rather than creating a new validator.
        tree.push_leaf(leaf).unwrap();
        state.eth1_data.deposit_root = tree.root();
        let proof2 = tree.generate_proof(1).unwrap();
        let deposit2 = Deposit { proof: proof2, data };
        process_deposit(&mut state, &deposit2, &spec).unwrap();

        assert_eq!(state.validators.len(), 1);
        assert_eq!(state.balances[0], 2_000_000_000);
        assert_eq!(state.eth1_deposit_index, 2);
    }

    #[test]
    fn process_deposit_rejects_bad_proof() {
        let spec = ChainSpec::minimal();
        let mut state = genesis_state(&spec);

        let data = types::DepositData {
            pubkey: PublicKeyBytes([3u8; 48]),
            withdrawal_credentials: Hash256::zero(),
            amount: 1_000_000_000,
            signature: SignatureBytes::zero(),
        };
        let deposit = Deposit {
            proof: vec![Hash256::zero(); spec.deposit_contract_tree_depth as usize],
            data,
        };

        let err = process_deposit(&mut state, &deposit, &spec).unwrap_err();
        assert_eq!(
            err,
            BlockProcessingError::DepositMerkleInvalid { deposit_index: 0 }
        );
    }

    #[test]
    fn eth1_vote_adopted_on_majority() {
        let spec = ChainSpec::minimal();
        let mut state = genesis_state(&spec);
        let vote = Eth1Data {
            deposit_root: Hash256::repeat_byte(1),
            deposit_count: 1,
            block_hash: Hash256::repeat_byte(2),
        };

        process_eth1_data(&mut state, &vote);
        assert_eq!(state.eth1_data, vote);
    }

    #[test]
    fn stf_applies_header_and_leaves_parent_untouched() {
        let spec = ChainSpec::minimal();
        let parent = genesis_state(&spec);

        let mut block = BeaconBlock::empty();
        block.slot = types::Slot::new(1);
        block.parent_root = parent.latest_block_header.canonical_root();
        block.body = BeaconBlockBody::default();

        let signed = SignedBeaconBlock {
            message: block,
            signature: SignatureBytes::zero(),
        };

        let new_state = stf(&parent, &signed, &spec).unwrap();
        assert_eq!(new_state.slot, types::Slot::new(1));
        assert_eq!(parent.slot, types::Slot::new(0));
    }
}
