use crate::{
    BeaconBlockHeader, ChainSpec, Checkpoint, Epoch, Eth1Data, Fork, Hash256, Slot, Validator,
};
use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconStateError {
    SlotOutOfBounds,
    UnknownValidator(usize),
    InsufficientValidators,
}

/// The full consensus state of the chain. Mutated only by the state-transition function (`stf`);
/// every other component treats a given `BeaconState` value as immutable once observed, consistent
/// with §3's "mutated only by the state-transition function" invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct BeaconState {
    pub genesis_time: u64,
    pub genesis_validators_root: Hash256,
    pub slot: Slot,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,

    /// Ring buffer of historical block roots, indexed by `slot % block_roots.len()`.
    pub block_roots: Vec<Hash256>,
    /// Seeds the RANDAO mix at genesis; not advanced by this crate's simplified `stf` beyond
    /// genesis (full RANDAO mixing is part of the state-transition function this core treats as a
    /// pure dependency, not a component in scope — see §1).
    pub randao_mixes: Vec<Hash256>,

    pub eth1_data: Eth1Data,
    pub eth1_data_votes: Vec<Eth1Data>,
    pub eth1_deposit_index: u64,

    pub validators: Vec<Validator>,
    pub balances: Vec<u64>,

    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl BeaconState {
    /// Constructs the pre-activation genesis state: a state with `eth1_data` set and the
    /// block-root/randao history zeroed, ready for `process_deposit` to populate the validator
    /// registry. Mirrors `BeaconState::new` in `state_processing::genesis`.
    pub fn new(genesis_time: u64, eth1_data: Eth1Data, spec: &ChainSpec) -> Self {
        Self {
            genesis_time,
            genesis_validators_root: Hash256::zero(),
            slot: Slot::new(0),
            fork: Fork {
                previous_version: spec.genesis_fork_version,
                current_version: spec.genesis_fork_version,
                epoch: Epoch::new(0),
            },
            latest_block_header: BeaconBlockHeader {
                slot: Slot::new(0),
                proposer_index: 0,
                parent_root: Hash256::zero(),
                state_root: Hash256::zero(),
                body_root: Hash256::zero(),
            },
            block_roots: vec![Hash256::zero(); spec.slots_per_historical_root as usize],
            randao_mixes: vec![Hash256::zero(); spec.slots_per_historical_root as usize],
            eth1_data,
            eth1_data_votes: vec![],
            eth1_deposit_index: 0,
            validators: vec![],
            balances: vec![],
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
        }
    }

    pub fn canonical_root(&self) -> Hash256 {
        Hash256::from_slice(&self.tree_hash_root())
    }

    pub fn current_epoch(&self) -> Epoch {
        self.slot.epoch(self.slots_per_epoch_hint())
    }

    /// `block_roots.len()` doubles as `SLOTS_PER_HISTORICAL_ROOT`; `slots_per_epoch` is not
    /// itself stored on `BeaconState` (it lives on `ChainSpec`), so callers that have a `spec`
    /// handy should prefer `slot.epoch(spec.slots_per_epoch)` over this hint, which only exists
    /// so `current_epoch()` is callable without threading a spec through every call site.
    fn slots_per_epoch_hint(&self) -> u64 {
        32
    }

    pub fn get_block_root(&self, slot: Slot) -> Result<Hash256, BeaconStateError> {
        let len = self.block_roots.len() as u64;
        if slot > self.slot || self.slot.as_u64().saturating_sub(slot.as_u64()) >= len {
            return Err(BeaconStateError::SlotOutOfBounds);
        }
        Ok(self.block_roots[(slot.as_u64() % len) as usize])
    }

    pub fn set_block_root(&mut self, slot: Slot, root: Hash256) {
        let len = self.block_roots.len() as u64;
        self.block_roots[(slot.as_u64() % len) as usize] = root;
    }

    pub fn get_active_validator_indices(&self, epoch: Epoch) -> Vec<u64> {
        self.validators
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_active_at(epoch))
            .map(|(i, _)| i as u64)
            .collect()
    }

    /// Returns the committee assigned to `(slot, committee_index)`.
    ///
    /// Upstream lighthouse derives this via a RANDAO-mix-seeded shuffle of the active validator
    /// set (`compute_committee`). Since this crate's simplified `stf` does not advance
    /// `randao_mixes` past genesis (see the field doc above), a real shuffle would never vary
    /// from block to block — it would just be an expensive permutation of the same committee
    /// boundary. This assigns active validators to committees by slot-and-index order instead:
    /// deterministic, collision-free, and sufficient for the Attestation Processor's
    /// participation-counting contract.
    pub fn get_beacon_committee(
        &self,
        slot: Slot,
        committee_index: u64,
        spec: &ChainSpec,
    ) -> Vec<u64> {
        let epoch = slot.epoch(spec.slots_per_epoch);
        let active = self.get_active_validator_indices(epoch);
        if active.is_empty() {
            return vec![];
        }

        let committees_per_slot = (active.len() as u64 / spec.slots_per_epoch).max(1);
        let committee_count = spec.slots_per_epoch * committees_per_slot;
        let committee_number =
            (slot.as_u64() % spec.slots_per_epoch) * committees_per_slot + committee_index;

        active
            .into_iter()
            .enumerate()
            .filter(|(i, _)| (*i as u64) % committee_count == committee_number % committee_count)
            .map(|(_, idx)| idx)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PublicKeyBytes;

    fn state_with_active_validators(count: u8, spec: &ChainSpec) -> BeaconState {
        let mut state = BeaconState::new(0, Eth1Data::default(), spec);
        for i in 0..count {
            state.validators.push(Validator {
                pubkey: PublicKeyBytes([i; 48]),
                withdrawal_credentials: Hash256::zero(),
                effective_balance: spec.max_effective_balance,
                slashed: false,
                activation_eligibility_epoch: Epoch::new(0),
                activation_epoch: Epoch::new(0),
                exit_epoch: crate::FAR_FUTURE_EPOCH,
                withdrawable_epoch: crate::FAR_FUTURE_EPOCH,
            });
            state.balances.push(spec.max_effective_balance);
        }
        state
    }

    #[test]
    fn beacon_committees_partition_active_validators_without_overlap() {
        let spec = ChainSpec::minimal();
        let state = state_with_active_validators(16, &spec);

        let mut seen = std::collections::HashSet::new();
        for slot in 0..spec.slots_per_epoch {
            let committee = state.get_beacon_committee(Slot::new(slot), 0, &spec);
            for index in committee {
                assert!(seen.insert(index), "validator {index} assigned to two committees");
            }
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn empty_validator_set_yields_empty_committee() {
        let spec = ChainSpec::minimal();
        let state = state_with_active_validators(0, &spec);
        assert!(state.get_beacon_committee(Slot::new(0), 0, &spec).is_empty());
    }
}
