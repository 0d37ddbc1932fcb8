use crate::ForkChoiceStore;
use proto_array::{Block as ProtoBlock, ProtoArrayForkChoice};
use ssz_derive::{Decode, Encode};
use types::{BeaconBlock, BeaconState, BeaconStateError, ChainSpec, Epoch, Hash256, IndexedAttestation, Slot};

/// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#configuration
pub const SAFE_SLOTS_TO_UPDATE_JUSTIFIED: u64 = 8;

#[derive(Debug)]
pub enum Error<T> {
    InvalidAttestation(InvalidAttestation),
    InvalidBlock(InvalidBlock),
    ProtoArrayError(String),
    InvalidProtoArrayBytes(String),
    MissingProtoArrayBlock(Hash256),
    InconsistentOnTick { previous_slot: Slot, time: Slot },
    BeaconStateError(BeaconStateError),
    ForkChoiceStoreError(T),
    UnableToSetJustifiedCheckpoint(T),
    AfterBlockFailed(T),
}

impl<T> From<InvalidAttestation> for Error<T> {
    fn from(e: InvalidAttestation) -> Self {
        Error::InvalidAttestation(e)
    }
}

impl<T> From<String> for Error<T> {
    fn from(e: String) -> Self {
        Error::ProtoArrayError(e)
    }
}

#[derive(Debug)]
pub enum InvalidBlock {
    /// The block slot is greater than the present slot.
    FutureSlot {
        present_slot: Slot,
        block_slot: Slot,
    },
}

#[derive(Debug)]
pub enum InvalidAttestation {
    /// The attestation's aggregation bits were empty when they shouldn't be.
    EmptyAggregationBitfield,
    /// The `attestation.data.beacon_block_root` block is unknown.
    UnknownHeadBlock { beacon_block_root: Hash256 },
    /// `attestation.data.slot` is not from the same epoch as `data.target.epoch`.
    BadTargetEpoch,
    /// The target root of the attestation points to a block that we have not verified.
    UnknownTargetRoot(Hash256),
    /// The attestation is for an epoch in the future (w.r.t. gossip clock disparity).
    FutureEpoch {
        attestation_epoch: Epoch,
        current_epoch: Epoch,
    },
    /// The attestation is for an epoch in the past (w.r.t. gossip clock disparity).
    PastEpoch {
        attestation_epoch: Epoch,
        current_epoch: Epoch,
    },
    /// The attestation references a target root that does not match what is stored in our
    /// database.
    InvalidTarget { attestation: Hash256, block: Hash256 },
    /// The attestation attests to a state later than itself.
    AttestsToFutureBlock { block: Slot, attestation: Slot },
}

/// Calculate how far `slot` lies from the start of its epoch.
///
/// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#compute_slots_since_epoch_start
pub fn compute_slots_since_epoch_start(slot: Slot, spec: &ChainSpec) -> Slot {
    slot - slot
        .epoch(spec.slots_per_epoch)
        .start_slot(spec.slots_per_epoch)
}

/// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/beacon-chain.md#compute_start_slot_at_epoch
fn compute_start_slot_at_epoch(epoch: Epoch, spec: &ChainSpec) -> Slot {
    epoch.start_slot(spec.slots_per_epoch)
}

/// Called whenever the current time increases.
///
/// ## Notes
///
/// This function should only ever be passed a `time` that is less than, equal to or one greater
/// than the previously passed value. I.e., it must be called each time the slot changes.
///
/// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#on_tick
fn on_tick<T: ForkChoiceStore>(store: &mut T, time: Slot, spec: &ChainSpec) -> Result<(), Error<T::Error>> {
    let previous_slot = store.get_current_slot();

    if time > previous_slot + 1 {
        return Err(Error::InconsistentOnTick {
            previous_slot,
            time,
        });
    }

    store.set_current_slot(time);

    let current_slot = store.get_current_slot();
    if !(current_slot > previous_slot && compute_slots_since_epoch_start(current_slot, spec) == Slot::new(0)) {
        return Ok(());
    }

    if store.best_justified_checkpoint().epoch > store.justified_checkpoint().epoch {
        store
            .set_justified_checkpoint_to_best_justified_checkpoint()
            .map_err(Error::ForkChoiceStoreError)?;
    }

    Ok(())
}

/// Used for queuing attestations from the current slot. Only contains the minimum necessary
/// information about the attestation.
#[derive(Clone, PartialEq, Encode, Decode)]
pub struct QueuedAttestation {
    slot: Slot,
    attesting_indices: Vec<u64>,
    block_root: Hash256,
    target_epoch: Epoch,
}

impl From<&IndexedAttestation> for QueuedAttestation {
    fn from(a: &IndexedAttestation) -> Self {
        Self {
            slot: a.data.slot,
            attesting_indices: a.attesting_indices.clone(),
            block_root: a.data.beacon_block_root,
            target_epoch: a.data.target.epoch,
        }
    }
}

/// Returns all values in `queued_attestations` whose slot is earlier than `current_slot`,
/// removing them from `queued_attestations`. Relies on `queued_attestations` staying sorted by
/// ascending slot, which holds because `on_attestation` only ever appends.
fn dequeue_attestations(
    current_slot: Slot,
    queued_attestations: &mut Vec<QueuedAttestation>,
) -> Vec<QueuedAttestation> {
    let remaining = queued_attestations.split_off(
        queued_attestations
            .iter()
            .position(|a| a.slot >= current_slot)
            .unwrap_or(queued_attestations.len()),
    );

    std::mem::replace(queued_attestations, remaining)
}

/// Provides an implementation of "Ethereum 2.0 Phase 0 -- Beacon Chain Fork Choice".
///
/// Wraps `ProtoArrayForkChoice` (the LMD-GHOST DAG) and adds:
///
/// - Management of the justified/best-justified/finalized checkpoints via `T: ForkChoiceStore`.
/// - Queuing of attestations observed for the current slot, applied once the slot has passed.
pub struct ForkChoice<T> {
    fc_store: T,
    proto_array: ProtoArrayForkChoice,
    /// Used for resolving the `0x00..00` alias back to genesis.
    ///
    /// Does not necessarily need to be the _actual_ genesis; it suffices to be the finalized root
    /// whenever the struct was instantiated.
    genesis_block_root: Hash256,
    queued_attestations: Vec<QueuedAttestation>,
}

impl<T> ForkChoice<T>
where
    T: ForkChoiceStore,
{
    /// Instantiates `Self` from the genesis parameters.
    pub fn from_genesis(
        fc_store: T,
        genesis_block_root: Hash256,
        genesis_block: &BeaconBlock,
        genesis_state: &BeaconState,
    ) -> Result<Self, Error<T::Error>> {
        let finalized_block_slot = genesis_block.slot;
        let finalized_block_state_root = genesis_block.state_root;
        let justified_epoch = genesis_state.current_epoch();
        let finalized_epoch = genesis_state.current_epoch();

        let proto_array = ProtoArrayForkChoice::new(
            finalized_block_slot,
            finalized_block_state_root,
            justified_epoch,
            finalized_epoch,
            genesis_block_root,
        )?;

        Ok(Self {
            fc_store,
            proto_array,
            genesis_block_root,
            queued_attestations: vec![],
        })
    }

    /// Instantiates `Self` from existing components, as when loaded from disk after a restart.
    pub fn from_components(
        fc_store: T,
        proto_array: ProtoArrayForkChoice,
        genesis_block_root: Hash256,
        queued_attestations: Vec<QueuedAttestation>,
    ) -> Self {
        Self {
            fc_store,
            proto_array,
            genesis_block_root,
            queued_attestations,
        }
    }

    /// Returns the block root of an ancestor of `block_root` at `ancestor_slot`.
    ///
    /// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#get_ancestor
    fn get_ancestor(
        &self,
        state: &BeaconState,
        block_root: Hash256,
        ancestor_slot: Slot,
    ) -> Result<Hash256, Error<T::Error>> {
        let block = self
            .proto_array
            .get_block(&block_root)
            .ok_or(Error::MissingProtoArrayBlock(block_root))?;

        if block.slot > ancestor_slot {
            self.fc_store
                .ancestor_at_slot(state, block_root, ancestor_slot)
                .map_err(Error::ForkChoiceStoreError)
        } else {
            // Equal slot: `block_root` is the ancestor. Earlier slot: a skip slot, so the most
            // recent root prior to `ancestor_slot` is still `block_root`.
            Ok(block_root)
        }
    }

    /// Run the fork choice rule to determine the head.
    ///
    /// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#get_head
    pub fn get_head(&mut self, current_slot: Slot, spec: &ChainSpec) -> Result<Hash256, Error<T::Error>> {
        self.update_time(current_slot, spec)?;

        let store = &mut self.fc_store;
        let genesis_block_root = self.genesis_block_root;

        let remove_alias = |root| {
            if root == Hash256::zero() {
                genesis_block_root
            } else {
                root
            }
        };

        self.proto_array
            .find_head(
                store.justified_checkpoint().epoch,
                remove_alias(store.justified_checkpoint().root),
                store.finalized_checkpoint().epoch,
                store.justified_balances(),
            )
            .map_err(Into::into)
    }

    /// Returns `true` if the store should update `justified_checkpoint` to
    /// `state.current_justified_checkpoint`.
    ///
    /// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#should_update_justified_checkpoint
    fn should_update_justified_checkpoint(
        &mut self,
        current_slot: Slot,
        state: &BeaconState,
        spec: &ChainSpec,
    ) -> Result<bool, Error<T::Error>> {
        self.update_time(current_slot, spec)?;

        let new_justified_checkpoint = &state.current_justified_checkpoint;

        if compute_slots_since_epoch_start(self.fc_store.get_current_slot(), spec).as_u64()
            < SAFE_SLOTS_TO_UPDATE_JUSTIFIED
        {
            return Ok(true);
        }

        let justified_slot = compute_start_slot_at_epoch(self.fc_store.justified_checkpoint().epoch, spec);
        if self.get_ancestor(state, new_justified_checkpoint.root, justified_slot)?
            != self.fc_store.justified_checkpoint().root
        {
            return Ok(false);
        }

        Ok(true)
    }

    /// Add `block` to the fork choice DAG.
    ///
    /// Approximates, but does not perform signature/state-transition verification on, `block`:
    /// the caller is assumed to have already validated it.
    ///
    /// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#on_block
    pub fn on_block(
        &mut self,
        current_slot: Slot,
        block: &BeaconBlock,
        block_root: Hash256,
        state: &BeaconState,
        spec: &ChainSpec,
    ) -> Result<(), Error<T::Error>> {
        let current_slot = self.update_time(current_slot, spec)?;

        // Blocks cannot be in the future. If they are, consideration must be delayed until they
        // are in the past.
        //
        // Note: presently we do not delay consideration, we just drop the block.
        if block.slot > current_slot {
            return Err(Error::InvalidBlock(InvalidBlock::FutureSlot {
                present_slot: current_slot,
                block_slot: block.slot,
            }));
        }

        if state.current_justified_checkpoint.epoch > self.fc_store.justified_checkpoint().epoch {
            if state.current_justified_checkpoint.epoch > self.fc_store.best_justified_checkpoint().epoch {
                self.fc_store.set_best_justified_checkpoint(state);
            }
            if self.should_update_justified_checkpoint(current_slot, state, spec)? {
                self.fc_store
                    .set_justified_checkpoint(state)
                    .map_err(Error::UnableToSetJustifiedCheckpoint)?;
            }
        }

        if state.finalized_checkpoint.epoch > self.fc_store.finalized_checkpoint().epoch {
            self.fc_store.set_finalized_checkpoint(state.finalized_checkpoint);
            let finalized_slot = compute_start_slot_at_epoch(self.fc_store.finalized_checkpoint().epoch, spec);

            if state.current_justified_checkpoint.epoch > self.fc_store.justified_checkpoint().epoch
                || self.get_ancestor(state, self.fc_store.justified_checkpoint().root, finalized_slot)?
                    != self.fc_store.finalized_checkpoint().root
            {
                self.fc_store
                    .set_justified_checkpoint(state)
                    .map_err(Error::UnableToSetJustifiedCheckpoint)?;
            }
        }

        let target_slot = block.slot.epoch(spec.slots_per_epoch).start_slot(spec.slots_per_epoch);
        let target_root = if block.slot == target_slot {
            block_root
        } else {
            state
                .get_block_root(target_slot)
                .map_err(Error::BeaconStateError)?
        };

        // This does not apply a vote to the block, it just makes fork choice aware of the block
        // so it can be identified as the head even before it has any votes.
        self.proto_array.process_block(ProtoBlock {
            slot: block.slot,
            root: block_root,
            parent_root: Some(block.parent_root),
            target_root,
            state_root: block.state_root,
            justified_epoch: state.current_justified_checkpoint.epoch,
            finalized_epoch: state.finalized_checkpoint.epoch,
        })?;

        self.fc_store
            .after_block(block, block_root, state)
            .map_err(Error::AfterBlockFailed)?;

        Ok(())
    }

    fn validate_on_attestation(
        &self,
        indexed_attestation: &IndexedAttestation,
        spec: &ChainSpec,
    ) -> Result<(), InvalidAttestation> {
        // There is no point processing an attestation with an empty bitfield. Reject it
        // immediately to avoid wasting resources verifying the rest of it.
        if indexed_attestation.attesting_indices.is_empty() {
            return Err(InvalidAttestation::EmptyAggregationBitfield);
        }

        let slot_now = self.fc_store.get_current_slot();
        let epoch_now = slot_now.epoch(spec.slots_per_epoch);
        let target = indexed_attestation.data.target;

        if target.epoch > epoch_now {
            return Err(InvalidAttestation::FutureEpoch {
                attestation_epoch: target.epoch,
                current_epoch: epoch_now,
            });
        } else if target.epoch + 1 < epoch_now {
            return Err(InvalidAttestation::PastEpoch {
                attestation_epoch: target.epoch,
                current_epoch: epoch_now,
            });
        }

        if target.epoch != indexed_attestation.data.slot.epoch(spec.slots_per_epoch) {
            return Err(InvalidAttestation::BadTargetEpoch);
        }

        if !self.proto_array.contains_block(&target.root) {
            return Err(InvalidAttestation::UnknownTargetRoot(target.root));
        }

        let block = self
            .proto_array
            .get_block(&indexed_attestation.data.beacon_block_root)
            .ok_or(InvalidAttestation::UnknownHeadBlock {
                beacon_block_root: indexed_attestation.data.beacon_block_root,
            })?;

        if block.target_root != target.root {
            return Err(InvalidAttestation::InvalidTarget {
                attestation: target.root,
                block: block.target_root,
            });
        }

        if block.slot > indexed_attestation.data.slot {
            return Err(InvalidAttestation::AttestsToFutureBlock {
                block: block.slot,
                attestation: indexed_attestation.data.slot,
            });
        }

        Ok(())
    }

    /// Register `attestation` with the fork choice DAG so it may influence future calls to
    /// `Self::get_head`. Approximates, but does not itself verify signatures on, `attestation`.
    ///
    /// https://github.com/ethereum/eth2.0-specs/blob/v0.12.0/specs/phase0/fork-choice.md#on_attestation
    pub fn on_attestation(
        &mut self,
        current_slot: Slot,
        attestation: &IndexedAttestation,
        spec: &ChainSpec,
    ) -> Result<(), Error<T::Error>> {
        self.update_time(current_slot, spec)?;

        // Ignore attestations to the zero hash: this is the alias for the genesis block, and
        // votes toward genesis carry no information (every validator implicitly attests to
        // genesis just by being present in the chain).
        if attestation.data.beacon_block_root == Hash256::zero() {
            return Ok(());
        }

        self.validate_on_attestation(attestation, spec)?;

        if attestation.data.slot < self.fc_store.get_current_slot() {
            for validator_index in &attestation.attesting_indices {
                self.proto_array.process_attestation(
                    *validator_index as usize,
                    attestation.data.beacon_block_root,
                    attestation.data.target.epoch,
                )?;
            }
        } else {
            // "Attestations can only affect the fork choice of subsequent slots. Delay
            // consideration in the fork choice until their slot is in the past."
            self.queued_attestations.push(QueuedAttestation::from(attestation));
        }

        Ok(())
    }

    /// Calls `on_tick` for every slot between `fc_store.get_current_slot()` and `current_slot`.
    /// Returns the resulting value of `fc_store.get_current_slot()`.
    pub fn update_time(&mut self, current_slot: Slot, spec: &ChainSpec) -> Result<Slot, Error<T::Error>> {
        while self.fc_store.get_current_slot() < current_slot {
            let previous_slot = self.fc_store.get_current_slot();
            on_tick(&mut self.fc_store, previous_slot + 1, spec)?;
        }

        self.process_attestation_queue(spec)?;

        Ok(self.fc_store.get_current_slot())
    }

    /// Processes and removes any queued attestations that may now be eligible for processing
    /// after the slot clock incremented.
    fn process_attestation_queue(&mut self, _spec: &ChainSpec) -> Result<(), Error<T::Error>> {
        for attestation in
            dequeue_attestations(self.fc_store.get_current_slot(), &mut self.queued_attestations)
        {
            for validator_index in &attestation.attesting_indices {
                self.proto_array.process_attestation(
                    *validator_index as usize,
                    attestation.block_root,
                    attestation.target_epoch,
                )?;
            }
        }

        Ok(())
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.contains_block(block_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<ProtoBlock> {
        self.proto_array.get_block(block_root)
    }

    /// Returns the latest vote for `validator_index`, if any, as `(block_root, target_epoch)`.
    ///
    /// Callers should call `Self::update_time` first, since some attestations might still be
    /// queued and awaiting processing.
    pub fn latest_message(&self, validator_index: usize) -> Option<(Hash256, Epoch)> {
        self.proto_array.latest_message(validator_index)
    }

    pub fn proto_array(&self) -> &ProtoArrayForkChoice {
        &self.proto_array
    }

    pub fn fc_store(&self) -> &T {
        &self.fc_store
    }

    pub fn genesis_block_root(&self) -> &Hash256 {
        &self.genesis_block_root
    }

    pub fn queued_attestations(&self) -> &[QueuedAttestation] {
        &self.queued_attestations
    }

    /// Prunes the underlying fork choice DAG to the current finalized root.
    pub fn prune(&mut self) -> Result<(), Error<T::Error>> {
        let finalized_checkpoint = *self.fc_store.finalized_checkpoint();
        self.proto_array
            .maybe_prune(finalized_checkpoint.epoch, finalized_checkpoint.root)
            .map_err(Into::into)
    }

    /// Instantiates `Self` from a `PersistedForkChoice` produced by an earlier `to_persisted`.
    pub fn from_persisted(persisted: PersistedForkChoice, fc_store: T) -> Result<Self, Error<T::Error>> {
        let proto_array = ProtoArrayForkChoice::from_bytes(&persisted.proto_array_bytes)
            .map_err(Error::InvalidProtoArrayBytes)?;

        Ok(Self {
            fc_store,
            proto_array,
            genesis_block_root: persisted.genesis_block_root,
            queued_attestations: persisted.queued_attestations,
        })
    }

    /// Snapshots `Self` into a `PersistedForkChoice`, allowing it to be reconstructed later.
    pub fn to_persisted(&self) -> PersistedForkChoice {
        PersistedForkChoice {
            proto_array_bytes: self.proto_array().as_bytes(),
            queued_attestations: self.queued_attestations().to_vec(),
            genesis_block_root: *self.genesis_block_root(),
        }
    }
}

/// SSZ-encodable snapshot of a `ForkChoice`'s state, used to persist fork choice across a process
/// restart.
#[derive(Encode, Decode, Clone)]
pub struct PersistedForkChoice {
    proto_array_bytes: Vec<u8>,
    queued_attestations: Vec<QueuedAttestation>,
    genesis_block_root: Hash256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_since_epoch_start() {
        let spec = ChainSpec::minimal();
        for epoch in 0..3u64 {
            for slot in 0..spec.slots_per_epoch {
                let input = epoch * spec.slots_per_epoch + slot;
                assert_eq!(
                    compute_slots_since_epoch_start(Slot::new(input), &spec).as_u64(),
                    slot
                );
            }
        }
    }

    #[test]
    fn start_slot_at_epoch() {
        let spec = ChainSpec::minimal();
        for epoch in 0..3u64 {
            assert_eq!(
                compute_start_slot_at_epoch(Epoch::new(epoch), &spec).as_u64(),
                epoch * spec.slots_per_epoch
            );
        }
    }

    fn get_queued_attestations() -> Vec<QueuedAttestation> {
        (1..4)
            .map(|i| QueuedAttestation {
                slot: Slot::new(i),
                attesting_indices: vec![],
                block_root: Hash256::zero(),
                target_epoch: Epoch::new(0),
            })
            .collect()
    }

    fn get_slots(queued_attestations: &[QueuedAttestation]) -> Vec<u64> {
        queued_attestations.iter().map(|a| a.slot.as_u64()).collect()
    }

    #[test]
    fn dequeuing_attestations() {
        let mut queued = get_queued_attestations();
        let dequeued = dequeue_attestations(Slot::new(0), &mut queued);
        assert_eq!(get_slots(&queued), vec![1, 2, 3]);
        assert!(dequeued.is_empty());

        let mut queued = get_queued_attestations();
        let dequeued = dequeue_attestations(Slot::new(2), &mut queued);
        assert_eq!(get_slots(&queued), vec![2, 3]);
        assert_eq!(get_slots(&dequeued), vec![1]);

        let mut queued = get_queued_attestations();
        let dequeued = dequeue_attestations(Slot::new(4), &mut queued);
        assert!(queued.is_empty());
        assert_eq!(get_slots(&dequeued), vec![1, 2, 3]);
    }
}
