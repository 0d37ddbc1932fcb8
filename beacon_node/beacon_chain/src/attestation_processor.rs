//! The Attestation Processor (§4.F): validates an incoming aggregated `Attestation` and forwards
//! every participating validator's vote to fork choice.

use crate::beacon_fork_choice_store::BeaconForkChoiceStore;
use crate::bls::BlsVerifier;
use crate::errors::AttestationError;
use crate::metrics;
use fork_choice::ForkChoice;
use parking_lot::RwLock;
use slog::{debug, Logger};
use slot_clock::SlotClock;
use std::sync::Arc;
use store::{ItemStore, Store};
use types::{Attestation, ChainSpec, Epoch};

pub struct AttestationProcessor<S: ItemStore, C: SlotClock> {
    store: Arc<Store<S>>,
    fork_choice: Arc<RwLock<ForkChoice<BeaconForkChoiceStore<S>>>>,
    slot_clock: Arc<C>,
    bls_verifier: Arc<dyn BlsVerifier>,
    spec: ChainSpec,
    log: Logger,
}

impl<S: ItemStore, C: SlotClock> AttestationProcessor<S, C> {
    pub fn new(
        store: Arc<Store<S>>,
        fork_choice: Arc<RwLock<ForkChoice<BeaconForkChoiceStore<S>>>>,
        slot_clock: Arc<C>,
        bls_verifier: Arc<dyn BlsVerifier>,
        spec: ChainSpec,
        log: Logger,
    ) -> Self {
        Self {
            store,
            fork_choice,
            slot_clock,
            bls_verifier,
            spec,
            log,
        }
    }

    /// Validates `attestation` and, on success, registers every participating validator's vote
    /// with fork choice. Safe to call concurrently: all serialisation happens at the
    /// `fork_choice` lock (§4.F, §5).
    pub fn receive_attestation(&self, attestation: Attestation) -> Result<(), AttestationError> {
        lighthouse_metrics::inc_counter(&metrics::ATTESTATION_PROCESSING_REQUESTS);

        let block = self
            .store
            .get_block(&attestation.data.beacon_block_root)
            .ok()
            .flatten()
            .ok_or(AttestationError::UnknownHeadBlock(attestation.data.beacon_block_root))?;

        let current_epoch = self
            .slot_clock
            .now()
            .map(|slot| slot.epoch(self.spec.slots_per_epoch))
            .unwrap_or_else(|| Epoch::new(0));

        if attestation.data.target.epoch > current_epoch + 1 {
            return Err(AttestationError::FutureTargetEpoch);
        }

        let target_state = self
            .store
            .get_state(&block.message.state_root)
            .ok()
            .flatten()
            .ok_or(AttestationError::UnknownHeadBlock(attestation.data.beacon_block_root))?;

        let committee =
            target_state.get_beacon_committee(attestation.data.slot, attestation.data.index, &self.spec);

        let pubkeys: Vec<_> = committee
            .iter()
            .filter_map(|i| target_state.validators.get(*i as usize).map(|v| v.pubkey))
            .collect();
        if !self
            .bls_verifier
            .verify(&pubkeys, attestation.data.beacon_block_root.as_bytes(), &attestation.signature)
        {
            debug!(self.log, "Rejecting attestation with invalid signature");
            return Err(AttestationError::InvalidSignature);
        }

        let indexed = attestation
            .into_indexed(&committee)
            .ok_or(AttestationError::EmptyCommittee)?;

        let current_slot = self.slot_clock.now().unwrap_or(target_state.slot);
        self.fork_choice
            .write()
            .on_attestation(current_slot, &indexed, &self.spec)?;

        lighthouse_metrics::inc_counter(&metrics::ATTESTATION_PROCESSING_SUCCESSES);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::NullBlsVerifier;
    use fork_choice::ForkChoice;
    use slog::{o, Discard};
    use slot_clock::ManualSlotClock;
    use std::time::Duration;
    use store::MemoryStore;
    use types::{
        Bitfield, BeaconBlock, BeaconState, Checkpoint, Eth1Data, Hash256, SignatureBytes,
        SignedBeaconBlock, Slot,
    };

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    #[test]
    fn rejects_attestation_to_unknown_block() {
        let spec = ChainSpec::minimal();
        let store = Arc::new(Store::new(Arc::new(MemoryStore::open(test_logger()))));
        let state = BeaconState::new(0, Eth1Data::default(), &spec);
        let genesis_root = Hash256::repeat_byte(1);
        let fc_store = BeaconForkChoiceStore::get_forkchoice_store(store.clone(), genesis_root, &state);
        let fork_choice = Arc::new(RwLock::new(
            ForkChoice::from_genesis(fc_store, genesis_root, &BeaconBlock::empty(), &state).unwrap(),
        ));
        let slot_clock = Arc::new(ManualSlotClock::new(Slot::new(0), Duration::from_secs(0), Duration::from_secs(spec.seconds_per_slot)));

        let processor = AttestationProcessor::new(
            store,
            fork_choice,
            slot_clock,
            Arc::new(NullBlsVerifier),
            spec,
            test_logger(),
        );

        let attestation = Attestation {
            aggregation_bits: Bitfield::with_capacity(1),
            data: types::AttestationData {
                slot: Slot::new(0),
                index: 0,
                beacon_block_root: Hash256::repeat_byte(9),
                source: Checkpoint::default(),
                target: Checkpoint::default(),
            },
            signature: SignatureBytes::zero(),
        };

        assert!(matches!(
            processor.receive_attestation(attestation),
            Err(AttestationError::UnknownHeadBlock(_))
        ));
    }

    #[test]
    fn rejects_attestation_targeting_far_future_epoch() {
        let spec = ChainSpec::minimal();
        let store = Arc::new(Store::new(Arc::new(MemoryStore::open(test_logger()))));
        let state = BeaconState::new(0, Eth1Data::default(), &spec);
        let state_root = state.canonical_root();
        store.put_state(&state_root, &state).unwrap();

        let mut genesis_block = BeaconBlock::empty();
        genesis_block.state_root = state_root;
        let signed = SignedBeaconBlock {
            message: genesis_block.clone(),
            signature: SignatureBytes::zero(),
        };
        let genesis_root = genesis_block.canonical_root();
        store.put_block(&genesis_root, &signed).unwrap();

        let fc_store = BeaconForkChoiceStore::get_forkchoice_store(store.clone(), genesis_root, &state);
        let fork_choice = Arc::new(RwLock::new(
            ForkChoice::from_genesis(fc_store, genesis_root, &genesis_block, &state).unwrap(),
        ));
        let slot_clock = Arc::new(ManualSlotClock::new(Slot::new(0), Duration::from_secs(0), Duration::from_secs(spec.seconds_per_slot)));

        let processor = AttestationProcessor::new(
            store,
            fork_choice,
            slot_clock,
            Arc::new(NullBlsVerifier),
            spec,
            test_logger(),
        );

        let attestation = Attestation {
            aggregation_bits: Bitfield::with_capacity(0),
            data: types::AttestationData {
                slot: Slot::new(0),
                index: 0,
                beacon_block_root: genesis_root,
                source: Checkpoint::default(),
                target: Checkpoint::new(Epoch::new(50), genesis_root),
            },
            signature: SignatureBytes::zero(),
        };

        assert!(matches!(
            processor.receive_attestation(attestation),
            Err(AttestationError::FutureTargetEpoch)
        ));
    }
}
