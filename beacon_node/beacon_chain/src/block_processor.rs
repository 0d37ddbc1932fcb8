//! The Block Processor (§4.G): drives an incoming `SignedBeaconBlock` through
//! `Received → Validated → Applied → Stored → Notified`, rejecting at whichever stage first
//! finds a problem. A block whose parent has not yet reached `Stored` is parked in an orphan pool
//! keyed by `parent_root` and redriven once that parent lands.

use crate::attestation_processor::AttestationProcessor;
use crate::beacon_fork_choice_store::BeaconForkChoiceStore;
use crate::chain_config::ChainConfig;
use crate::errors::BlockError;
use crate::events::{BlockEventData, EventKind, HeadEventData, ServerSentEventHandler};
use crate::metrics;
use fork_choice::ForkChoice;
use parking_lot::RwLock;
use slog::{debug, error, info, warn, Logger};
use slot_clock::SlotClock;
use state_processing::stf;
use std::collections::HashMap;
use std::sync::Arc;
use store::{ItemStore, Store, StoreOp};
use types::{ChainSpec, Hash256, SignedBeaconBlock, Slot};

pub struct BlockProcessor<S: ItemStore, C: SlotClock> {
    store: Arc<Store<S>>,
    fork_choice: Arc<RwLock<ForkChoice<BeaconForkChoiceStore<S>>>>,
    slot_clock: Arc<C>,
    attestation_processor: Arc<AttestationProcessor<S, C>>,
    events: Arc<ServerSentEventHandler>,
    chain_config: ChainConfig,
    spec: ChainSpec,
    /// Blocks waiting on a parent that has not yet been applied, keyed by `parent_root`.
    orphans: RwLock<HashMap<Hash256, Vec<SignedBeaconBlock>>>,
    log: Logger,
}

impl<S: ItemStore, C: SlotClock> BlockProcessor<S, C> {
    pub fn new(
        store: Arc<Store<S>>,
        fork_choice: Arc<RwLock<ForkChoice<BeaconForkChoiceStore<S>>>>,
        slot_clock: Arc<C>,
        attestation_processor: Arc<AttestationProcessor<S, C>>,
        events: Arc<ServerSentEventHandler>,
        chain_config: ChainConfig,
        spec: ChainSpec,
        log: Logger,
    ) -> Self {
        Self {
            store,
            fork_choice,
            slot_clock,
            attestation_processor,
            events,
            chain_config,
            spec,
            orphans: RwLock::new(HashMap::new()),
            log,
        }
    }

    fn current_slot(&self) -> Slot {
        self.slot_clock.now().unwrap_or_else(|| Slot::new(0))
    }

    /// Runs `block` through the full pipeline. Returns `Ok(block_root)` once the block and
    /// everything it unblocked in the orphan pool has reached Stored/Notified.
    pub fn receive_block(&self, block: SignedBeaconBlock) -> Result<Hash256, BlockError> {
        lighthouse_metrics::inc_counter(&metrics::BLOCK_PROCESSING_REQUESTS);
        let block_root = self.apply_one(block)?;
        self.drain_orphans_of(block_root);
        Ok(block_root)
    }

    /// Validates, applies and stores a single block, without touching its orphans. Does not park
    /// `block` itself on failure other than `UnknownParent` — the parking happens in
    /// `receive_block`/`drain_orphans_of` so a block is only ever parked once.
    fn apply_one(&self, block: SignedBeaconBlock) -> Result<Hash256, BlockError> {
        let block_root = block.canonical_root();
        let parent_root = block.parent_root();

        // An already-stored block is a no-op: re-running `stf`/`fork_choice.on_block` against a
        // block already in `proto_array` would push a duplicate node (§8).
        if self.store.get_block(&block_root)?.is_some() {
            return Ok(block_root);
        }

        // --- Validated ---
        let parent_block = match self.store.get_block(&parent_root)? {
            Some(parent) => parent,
            None => {
                self.park_orphan(parent_root, block);
                return Err(BlockError::UnknownParent(parent_root));
            }
        };

        if block.slot() <= parent_block.slot() {
            return Err(BlockError::NotLaterThanParent {
                block_slot: block.slot().as_u64(),
                parent_slot: parent_block.slot().as_u64(),
            });
        }

        let current_slot = self.current_slot();
        let max_skip = self
            .chain_config
            .import_max_skip_slots
            .unwrap_or(self.spec.maximum_future_slots);
        if block.slot() > current_slot + max_skip {
            return Err(BlockError::FutureSlot {
                block_slot: block.slot().as_u64(),
                current_slot: current_slot.as_u64(),
            });
        }

        let parent_state = self
            .store
            .get_state(&parent_block.message.state_root)?
            .ok_or(BlockError::StoreError(store::Error::MissingState(
                parent_block.message.state_root,
            )))?;

        // --- Applied ---
        let new_state = stf(&parent_state, &block, &self.spec)?;

        let computed_state_root = new_state.canonical_root();
        if computed_state_root != block.message.state_root {
            return Err(BlockError::StateRootMismatch {
                claimed: block.message.state_root,
                computed: computed_state_root,
            });
        }

        self.fork_choice.write().on_block(
            current_slot,
            &block.message,
            block_root,
            &new_state,
            &self.spec,
        )?;

        // --- Stored ---
        self.store.do_atomically(vec![
            StoreOp::PutBlock(block_root, &block),
            StoreOp::PutState(computed_state_root, &new_state),
            StoreOp::PutBlockRootAtSlot(block.slot(), block_root),
        ])?;

        self.update_chain_head(current_slot)?;

        // --- Notified ---
        self.events.register(EventKind::Block(BlockEventData {
            block_root,
            slot: block.slot(),
        }));

        for attestation in &block.message.body.attestations {
            if let Err(e) = self
                .attestation_processor
                .receive_attestation(attestation.clone())
            {
                debug!(self.log, "Embedded attestation rejected"; "error" => ?e);
            }
        }

        lighthouse_metrics::inc_counter(&metrics::BLOCK_PROCESSING_SUCCESSES);
        info!(self.log, "Block processed"; "slot" => block.slot().as_u64(), "root" => ?block_root);

        Ok(block_root)
    }

    /// Recomputes the fork choice head and, if it moved, atomically persists it as `chain.head`
    /// and emits `head`/`justified`/`finalized` events for whatever changed alongside it.
    fn update_chain_head(&self, current_slot: Slot) -> Result<(), BlockError> {
        let new_head_root = self.fork_choice.write().get_head(current_slot, &self.spec)?;

        if self.store.head_block_root()? == Some(new_head_root) {
            return Ok(());
        }

        let head_block = self
            .store
            .get_block(&new_head_root)?
            .ok_or(BlockError::StoreError(store::Error::MissingBlock(new_head_root)))?;
        let head_state_root = head_block.message.state_root;
        let head_state = self
            .store
            .get_state(&head_state_root)?
            .ok_or(BlockError::StoreError(store::Error::MissingState(head_state_root)))?;

        self.store
            .store_chain_head(new_head_root, &head_block, head_state_root, &head_state)?;

        lighthouse_metrics::set_gauge(&metrics::HEAD_SLOT, head_block.slot().as_u64() as i64);
        self.events.register(EventKind::Head(HeadEventData {
            block_root: new_head_root,
            state_root: head_state_root,
            slot: head_block.slot(),
        }));

        let fc_store = self.fork_choice.read();
        let justified = *fc_store.fc_store().justified_checkpoint();
        let finalized = *fc_store.fc_store().finalized_checkpoint();
        drop(fc_store);

        if self.store.justified_block_root()? != Some(justified.root) {
            if let Some(justified_state_root) = self
                .store
                .get_block(&justified.root)?
                .map(|b| b.message.state_root)
            {
                self.store
                    .set_justified_checkpoint_roots(justified.root, justified_state_root)?;
                self.events.register(EventKind::Justified(justified));
            }
        }

        if self.store.finalized_block_root()? != Some(finalized.root) {
            if let Some(finalized_state_root) = self
                .store
                .get_block(&finalized.root)?
                .map(|b| b.message.state_root)
            {
                self.store
                    .set_finalized_checkpoint_roots(finalized.root, finalized_state_root)?;
                lighthouse_metrics::set_gauge(&metrics::FINALIZED_EPOCH, finalized.epoch.as_u64() as i64);
                self.events.register(EventKind::Finalized(finalized));
            }
        }

        Ok(())
    }

    fn park_orphan(&self, parent_root: Hash256, block: SignedBeaconBlock) {
        warn!(self.log, "Parking block with unknown parent"; "parent_root" => ?parent_root, "slot" => block.slot().as_u64());
        self.orphans.write().entry(parent_root).or_default().push(block);
        lighthouse_metrics::set_gauge(&metrics::BLOCK_PROCESSING_ORPHANED, self.orphan_count() as i64);
    }

    fn orphan_count(&self) -> usize {
        self.orphans.read().values().map(Vec::len).sum()
    }

    /// Retries every block parked on `parent_root`, recursively draining any of those blocks'
    /// own orphans in turn. A block that fails for a reason other than `UnknownParent` is logged
    /// and dropped — it will never be retried, matching the permanent/transient split in §7.
    fn drain_orphans_of(&self, parent_root: Hash256) {
        let waiting = match self.orphans.write().remove(&parent_root) {
            Some(waiting) => waiting,
            None => return,
        };

        for block in waiting {
            let slot = block.slot();
            match self.apply_one(block) {
                Ok(root) => self.drain_orphans_of(root),
                Err(BlockError::UnknownParent(_)) => {
                    // Re-parked by `apply_one` under its own (different) parent.
                }
                Err(e) => {
                    error!(self.log, "Orphaned block permanently rejected"; "slot" => slot.as_u64(), "error" => ?e);
                }
            }
        }

        lighthouse_metrics::set_gauge(&metrics::BLOCK_PROCESSING_ORPHANED, self.orphan_count() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_fork_choice_store::BeaconForkChoiceStore;
    use crate::bls::NullBlsVerifier;
    use slog::{o, Discard};
    use slot_clock::ManualSlotClock;
    use std::time::Duration;
    use store::MemoryStore;
    use types::{BeaconBlock, BeaconState, Eth1Data, SignatureBytes};

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    /// Builds a child of `parent_root`/`parent_state`, running `stf` to fill in the real
    /// post-state root the way a proposer would — `apply_one` now rejects a block whose claimed
    /// `state_root` disagrees with what `stf` actually computes.
    fn child_block(parent_root: Hash256, parent_state: &BeaconState, slot: u64, spec: &ChainSpec) -> SignedBeaconBlock {
        let mut message = BeaconBlock::empty();
        message.slot = Slot::new(slot);
        message.parent_root = parent_root;

        let unsigned = SignedBeaconBlock {
            message: message.clone(),
            signature: SignatureBytes::zero(),
        };
        let new_state = state_processing::stf(parent_state, &unsigned, spec).unwrap();
        message.state_root = new_state.canonical_root();

        SignedBeaconBlock {
            message,
            signature: SignatureBytes::zero(),
        }
    }

    fn new_processor() -> (
        BlockProcessor<MemoryStore, ManualSlotClock>,
        Hash256,
        BeaconState,
        ChainSpec,
    ) {
        let spec = ChainSpec::minimal();
        let store = Arc::new(Store::new(Arc::new(MemoryStore::open(test_logger()))));
        let state = BeaconState::new(0, Eth1Data::default(), &spec);
        let state_root = state.canonical_root();
        store.put_state(&state_root, &state).unwrap();

        let mut genesis_block = BeaconBlock::empty();
        genesis_block.state_root = state_root;
        // The root a child block's `parent_root` must match is the root of the placeholder
        // header `BeaconState::new` installs (zeroed `state_root`/`parent_root`), not of the
        // genesis block itself — this sidesteps the circular dependency a non-placeholder header
        // would have on its own post-state root, matching every later block's header/body-root
        // split (see `BeaconBlockHeader::from`).
        let genesis_root = state.latest_block_header.canonical_root();
        let signed_genesis = SignedBeaconBlock {
            message: genesis_block.clone(),
            signature: SignatureBytes::zero(),
        };
        store
            .store_chain_head(genesis_root, &signed_genesis, state_root, &state)
            .unwrap();

        let fc_store = BeaconForkChoiceStore::get_forkchoice_store(store.clone(), genesis_root, &state);
        let fork_choice = Arc::new(RwLock::new(
            ForkChoice::from_genesis(fc_store, genesis_root, &genesis_block, &state).unwrap(),
        ));

        let slot_clock = Arc::new(ManualSlotClock::new(
            Slot::new(0),
            Duration::from_secs(0),
            Duration::from_secs(spec.seconds_per_slot),
        ));
        slot_clock.set_slot(Slot::new(10));

        let attestation_processor = Arc::new(AttestationProcessor::new(
            store.clone(),
            fork_choice.clone(),
            slot_clock.clone(),
            Arc::new(NullBlsVerifier),
            spec.clone(),
            test_logger(),
        ));

        let processor = BlockProcessor::new(
            store,
            fork_choice,
            slot_clock,
            attestation_processor,
            Arc::new(ServerSentEventHandler::new(test_logger())),
            ChainConfig::default(),
            spec.clone(),
            test_logger(),
        );

        (processor, genesis_root, state, spec)
    }

    #[test]
    fn block_with_unknown_parent_is_parked_and_reported() {
        let (processor, _genesis_root, genesis_state, spec) = new_processor();
        let block = child_block(Hash256::repeat_byte(0xaa), &genesis_state, 1, &spec);

        assert!(matches!(
            processor.receive_block(block),
            Err(BlockError::UnknownParent(_))
        ));
        assert_eq!(processor.orphan_count(), 1);
    }

    #[test]
    fn valid_child_of_genesis_becomes_new_head() {
        let (processor, genesis_root, genesis_state, spec) = new_processor();
        let block = child_block(genesis_root, &genesis_state, 1, &spec);

        let block_root = processor.receive_block(block).unwrap();

        assert_eq!(processor.store.head_block_root().unwrap(), Some(block_root));
    }

    #[test]
    fn orphan_is_drained_once_its_parent_arrives() {
        let (processor, genesis_root, genesis_state, spec) = new_processor();
        let parent = child_block(genesis_root, &genesis_state, 1, &spec);
        let parent_root = parent.canonical_root();
        let parent_state = state_processing::stf(&genesis_state, &parent, &spec).unwrap();

        let child = child_block(parent_root, &parent_state, 2, &spec);
        assert!(matches!(
            processor.receive_block(child),
            Err(BlockError::UnknownParent(_))
        ));
        assert_eq!(processor.orphan_count(), 1);

        processor.receive_block(parent).unwrap();

        assert_eq!(processor.orphan_count(), 0);
        let child_root = processor.store.block_root_at_slot(Slot::new(2)).unwrap().unwrap();
        assert_eq!(processor.store.head_block_root().unwrap(), Some(child_root));
    }

    #[test]
    fn reapplying_a_stored_block_is_a_noop() {
        let (processor, genesis_root, genesis_state, spec) = new_processor();
        let block = child_block(genesis_root, &genesis_state, 1, &spec);
        let block_root = processor.receive_block(block.clone()).unwrap();

        let second_root = processor.receive_block(block).unwrap();
        assert_eq!(second_root, block_root);
        assert_eq!(processor.store.head_block_root().unwrap(), Some(block_root));
    }

    #[test]
    fn block_with_mismatched_state_root_is_rejected() {
        let (processor, genesis_root, genesis_state, spec) = new_processor();
        let mut block = child_block(genesis_root, &genesis_state, 1, &spec);
        block.message.state_root = Hash256::repeat_byte(0xff);

        assert!(matches!(
            processor.receive_block(block),
            Err(BlockError::StateRootMismatch { .. })
        ));
        assert_eq!(processor.store.head_block_root().unwrap(), Some(genesis_root));
    }
}
