//! The Chain Coordinator (§4.H): owns the store, fork choice and slot clock shared by the Block
//! and Attestation Processors, bootstraps from a genesis state, and caches the `ForkDigest` the
//! rest of the node tags its network traffic with.

use crate::attestation_processor::AttestationProcessor;
use crate::beacon_fork_choice_store::BeaconForkChoiceStore;
use crate::block_processor::BlockProcessor;
use crate::bls::BlsVerifier;
use crate::chain_config::ChainConfig;
use crate::errors::{AttestationError, BeaconChainError, BlockError};
use crate::events::{EventKind, ServerSentEventHandler};
use fork_choice::ForkChoice;
use parking_lot::RwLock;
use slog::{info, Logger};
use slot_clock::SlotClock;
use std::sync::Arc;
use std::time::Duration;
use store::{ItemStore, Store};
use task_executor::TaskExecutor;
use types::{
    compute_fork_digest, Attestation, BeaconBlock, BeaconState, ChainSpec, Epoch, ForkDigest,
    Hash256, SignatureBytes, SignedBeaconBlock, Slot,
};

/// A `BeaconChain` is only ever useful shared: `start()` hands a clone of `self` to a
/// background task, so it is always constructed behind an `Arc`.
pub struct BeaconChain<S: ItemStore, C: SlotClock> {
    pub store: Arc<Store<S>>,
    pub fork_choice: Arc<RwLock<ForkChoice<BeaconForkChoiceStore<S>>>>,
    pub slot_clock: Arc<C>,
    block_processor: Arc<BlockProcessor<S, C>>,
    attestation_processor: Arc<AttestationProcessor<S, C>>,
    events: Arc<ServerSentEventHandler>,
    executor: TaskExecutor,
    spec: ChainSpec,
    genesis_validators_root: Hash256,
    current_fork_digest: RwLock<ForkDigest>,
    log: Logger,
}

impl<S: ItemStore, C: SlotClock> BeaconChain<S, C> {
    /// Bootstraps a fresh chain from `genesis_state`, or verifies it against whatever is already
    /// at slot 0 in `store` if this is a restart. `deposit_data_roots[i]` is the root of the `i`th
    /// deposit that was folded into `genesis_state`, persisted so a later eth1 deposit-index
    /// lookup can recover the incremental Merkle tree without re-scanning eth1 history.
    pub fn initialize_beacon_chain(
        store: Arc<Store<S>>,
        genesis_state: BeaconState,
        deposit_data_roots: Vec<Hash256>,
        bls_verifier: Arc<dyn BlsVerifier>,
        chain_config: ChainConfig,
        spec: ChainSpec,
        executor: TaskExecutor,
        log: Logger,
    ) -> Result<Self, BeaconChainError> {
        let mut genesis_block = BeaconBlock::empty();
        genesis_block.state_root = genesis_state.canonical_root();

        // The root a child block's `parent_root` must resolve against is the placeholder header
        // `BeaconState::new` installs (all-zero `parent_root`/`state_root`), not the genesis
        // block's own root — using the latter would make every header include the root of a
        // state that itself would need to include the header (§4.H, §9). Note this root is the
        // same constant for every genesis state regardless of its validator set or genesis time,
        // so it cannot be used to detect a mismatched genesis on restart; `genesis_validators_root`
        // is compared instead, below.
        let genesis_root = genesis_state.latest_block_header.canonical_root();

        match store.block_root_at_slot(Slot::new(0))? {
            Some(existing_root) => {
                let existing_block = store
                    .get_block(&existing_root)?
                    .ok_or(BeaconChainError::GenesisStateInvalid)?;
                let existing_state = store
                    .get_state(&existing_block.message.state_root)?
                    .ok_or(BeaconChainError::GenesisStateInvalid)?;

                if existing_state.genesis_validators_root != genesis_state.genesis_validators_root {
                    return Err(BeaconChainError::GenesisMismatch {
                        existing: existing_state.genesis_validators_root,
                        new: genesis_state.genesis_validators_root,
                    });
                }

                info!(log, "Resuming from existing genesis"; "root" => ?genesis_root);
            }
            None => {
                let signed_genesis = SignedBeaconBlock {
                    message: genesis_block.clone(),
                    signature: SignatureBytes::zero(),
                };
                store.store_chain_head(
                    genesis_root,
                    &signed_genesis,
                    genesis_block.state_root,
                    &genesis_state,
                )?;
                store.set_justified_checkpoint_roots(genesis_root, genesis_block.state_root)?;
                store.set_finalized_checkpoint_roots(genesis_root, genesis_block.state_root)?;
                for (index, root) in deposit_data_roots.iter().enumerate() {
                    store.put_deposit_data_root(index as u64, *root)?;
                }
                info!(log, "Initialized new beacon chain from genesis"; "root" => ?genesis_root);
            }
        }

        let fc_store =
            BeaconForkChoiceStore::get_forkchoice_store(store.clone(), genesis_root, &genesis_state);
        let fork_choice = Arc::new(RwLock::new(ForkChoice::from_genesis(
            fc_store,
            genesis_root,
            &genesis_block,
            &genesis_state,
        )?));

        let slot_clock = Arc::new(C::new(
            Slot::new(0),
            Duration::from_secs(genesis_state.genesis_time),
            Duration::from_secs(spec.seconds_per_slot),
        ));

        let events = Arc::new(ServerSentEventHandler::new(log.clone()));

        let attestation_processor = Arc::new(AttestationProcessor::new(
            store.clone(),
            fork_choice.clone(),
            slot_clock.clone(),
            bls_verifier,
            spec.clone(),
            log.new(slog::o!("service" => "attestation_processor")),
        ));

        let block_processor = Arc::new(BlockProcessor::new(
            store.clone(),
            fork_choice.clone(),
            slot_clock.clone(),
            attestation_processor.clone(),
            events.clone(),
            chain_config,
            spec.clone(),
            log.new(slog::o!("service" => "block_processor")),
        ));

        let genesis_validators_root = genesis_state.genesis_validators_root;
        let current_fork_digest = compute_fork_digest(
            spec.fork_version_at_epoch(Epoch::new(0)),
            genesis_validators_root,
        );

        Ok(Self {
            store,
            fork_choice,
            slot_clock,
            block_processor,
            attestation_processor,
            events,
            executor,
            spec,
            genesis_validators_root,
            current_fork_digest: RwLock::new(current_fork_digest),
            log,
        })
    }

    /// Spawns the background slot-tick task that keeps `current_fork_digest` current across fork
    /// boundaries even while no blocks are arriving. Requires `self` behind an `Arc` since the
    /// task outlives this call.
    pub fn start(self: &Arc<Self>)
    where
        S: 'static,
        C: 'static,
    {
        let chain = self.clone();
        self.executor.spawn(
            async move {
                loop {
                    let sleep_duration = chain
                        .slot_clock
                        .duration_to_next_slot()
                        .unwrap_or_else(|| Duration::from_secs(chain.spec.seconds_per_slot));
                    tokio::time::sleep(sleep_duration).await;
                    chain.on_slot_tick();
                }
            },
            "beacon_chain_slot_ticker",
        );
        info!(self.log, "Beacon chain coordinator started");
    }

    /// Logs the intent to stop. Actual task teardown happens when the shared `exit_future` signal
    /// owned by whoever built this chain's `TaskExecutor` fires; this crate does not own that
    /// signal (§4.H, §5).
    pub fn stop(&self) {
        info!(self.log, "Beacon chain coordinator stopping");
    }

    pub fn receive_block(&self, block: SignedBeaconBlock) -> Result<Hash256, BlockError> {
        let block_root = self.block_processor.receive_block(block)?;
        self.on_slot_tick();
        Ok(block_root)
    }

    pub fn receive_attestation(&self, attestation: Attestation) -> Result<(), AttestationError> {
        self.attestation_processor.receive_attestation(attestation)
    }

    pub fn current_fork_digest(&self) -> ForkDigest {
        *self.current_fork_digest.read()
    }

    /// Recomputes `current_fork_digest` against whatever epoch the slot clock reports now,
    /// emitting `ForkDigestChanged` exactly when the fork-schedule lookup disagrees with the
    /// cached value (§4.H: fork-digest recompute is explicit on head/time change, not polled by
    /// external callers).
    fn on_slot_tick(&self) {
        let epoch = self
            .slot_clock
            .now()
            .unwrap_or_else(|| Slot::new(0))
            .epoch(self.spec.slots_per_epoch);
        let version = self.spec.fork_version_at_epoch(epoch);
        let digest = compute_fork_digest(version, self.genesis_validators_root);

        let mut cached = self.current_fork_digest.write();
        if *cached != digest {
            *cached = digest;
            self.events.register(EventKind::ForkDigestChanged(digest));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::NullBlsVerifier;
    use slog::{o, Discard};
    use slot_clock::ManualSlotClock;
    use store::MemoryStore;
    use types::Eth1Data;

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn test_executor() -> (TaskExecutor, exit_future::Signal) {
        let (signal, exit) = exit_future::signal();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let executor = TaskExecutor::new(runtime.handle().clone(), exit, test_logger());
        std::mem::forget(runtime);
        (executor, signal)
    }

    fn new_chain() -> BeaconChain<MemoryStore, ManualSlotClock> {
        let spec = ChainSpec::minimal();
        let store = Arc::new(Store::new(Arc::new(MemoryStore::open(test_logger()))));
        let genesis_state = BeaconState::new(0, Eth1Data::default(), &spec);
        let (executor, signal) = test_executor();
        std::mem::forget(signal);

        BeaconChain::initialize_beacon_chain(
            store,
            genesis_state,
            vec![],
            Arc::new(NullBlsVerifier),
            ChainConfig::default(),
            spec,
            executor,
            test_logger(),
        )
        .unwrap()
    }

    #[test]
    fn initializes_from_genesis_and_exposes_head() {
        let chain = new_chain();
        assert!(chain.store.head_block_root().unwrap().is_some());
    }

    #[test]
    fn resuming_with_the_same_genesis_succeeds() {
        let spec = ChainSpec::minimal();
        let store = Arc::new(Store::new(Arc::new(MemoryStore::open(test_logger()))));
        let genesis_state = BeaconState::new(0, Eth1Data::default(), &spec);
        let (executor, signal) = test_executor();
        std::mem::forget(signal);

        BeaconChain::initialize_beacon_chain(
            store.clone(),
            genesis_state.clone(),
            vec![],
            Arc::new(NullBlsVerifier),
            ChainConfig::default(),
            spec.clone(),
            executor.clone(),
            test_logger(),
        )
        .unwrap();

        assert!(BeaconChain::initialize_beacon_chain(
            store,
            genesis_state,
            vec![],
            Arc::new(NullBlsVerifier),
            ChainConfig::default(),
            spec,
            executor,
            test_logger(),
        )
        .is_ok());
    }

    #[test]
    fn resuming_with_a_different_genesis_is_a_fatal_mismatch() {
        let spec = ChainSpec::minimal();
        let store = Arc::new(Store::new(Arc::new(MemoryStore::open(test_logger()))));
        let first_state = BeaconState::new(0, Eth1Data::default(), &spec);
        let (executor, signal) = test_executor();
        std::mem::forget(signal);

        BeaconChain::initialize_beacon_chain(
            store.clone(),
            first_state,
            vec![],
            Arc::new(NullBlsVerifier),
            ChainConfig::default(),
            spec.clone(),
            executor.clone(),
            test_logger(),
        )
        .unwrap();

        let mut second_state = BeaconState::new(0, Eth1Data::default(), &spec);
        second_state.genesis_validators_root = Hash256::repeat_byte(1);

        assert!(matches!(
            BeaconChain::initialize_beacon_chain(
                store,
                second_state,
                vec![],
                Arc::new(NullBlsVerifier),
                ChainConfig::default(),
                spec,
                executor,
                test_logger(),
            ),
            Err(BeaconChainError::GenesisMismatch { .. })
        ));
    }

    #[test]
    fn current_fork_digest_matches_genesis_fork_version() {
        let chain = new_chain();
        let expected = compute_fork_digest(
            chain.spec.fork_version_at_epoch(Epoch::new(0)),
            chain.genesis_validators_root,
        );
        assert_eq!(chain.current_fork_digest(), expected);
    }
}
