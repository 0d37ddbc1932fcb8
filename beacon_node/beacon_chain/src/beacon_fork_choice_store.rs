//! Backs `fork_choice::ForkChoice` with this crate's `store::Store` and a small in-memory cache
//! mapping block root to the state root committed alongside it, since `proto_array::Block` does
//! not itself retain that association (see `proto_array::ProtoArrayForkChoice::get_block`'s doc
//! comment).

use fork_choice::ForkChoiceStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use store::{Error as StoreError, ItemStore, Store};
use types::{BeaconBlock, BeaconState, BeaconStateError, Checkpoint, Hash256, Slot};

#[derive(Debug)]
pub enum Error {
    BeaconStateError(BeaconStateError),
    StoreError(StoreError),
    MissingState(Hash256),
    AncestorSlotAfterBlockSlot { ancestor_slot: Slot, block_slot: Slot },
}

impl From<BeaconStateError> for Error {
    fn from(e: BeaconStateError) -> Self {
        Error::BeaconStateError(e)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::StoreError(e)
    }
}

/// The effective balance of every validator in `state`, zeroed for anyone not active in the
/// state's current epoch. This is the balance vector `ForkChoice::get_head` weighs votes by.
pub fn get_effective_balances(state: &BeaconState) -> Vec<u64> {
    state
        .validators
        .iter()
        .map(|validator| {
            if validator.is_active_at(state.current_epoch()) {
                validator.effective_balance
            } else {
                0
            }
        })
        .collect()
}

pub struct BeaconForkChoiceStore<S: ItemStore> {
    store: Arc<Store<S>>,
    current_slot: Slot,
    justified_checkpoint: Checkpoint,
    justified_balances: Vec<u64>,
    best_justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    /// `block_root -> state_root`, populated by `after_block`. Only ever grows; pruning this
    /// alongside finalization is left to a future `prune()` pass (see DESIGN.md).
    state_roots: RwLock<HashMap<Hash256, Hash256>>,
}

impl<S: ItemStore> BeaconForkChoiceStore<S> {
    /// Builds the store's view directly from the genesis (or weak-subjectivity anchor) state,
    /// mirroring the consensus spec's `get_forkchoice_store`.
    pub fn get_forkchoice_store(
        store: Arc<Store<S>>,
        anchor_block_root: Hash256,
        anchor_state: &BeaconState,
    ) -> Self {
        let justified_checkpoint = Checkpoint::new(anchor_state.current_epoch(), anchor_block_root);
        let finalized_checkpoint = justified_checkpoint;
        let justified_balances = get_effective_balances(anchor_state);

        let mut state_roots = HashMap::new();
        state_roots.insert(anchor_block_root, anchor_state.canonical_root());

        Self {
            store,
            current_slot: anchor_state.slot,
            justified_checkpoint,
            justified_balances,
            best_justified_checkpoint: justified_checkpoint,
            finalized_checkpoint,
            state_roots: RwLock::new(state_roots),
        }
    }

    fn state_for_checkpoint(&self, checkpoint: Checkpoint) -> Result<BeaconState, Error> {
        let state_root = *self
            .state_roots
            .read()
            .get(&checkpoint.root)
            .ok_or(Error::MissingState(checkpoint.root))?;

        self.store
            .get_state(&state_root)?
            .ok_or(Error::MissingState(state_root))
    }
}

impl<S: ItemStore> ForkChoiceStore for BeaconForkChoiceStore<S> {
    type Error = Error;

    fn get_current_slot(&self) -> Slot {
        self.current_slot
    }

    fn set_current_slot(&mut self, slot: Slot) {
        self.current_slot = slot;
    }

    fn justified_checkpoint(&self) -> &Checkpoint {
        &self.justified_checkpoint
    }

    fn justified_balances(&self) -> &[u64] {
        &self.justified_balances
    }

    fn best_justified_checkpoint(&self) -> &Checkpoint {
        &self.best_justified_checkpoint
    }

    fn finalized_checkpoint(&self) -> &Checkpoint {
        &self.finalized_checkpoint
    }

    fn set_justified_checkpoint(&mut self, state: &BeaconState) -> Result<(), Self::Error> {
        self.justified_checkpoint = state.current_justified_checkpoint;
        self.justified_balances = get_effective_balances(state);
        Ok(())
    }

    fn set_best_justified_checkpoint(&mut self, state: &BeaconState) {
        self.best_justified_checkpoint = state.current_justified_checkpoint;
    }

    fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.finalized_checkpoint = checkpoint;
    }

    fn set_justified_checkpoint_to_best_justified_checkpoint(&mut self) -> Result<(), Self::Error> {
        let state = self.state_for_checkpoint(self.best_justified_checkpoint)?;
        self.justified_checkpoint = self.best_justified_checkpoint;
        self.justified_balances = get_effective_balances(&state);
        Ok(())
    }

    fn ancestor_at_slot(
        &self,
        state: &BeaconState,
        block_root: Hash256,
        ancestor_slot: Slot,
    ) -> Result<Hash256, Self::Error> {
        let _ = block_root;
        if ancestor_slot > state.slot {
            return Err(Error::AncestorSlotAfterBlockSlot {
                ancestor_slot,
                block_slot: state.slot,
            });
        }
        Ok(state.get_block_root(ancestor_slot)?)
    }

    fn after_block(
        &mut self,
        _block: &BeaconBlock,
        block_root: Hash256,
        state: &BeaconState,
    ) -> Result<(), Self::Error> {
        self.state_roots
            .write()
            .insert(block_root, state.canonical_root());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard, Logger};
    use store::MemoryStore;
    use types::{ChainSpec, Eth1Data};

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn genesis_store_and_state() -> (Arc<Store<MemoryStore>>, BeaconState, Hash256) {
        let spec = ChainSpec::minimal();
        let state = BeaconState::new(0, Eth1Data::default(), &spec);
        let store = Arc::new(Store::new(Arc::new(MemoryStore::open(test_logger()))));
        let state_root = state.canonical_root();
        store.put_state(&state_root, &state).unwrap();
        let genesis_root = Hash256::repeat_byte(7);
        (store, state, genesis_root)
    }

    #[test]
    fn initialises_justified_and_finalized_at_genesis() {
        let (store, state, genesis_root) = genesis_store_and_state();
        let fc_store = BeaconForkChoiceStore::get_forkchoice_store(store, genesis_root, &state);

        assert_eq!(fc_store.justified_checkpoint().root, genesis_root);
        assert_eq!(fc_store.finalized_checkpoint().root, genesis_root);
        assert_eq!(fc_store.justified_balances().len(), state.validators.len());
    }

    #[test]
    fn promoting_best_justified_pulls_balances_from_its_state() {
        let (store, mut state, genesis_root) = genesis_store_and_state();
        state.current_justified_checkpoint = Checkpoint::new(state.current_epoch(), genesis_root);
        let mut fc_store = BeaconForkChoiceStore::get_forkchoice_store(store, genesis_root, &state);

        fc_store.set_best_justified_checkpoint(&state);
        fc_store
            .set_justified_checkpoint_to_best_justified_checkpoint()
            .unwrap();

        assert_eq!(fc_store.justified_checkpoint(), &fc_store.best_justified_checkpoint);
    }
}
