use std::fmt::Debug;
use types::{BeaconBlock, BeaconState, Checkpoint, Hash256, Slot};

/// The persistence seam between the pure `ForkChoice` algorithm and a concrete backing store.
///
/// Implementors own the "spec `Store` object" bookkeeping: the current slot, the justified and
/// best-justified checkpoints, the finalized checkpoint, and the balances used to weigh votes at
/// the last justified checkpoint. `ForkChoice` never touches these directly; it only calls
/// through this trait, so a beacon-chain implementation can back it with its own database and
/// caching policy (see `beacon_chain::BeaconForkChoiceStore`).
pub trait ForkChoiceStore {
    type Error: Debug;

    fn get_current_slot(&self) -> Slot;

    fn set_current_slot(&mut self, slot: Slot);

    fn justified_checkpoint(&self) -> &Checkpoint;

    fn justified_balances(&self) -> &[u64];

    fn best_justified_checkpoint(&self) -> &Checkpoint;

    fn finalized_checkpoint(&self) -> &Checkpoint;

    fn set_justified_checkpoint(&mut self, state: &BeaconState) -> Result<(), Self::Error>;

    fn set_best_justified_checkpoint(&mut self, state: &BeaconState);

    fn set_finalized_checkpoint(&mut self, checkpoint: Checkpoint);

    fn set_justified_checkpoint_to_best_justified_checkpoint(&mut self) -> Result<(), Self::Error>;

    /// Returns the block root that is an ancestor of `block_root` at `ancestor_slot`, given that
    /// `state` is the state of the block identified by `block_root`.
    fn ancestor_at_slot(
        &self,
        state: &BeaconState,
        block_root: Hash256,
        ancestor_slot: Slot,
    ) -> Result<Hash256, Self::Error>;

    /// Called once a block has been accepted into fork choice, so the store can update whatever
    /// side caches it keeps keyed by block root (e.g. an eth1 voting cache).
    fn after_block(
        &mut self,
        block: &BeaconBlock,
        block_root: Hash256,
        state: &BeaconState,
    ) -> Result<(), Self::Error>;
}
