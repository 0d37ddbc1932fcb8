use crate::beacon_fork_choice_store::Error as ForkChoiceStoreError;
use fork_choice::Error as InnerForkChoiceError;
use state_processing::BlockProcessingError;
use store::Error as StoreError;
use types::Hash256;

pub type ForkChoiceError = InnerForkChoiceError<ForkChoiceStoreError>;

/// Errors a block can fail with at any stage of the `Received → Validated → Applied → Stored →
/// Notified` pipeline. Transient kinds are retried by the triggering external event; permanent
/// kinds are logged once and the block bytes are never retried (§7).
#[derive(Debug)]
pub enum BlockError {
    /// Transient: the parent block has not been applied yet. The block is parked in the orphan
    /// pool and redriven once the parent reaches Stored.
    UnknownParent(Hash256),
    /// Permanent: `slot` is not strictly after the parent's slot.
    NotLaterThanParent { block_slot: u64, parent_slot: u64 },
    /// Transient: `slot` is more than `ChainConfig`/`ChainSpec::maximum_future_slots` ahead of the
    /// current slot.
    FutureSlot { block_slot: u64, current_slot: u64 },
    /// Permanent: the state-transition function rejected the block.
    StateTransitionFailed(BlockProcessingError),
    /// Permanent: `block.state_root` does not match `hash_tree_root` of the state `stf` actually
    /// produced.
    StateRootMismatch { claimed: Hash256, computed: Hash256 },
    /// Permanent: fork choice rejected the block after a successful state transition.
    ForkChoiceFailed(ForkChoiceError),
    /// Fatal: the store rejected a write that should never fail for a `MemoryStore`.
    StoreError(StoreError),
}

impl From<StoreError> for BlockError {
    fn from(e: StoreError) -> Self {
        BlockError::StoreError(e)
    }
}

impl From<BlockProcessingError> for BlockError {
    fn from(e: BlockProcessingError) -> Self {
        BlockError::StateTransitionFailed(e)
    }
}

impl From<ForkChoiceError> for BlockError {
    fn from(e: ForkChoiceError) -> Self {
        BlockError::ForkChoiceFailed(e)
    }
}

/// Permanent rejection reasons for `receive_attestation` (§4.F).
#[derive(Debug)]
pub enum AttestationError {
    UnknownHeadBlock(Hash256),
    FutureTargetEpoch,
    EmptyCommittee,
    /// BLS verification rejected the attestation's signature (§4.F.5).
    InvalidSignature,
    ForkChoiceFailed(ForkChoiceError),
}

impl From<ForkChoiceError> for AttestationError {
    fn from(e: ForkChoiceError) -> Self {
        AttestationError::ForkChoiceFailed(e)
    }
}

/// Fatal coordinator-level errors: anything here means `BeaconChain::stop` should run (§7).
#[derive(Debug)]
pub enum BeaconChainError {
    StoreError(StoreError),
    ForkChoiceError(ForkChoiceError),
    /// A genesis state already exists in the store with a different `genesis_validators_root`
    /// than the genesis state being initialised with — the operator must wipe storage (§4.H).
    /// The block-root anchor itself is not a useful discriminant here: it is derived from the
    /// all-zero placeholder header every genesis state carries, so it is identical regardless of
    /// the validator set or genesis time the state was built from.
    GenesisMismatch { existing: Hash256, new: Hash256 },
    GenesisStateInvalid,
}

impl From<StoreError> for BeaconChainError {
    fn from(e: StoreError) -> Self {
        BeaconChainError::StoreError(e)
    }
}

impl From<ForkChoiceError> for BeaconChainError {
    fn from(e: ForkChoiceError) -> Self {
        BeaconChainError::ForkChoiceError(e)
    }
}
