use merkle_proof::MerkleTreeError;
use types::{BeaconStateError, Hash256};

#[derive(Debug, PartialEq, Eq)]
pub enum BlockProcessingError {
    /// `deposit.proof` does not verify against `state.eth1_data.deposit_root`.
    DepositMerkleInvalid { deposit_index: u64 },
    MerkleTreeError(MerkleTreeError),
    BeaconStateError(BeaconStateError),
    /// `block.parent_root` does not match `state.latest_block_header`'s root.
    ParentRootMismatch { expected: Hash256, found: Hash256 },
    /// `block.slot` is not greater than `state.slot`.
    BlockSlotNotLaterThanStateSlot { block_slot: u64, state_slot: u64 },
    BalancesOutOfBounds(usize),
    ArithError,
}

impl From<MerkleTreeError> for BlockProcessingError {
    fn from(e: MerkleTreeError) -> Self {
        BlockProcessingError::MerkleTreeError(e)
    }
}

impl From<BeaconStateError> for BlockProcessingError {
    fn from(e: BeaconStateError) -> Self {
        BlockProcessingError::BeaconStateError(e)
    }
}
