use types::{Epoch, Hash256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidDeltaLen { deltas: usize, indices: usize },
    InvalidNodeIndex(usize),
    InvalidParentIndex(usize),
    InvalidNodeDelta(usize),
    InvalidParentDelta(usize),
    DeltaOverflow(usize),
    IndexOverflow(&'static str),
    JustifiedNodeUnknown(Hash256),
    FinalizedNodeUnknown(Hash256),
    InvalidJustifiedIndex(usize),
    InvalidBestDescendant(usize),
    InvalidBestNode {
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        node_justified_epoch: Epoch,
        node_finalized_epoch: Epoch,
    },
    RevertedFinalizedEpoch {
        current_finalized_epoch: Epoch,
        new_finalized_epoch: Epoch,
    },
    UnknownAttestingValidator(u64),
    InvalidAttestingIndexOverflow,
}
