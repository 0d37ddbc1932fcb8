use crate::Epoch;
use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

/// Specifies the cryptographic domain separation used for signing a block, attestation, deposit
/// or other signed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    BeaconProposer,
    BeaconAttester,
    Randao,
    Deposit,
    VoluntaryExit,
}

pub type Version = [u8; 4];
pub type ForkDigest = [u8; 4];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Encode,
    Decode,
    TreeHash,
)]
pub struct Fork {
    pub previous_version: Version,
    pub current_version: Version,
    pub epoch: Epoch,
}

/// Combines `fork_version` and `genesis_validators_root` into the 4-byte tag that identifies the
/// active protocol variant on the wire.
///
/// Equivalent to `compute_fork_digest` in the consensus spec: the first four bytes of
/// `hash_tree_root(ForkData { current_version, genesis_validators_root })`... (approximated here
/// as the first four bytes of `hash(current_version || genesis_validators_root)`, since this
/// crate does not implement the full `ForkData` SSZ container).
pub fn compute_fork_digest(current_version: Version, genesis_validators_root: crate::Hash256) -> ForkDigest {
    let mut preimage = Vec::with_capacity(4 + 32);
    preimage.extend_from_slice(&current_version);
    preimage.extend_from_slice(genesis_validators_root.as_bytes());
    let digest = eth2_hashing::hash(&preimage);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[0..4]);
    out
}
