use crate::{Bitfield, Checkpoint, Hash256, SignatureBytes, Slot};
use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

pub type CommitteeIndex = u64;

/// The data a validator signs when casting an attestation vote.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub beacon_block_root: Hash256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

/// An aggregated attestation as received from the network: one bit per committee member, one
/// BLS signature aggregating every participant's vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Attestation {
    pub aggregation_bits: Bitfield,
    pub data: AttestationData,
    pub signature: SignatureBytes,
}

/// The same vote as `Attestation`, but with the aggregation bitfield already resolved against a
/// committee into the list of voting validator indices. This is what `fork_choice::on_attestation`
/// and the LMD-GHOST backend actually consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct IndexedAttestation {
    pub attesting_indices: Vec<u64>,
    pub data: AttestationData,
    pub signature: SignatureBytes,
}

impl Attestation {
    /// Resolves `self.aggregation_bits` against `committee` (the ordered list of validator
    /// indices assigned to `self.data.{slot, index}`) into an `IndexedAttestation`.
    ///
    /// Returns `None` if the bitfield length does not match the committee length.
    pub fn into_indexed(self, committee: &[u64]) -> Option<IndexedAttestation> {
        if self.aggregation_bits.len() != committee.len() {
            return None;
        }

        let mut attesting_indices: Vec<u64> = committee
            .iter()
            .enumerate()
            .filter_map(|(i, validator_index)| {
                if self.aggregation_bits.get(i).unwrap_or(false) {
                    Some(*validator_index)
                } else {
                    None
                }
            })
            .collect();
        attesting_indices.sort_unstable();

        Some(IndexedAttestation {
            attesting_indices,
            data: self.data,
            signature: self.signature,
        })
    }
}
