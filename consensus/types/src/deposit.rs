use crate::{Hash256, PublicKeyBytes, SignatureBytes};
use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

/// The data submitted to the eth1 deposit contract by a prospective validator.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash,
)]
pub struct DepositData {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    pub amount: u64,
    pub signature: SignatureBytes,
}

impl DepositData {
    /// The message that `signature` signs: `self` with `signature` zeroed out.
    ///
    /// Mirrors `DepositMessage` in the consensus spec.
    pub fn signed_root(&self) -> Hash256 {
        let message = DepositMessage {
            pubkey: self.pubkey,
            withdrawal_credentials: self.withdrawal_credentials,
            amount: self.amount,
        };
        Hash256::from_slice(&message.tree_hash_root())
    }
}

#[derive(Debug, Clone, TreeHash)]
struct DepositMessage {
    pubkey: PublicKeyBytes,
    withdrawal_credentials: Hash256,
    amount: u64,
}

/// A deposit to be processed by the beacon chain, together with its Merkle inclusion proof
/// against the eth1 deposit contract's root at the time of inclusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Deposit {
    pub proof: Vec<Hash256>,
    pub data: DepositData,
}
