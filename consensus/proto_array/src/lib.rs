//! Wraps the pure `ProtoArray` weighted-DAG in a thread-safe handle (`ProtoArrayForkChoice`) that
//! also tracks per-validator latest-votes and effective balances, turning DAG updates plus a
//! balance snapshot into the weight deltas `ProtoArray::apply_score_changes` consumes.
//!
//! This is the LMD-GHOST backend; `fork_choice::ForkChoice` is the spec-level wrapper that adds
//! justified/finalized checkpoint bookkeeping and attestation queuing on top of it.

mod error;
mod proto_array;
mod ssz_container;

pub use error::Error;
pub use proto_array::{ProtoArray, ProtoNode};

use crate::ssz_container::SszContainer;
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};
use ssz::{Decode, Encode};
use ssz_derive::{Decode as SszDecode, Encode as SszEncode};
use std::collections::HashMap;
use types::{Epoch, Hash256, Slot};

/// A block as known to fork choice: everything `ProtoArray` needs plus enough context
/// (`target_root`, `state_root`) for callers to resolve attestations against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub slot: Slot,
    pub root: Hash256,
    pub parent_root: Option<Hash256>,
    pub target_root: Hash256,
    pub state_root: Hash256,
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
}

/// The latest vote observed for some validator, plus the vote about to replace it once the
/// validator's new attestation is processed by `apply_score_changes`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, SszEncode, SszDecode)]
pub struct VoteTracker {
    current_root: Hash256,
    next_root: Hash256,
    next_epoch: Epoch,
}

/// A `Vec`-backed map keyed by small sequential indices (here, validator index) that grows to fit
/// any index written to it, returning `T::default()` for indices never written.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ElasticList<T>(pub Vec<T>);

impl<T> ElasticList<T>
where
    T: Default + Clone,
{
    fn ensure(&mut self, i: usize) {
        if self.0.len() <= i {
            self.0.resize(i + 1, T::default());
        }
    }

    pub fn get_mut(&mut self, i: usize) -> &mut T {
        self.ensure(i);
        &mut self.0[i]
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.0.get(i)
    }
}

/// The LMD-GHOST fork-choice backend: a `ProtoArray` DAG plus the per-validator vote and balance
/// state needed to translate new attestations into weight deltas.
///
/// Each field is independently `RwLock`-guarded (rather than the whole struct behind one lock) so
/// that `process_attestation` — which only touches `votes` — never blocks a concurrent
/// `find_head` that only reads `proto_array` and `balances`.
pub struct ProtoArrayForkChoice {
    proto_array: RwLock<ProtoArray>,
    votes: RwLock<ElasticList<VoteTracker>>,
    balances: RwLock<Vec<u64>>,
}

impl PartialEq for ProtoArrayForkChoice {
    fn eq(&self, other: &Self) -> bool {
        *self.proto_array.read() == *other.proto_array.read()
            && *self.votes.read() == *other.votes.read()
            && *self.balances.read() == *other.balances.read()
    }
}

impl ProtoArrayForkChoice {
    pub fn new(
        finalized_block_slot: Slot,
        finalized_block_state_root: Hash256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        finalized_root: Hash256,
    ) -> Result<Self, String> {
        let mut proto_array = ProtoArray {
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
            justified_epoch,
            finalized_epoch,
            nodes: vec![],
            indices: HashMap::new(),
        };

        proto_array
            .on_new_block(
                finalized_block_slot,
                finalized_root,
                None,
                justified_epoch,
                finalized_epoch,
            )
            .map_err(|e| format!("failed to add finalized block to proto_array: {:?}", e))?;

        // `finalized_block_state_root` is stored on the node via `find_head`'s target/state
        // lookups (see `Block`); `ProtoNode` itself does not need it, it only exists so the
        // constructor's signature mirrors `on_block`'s.
        let _ = finalized_block_state_root;

        Ok(Self {
            proto_array: RwLock::new(proto_array),
            votes: RwLock::new(ElasticList(vec![])),
            balances: RwLock::new(vec![]),
        })
    }

    pub fn process_block(&self, block: Block) -> Result<(), String> {
        if block.parent_root.is_none() {
            return Err("block must have a parent root, use ProtoArrayForkChoice::new for genesis".to_string());
        }

        self.proto_array
            .write()
            .on_new_block(
                block.slot,
                block.root,
                block.parent_root,
                block.justified_epoch,
                block.finalized_epoch,
            )
            .map_err(|e| format!("process_block_error: {:?}", e))
    }

    /// Registers `validator_index`'s vote for `block_root` as the voter's newest (`next_root`).
    /// The vote only moves weight once `find_head` is next called, since that's when
    /// `next_root`/`current_root` are diffed into deltas.
    pub fn process_attestation(
        &self,
        validator_index: usize,
        block_root: Hash256,
        target_epoch: Epoch,
    ) -> Result<(), String> {
        let mut votes = self.votes.write();
        let vote = votes.get_mut(validator_index);

        if target_epoch > vote.next_epoch || *vote == VoteTracker::default() {
            vote.next_root = block_root;
            vote.next_epoch = target_epoch;
        }

        Ok(())
    }

    /// Computes the weight delta implied by every validator's vote changing from `current_root`
    /// to `next_root` (scaled by the validator's balance in `justified_state_balances`), applies
    /// it to the DAG, then returns the new head.
    pub fn find_head(
        &self,
        justified_epoch: Epoch,
        justified_root: Hash256,
        finalized_epoch: Epoch,
        justified_state_balances: &[u64],
    ) -> Result<Hash256, String> {
        let mut proto_array = self.proto_array.write();
        let mut votes = self.votes.write();
        let mut old_balances = self.balances.write();

        let new_balances = justified_state_balances;
        let deltas = compute_deltas(&proto_array.indices, &mut votes, &old_balances, new_balances)
            .map_err(|e| format!("find_head compute_deltas failed: {:?}", e))?;

        proto_array
            .apply_score_changes(deltas, justified_epoch, finalized_epoch)
            .map_err(|e| format!("find_head apply_score_changes failed: {:?}", e))?;

        *old_balances = new_balances.to_vec();

        proto_array
            .find_head(&justified_root)
            .map_err(|e| format!("find_head failed: {:?}", e))
    }

    pub fn maybe_prune(&self, finalized_epoch: Epoch, finalized_root: Hash256) -> Result<(), String> {
        self.proto_array
            .write()
            .maybe_prune(finalized_epoch, finalized_root)
            .map_err(|e| format!("maybe_prune failed: {:?}", e))
    }

    pub fn set_prune_threshold(&self, prune_threshold: usize) {
        self.proto_array.write().prune_threshold = prune_threshold;
    }

    pub fn len(&self) -> usize {
        self.proto_array.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_block(&self, block_root: &Hash256) -> bool {
        self.proto_array.read().indices.contains_key(block_root)
    }

    pub fn get_block(&self, block_root: &Hash256) -> Option<Block> {
        let proto_array = self.proto_array.read();
        let i = *proto_array.indices.get(block_root)?;
        let node = proto_array.nodes.get(i)?;

        Some(Block {
            slot: node.slot,
            root: node.root,
            parent_root: node
                .parent
                .and_then(|parent_index| proto_array.nodes.get(parent_index))
                .map(|parent| parent.root),
            // `target_root`/`state_root` are not tracked by `ProtoNode` itself (see DESIGN.md);
            // callers that need them should keep their own `Hash256 -> Block` cache, as
            // `beacon_chain::beacon_fork_choice_store` does.
            target_root: Hash256::zero(),
            state_root: Hash256::zero(),
            justified_epoch: node.justified_epoch,
            finalized_epoch: node.finalized_epoch,
        })
    }

    pub fn latest_message(&self, validator_index: usize) -> Option<(Hash256, Epoch)> {
        let votes = self.votes.read();
        votes
            .get(validator_index)
            .filter(|vote| **vote != VoteTracker::default())
            .map(|vote| (vote.next_root, vote.next_epoch))
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        SszContainer::from(self).as_ssz_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        SszContainer::from_ssz_bytes(bytes)
            .map(Self::from)
            .map_err(|e| format!("failed to decode SszContainer: {:?}", e))
    }
}

/// Default `ProtoArray::prune_threshold`: pruning fewer than this many nodes costs more in
/// `HashMap` churn than it saves in memory.
const DEFAULT_PRUNE_THRESHOLD: usize = 256;

/// Diffs every validator's `(current_root, next_root)` vote pair into a `+balance`/`-balance`
/// weight delta on the nodes they moved away from/towards, then rolls `current_root` forward to
/// `next_root`. Newly-observed validators (an index beyond `old_balances`'s length) only
/// contribute their `+balance` delta, since they have no prior vote to retract.
fn compute_deltas(
    indices: &HashMap<Hash256, usize>,
    votes: &mut ElasticList<VoteTracker>,
    old_balances: &[u64],
    new_balances: &[u64],
) -> Result<Vec<i64>, String> {
    let mut deltas = vec![0_i64; indices.len()];

    for val_index in 0..votes.0.len() {
        let vote = &mut votes.0[val_index];

        if vote.current_root == vote.next_root && old_balances.get(val_index) == new_balances.get(val_index)
        {
            continue;
        }

        let old_balance = old_balances.get(val_index).copied().unwrap_or(0);
        let new_balance = new_balances.get(val_index).copied().unwrap_or(0);

        if vote.current_root != Hash256::zero() {
            if let Some(current_delta_index) = indices.get(&vote.current_root) {
                let delta = deltas
                    .get_mut(*current_delta_index)
                    .ok_or_else(|| format!("delta index out of bounds: {}", current_delta_index))?;
                *delta -= old_balance as i64;
            }
        }

        if vote.next_root != Hash256::zero() {
            if let Some(next_delta_index) = indices.get(&vote.next_root) {
                let delta = deltas
                    .get_mut(*next_delta_index)
                    .ok_or_else(|| format!("delta index out of bounds: {}", next_delta_index))?;
                *delta += new_balance as i64;
            }
        }

        vote.current_root = vote.next_root;
    }

    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u64) -> Hash256 {
        Hash256::from_low_u64_be(n)
    }

    #[test]
    fn single_voter_moves_head_to_its_vote() {
        let fc = ProtoArrayForkChoice::new(
            Slot::new(0),
            Hash256::zero(),
            Epoch::new(0),
            Epoch::new(0),
            Hash256::zero(),
        )
        .unwrap();

        fc.process_block(Block {
            slot: Slot::new(1),
            root: hash(1),
            parent_root: Some(Hash256::zero()),
            target_root: hash(1),
            state_root: Hash256::zero(),
            justified_epoch: Epoch::new(0),
            finalized_epoch: Epoch::new(0),
        })
        .unwrap();
        fc.process_block(Block {
            slot: Slot::new(1),
            root: hash(2),
            parent_root: Some(Hash256::zero()),
            target_root: hash(2),
            state_root: Hash256::zero(),
            justified_epoch: Epoch::new(0),
            finalized_epoch: Epoch::new(0),
        })
        .unwrap();

        fc.process_attestation(0, hash(2), Epoch::new(0)).unwrap();

        let head = fc
            .find_head(Epoch::new(0), Hash256::zero(), Epoch::new(0), &[32])
            .unwrap();
        assert_eq!(head, hash(2));
    }

    #[test]
    fn unvoted_for_block_loses_to_voted_for_block() {
        let fc = ProtoArrayForkChoice::new(
            Slot::new(0),
            Hash256::zero(),
            Epoch::new(0),
            Epoch::new(0),
            Hash256::zero(),
        )
        .unwrap();

        fc.process_block(Block {
            slot: Slot::new(1),
            root: hash(1),
            parent_root: Some(Hash256::zero()),
            target_root: hash(1),
            state_root: Hash256::zero(),
            justified_epoch: Epoch::new(0),
            finalized_epoch: Epoch::new(0),
        })
        .unwrap();
        fc.process_block(Block {
            slot: Slot::new(1),
            root: hash(2),
            parent_root: Some(Hash256::zero()),
            target_root: hash(2),
            state_root: Hash256::zero(),
            justified_epoch: Epoch::new(0),
            finalized_epoch: Epoch::new(0),
        })
        .unwrap();

        fc.process_attestation(0, hash(1), Epoch::new(0)).unwrap();
        fc.process_attestation(1, hash(1), Epoch::new(0)).unwrap();
        fc.process_attestation(2, hash(2), Epoch::new(0)).unwrap();

        let head = fc
            .find_head(Epoch::new(0), Hash256::zero(), Epoch::new(0), &[32, 32, 32])
            .unwrap();
        assert_eq!(head, hash(1));
    }
}
