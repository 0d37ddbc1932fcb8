//! Generalized-index Merkle proof verification, plus an incremental Merkle tree for append-only
//! leaf sets (used by the genesis bootstrapper to track the eth1 deposit contract's root).

use eth2_hashing::hash;
use ethereum_types::H256;
use lazy_static::lazy_static;

#[derive(Debug, PartialEq, Eq)]
pub enum MerkleTreeError {
    /// Supplied proof does not have the depth implied by `index`.
    InvalidProofLength { given: usize, expected: usize },
    /// Attempted to push a leaf into a tree that has reached its depth-bound capacity.
    MerkleTreeFull,
    /// `generate_proof` was called with a leaf index the tree has not yet observed.
    InvalidLeafIndex,
}

fn hash_and_concat(h1: H256, h2: H256) -> H256 {
    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(h1.as_bytes());
    preimage.extend_from_slice(h2.as_bytes());
    H256::from_slice(&hash(&preimage))
}

fn generalized_index_length(index: usize) -> usize {
    (usize::BITS - index.leading_zeros() - 1) as usize
}

fn generalized_index_bit(index: usize, position: usize) -> bool {
    (index & (1 << position)) > 0
}

/// Verifies that `leaf` is present at generalized index `index` under `root`, given the sibling
/// hashes in `proof` ordered from the leaf's depth up to the root.
pub fn verify_merkle_proof(
    leaf: H256,
    proof: &[H256],
    index: usize,
    root: H256,
) -> Result<bool, MerkleTreeError> {
    let expected_len = generalized_index_length(index);
    if proof.len() != expected_len {
        return Err(MerkleTreeError::InvalidProofLength {
            given: proof.len(),
            expected: expected_len,
        });
    }

    let mut computed = leaf;
    for (i, sibling) in proof.iter().enumerate() {
        computed = if generalized_index_bit(index, i) {
            hash_and_concat(*sibling, computed)
        } else {
            hash_and_concat(computed, *sibling)
        };
    }
    Ok(computed == root)
}

lazy_static! {
    /// `ZERO_HASHES[i]` is the root of a fully-zeroed subtree of depth `i`, used to pad an
    /// incremental tree's unfilled right-hand branches.
    static ref ZERO_HASHES: Vec<H256> = {
        let mut hashes = vec![H256::zero(); 33];
        for depth in 1..hashes.len() {
            hashes[depth] = hash_and_concat(hashes[depth - 1], hashes[depth - 1]);
        }
        hashes
    };
}

/// An incremental, depth-bounded Merkle tree over an append-only leaf list, as used for the eth1
/// deposit contract's deposit-data-root accumulator. Tracks only the "filled" nodes along the
/// rightmost edge, so `push_leaf` and `root` are both `O(depth)`.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    depth: usize,
    leaves: Vec<H256>,
}

impl MerkleTree {
    pub fn create(depth: usize) -> Self {
        Self {
            depth,
            leaves: vec![],
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    pub fn push_leaf(&mut self, leaf: H256) -> Result<(), MerkleTreeError> {
        if self.leaves.len() >= (1usize << self.depth) {
            return Err(MerkleTreeError::MerkleTreeFull);
        }
        self.leaves.push(leaf);
        Ok(())
    }

    /// The root of the full `2^depth`-leaf tree, with unfilled leaves treated as zero.
    pub fn root(&self) -> H256 {
        let mut level = self.leaves.clone();
        for depth in 0..self.depth {
            if level.len() % 2 == 1 {
                level.push(ZERO_HASHES[depth]);
            }
            level = level
                .chunks(2)
                .map(|pair| hash_and_concat(pair[0], pair[1]))
                .collect();
        }
        level.first().copied().unwrap_or_else(H256::zero)
    }

    /// The Merkle proof for the leaf at `index`, sibling hashes ordered bottom-up, suitable for
    /// `verify_merkle_proof` against `self.root()` at generalized index `(1 << depth) + index`.
    pub fn generate_proof(&self, index: usize) -> Result<Vec<H256>, MerkleTreeError> {
        if index >= self.leaves.len() {
            return Err(MerkleTreeError::InvalidLeafIndex);
        }

        let mut proof = Vec::with_capacity(self.depth);
        let mut level = self.leaves.clone();
        let mut pos = index;

        for depth in 0..self.depth {
            if level.len() % 2 == 1 {
                level.push(ZERO_HASHES[depth]);
            }
            let sibling = if pos % 2 == 0 { pos + 1 } else { pos - 1 };
            proof.push(level[sibling]);
            level = level
                .chunks(2)
                .map(|pair| hash_and_concat(pair[0], pair[1]))
                .collect();
            pos /= 2;
        }

        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_tree_round_trips() {
        let mut tree = MerkleTree::create(4);
        let leaves: Vec<H256> = (0..5u8).map(|i| H256::from_low_u64_be(i as u64)).collect();
        for leaf in &leaves {
            tree.push_leaf(*leaf).unwrap();
        }

        let root = tree.root();
        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.generate_proof(i).unwrap();
            let generalized_index = (1usize << 4) + i;
            assert!(verify_merkle_proof(*leaf, &proof, generalized_index, root).unwrap());
        }
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let mut tree = MerkleTree::create(3);
        for i in 0..4u8 {
            tree.push_leaf(H256::from_low_u64_be(i as u64)).unwrap();
        }
        let root = tree.root();
        let proof = tree.generate_proof(2).unwrap();
        let generalized_index = (1usize << 3) + 2;
        let wrong_leaf = H256::from_low_u64_be(99);
        assert!(!verify_merkle_proof(wrong_leaf, &proof, generalized_index, root).unwrap());
    }

    #[test]
    fn full_tree_rejects_extra_push() {
        let mut tree = MerkleTree::create(1);
        tree.push_leaf(H256::zero()).unwrap();
        tree.push_leaf(H256::zero()).unwrap();
        assert_eq!(
            tree.push_leaf(H256::zero()),
            Err(MerkleTreeError::MerkleTreeFull)
        );
    }
}
