use eth1::{Eth1Block, Eth1DataProvider};
use merkle_proof::MerkleTree;
use slog::{info, Logger};
use state_processing::{initialize_beacon_state_from_eth1, is_valid_genesis_state};
use std::sync::Arc;
use tree_hash::TreeHash;
use types::{BeaconState, ChainSpec, Deposit, DepositData, Hash256};

#[derive(Debug)]
pub enum GenesisError {
    /// `initialize_beacon_state_from_eth1` rejected the deposit set (a bad Merkle proof, which
    /// would indicate a bug in how this service built it, not an input the network controls).
    StateInitFailed(state_processing::BlockProcessingError),
}

impl From<state_processing::BlockProcessingError> for GenesisError {
    fn from(e: state_processing::BlockProcessingError) -> Self {
        GenesisError::StateInitFailed(e)
    }
}

/// Replays `deposit_datas` through a fresh incremental Merkle tree, attaching to each deposit the
/// proof that validates against the tree's root *as of that deposit's inclusion* — the same
/// sequence `initialize_beacon_state_from_eth1` replays internally, so the two must stay in lock
/// step.
fn build_deposits_with_proofs(
    deposit_datas: Vec<DepositData>,
    spec: &ChainSpec,
) -> Vec<Deposit> {
    let mut tree = MerkleTree::create(spec.deposit_contract_tree_depth as usize);
    let mut deposits = Vec::with_capacity(deposit_datas.len());

    for data in deposit_datas {
        let leaf = Hash256::from_slice(&data.tree_hash_root());
        tree.push_leaf(leaf).expect("deposit count bounded by deposit_contract_tree_depth");
        let proof = tree
            .generate_proof(tree.num_leaves() - 1)
            .expect("just-pushed leaf index is always valid");
        deposits.push(Deposit { proof, data });
    }

    deposits
}

/// Drives the genesis search described in §4.D: for each observed eth1 block, replay every
/// deposit up to that block through `initialize_beacon_state_from_eth1` and check
/// `is_valid_genesis_state`. The first block that produces a valid state wins; ties among
/// multiple eligible blocks are broken by processing order, since blocks are only ever offered to
/// `try_genesis` in the order the eth1 follower observed them.
pub struct Eth1GenesisService {
    provider: Arc<dyn Eth1DataProvider>,
    spec: ChainSpec,
    log: Logger,
}

impl Eth1GenesisService {
    pub fn new(provider: Arc<dyn Eth1DataProvider>, spec: ChainSpec, log: Logger) -> Self {
        Self {
            provider,
            spec,
            log,
        }
    }

    /// Attempts to build a genesis state from every deposit observed up to and including `block`.
    /// Returns `Ok(None)` (not an error) if the resulting state does not yet meet
    /// `is_valid_genesis_state` — the caller should keep waiting for later blocks.
    pub fn try_genesis(&self, block: Eth1Block) -> Result<Option<BeaconState>, GenesisError> {
        let deposit_datas = self.provider.process_past_deposits(None, block.number);
        let deposits = build_deposits_with_proofs(deposit_datas, &self.spec);

        let state =
            initialize_beacon_state_from_eth1(block.hash, block.timestamp, deposits, &self.spec)?;

        if is_valid_genesis_state(&state, &self.spec) {
            info!(
                self.log,
                "Eth1 block produced a valid genesis state";
                "block_number" => block.number,
                "validator_count" => state.validators.len(),
            );
            Ok(Some(state))
        } else {
            Ok(None)
        }
    }

    /// Tries every block the provider has already cached, in order, returning the first that
    /// produces a valid genesis state.
    pub fn scan_cached_blocks(&self, blocks: &[Eth1Block]) -> Result<Option<BeaconState>, GenesisError> {
        for block in blocks {
            if let Some(state) = self.try_genesis(*block)? {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eth1::InteropEth1Chain;
    use slog::{o, Discard};
    use types::{PublicKeyBytes, SignatureBytes};

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    fn deposit(i: u8, amount: u64) -> DepositData {
        DepositData {
            pubkey: PublicKeyBytes([i; 48]),
            withdrawal_credentials: Hash256::zero(),
            amount,
            signature: SignatureBytes::zero(),
        }
    }

    #[test]
    fn waits_until_enough_validators_are_deposited() {
        let spec = ChainSpec::minimal();
        let deposits = (0..spec.min_genesis_active_validator_count as u8)
            .map(|i| (1u64, deposit(i, spec.max_effective_balance)))
            .collect();
        let chain = InteropEth1Chain::new(vec![], deposits, test_logger());
        let service = Eth1GenesisService::new(chain.clone(), spec.clone(), test_logger());

        let too_early = Eth1Block {
            hash: Hash256::repeat_byte(1),
            number: 0,
            timestamp: spec.min_genesis_time,
        };
        assert!(service.try_genesis(too_early).unwrap().is_none());

        let enough_deposits = Eth1Block {
            hash: Hash256::repeat_byte(2),
            number: 1,
            timestamp: spec.min_genesis_time,
        };
        let state = service.try_genesis(enough_deposits).unwrap();
        assert!(state.is_some());
        assert_eq!(
            state.unwrap().validators.len(),
            spec.min_genesis_active_validator_count as usize
        );
    }

    #[test]
    fn rejects_genesis_before_min_genesis_time() {
        let mut spec = ChainSpec::minimal();
        spec.min_genesis_time = 1_000_000;
        let deposits = (0..spec.min_genesis_active_validator_count as u8)
            .map(|i| (1u64, deposit(i, spec.max_effective_balance)))
            .collect();
        let chain = InteropEth1Chain::new(vec![], deposits, test_logger());
        let service = Eth1GenesisService::new(chain.clone(), spec.clone(), test_logger());

        let block = Eth1Block {
            hash: Hash256::repeat_byte(3),
            number: 1,
            timestamp: 0,
        };
        assert!(service.try_genesis(block).unwrap().is_none());
    }
}
