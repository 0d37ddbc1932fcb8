//! The consensus core of the beacon node: validates and applies blocks and attestations, runs
//! LMD-GHOST fork choice, and persists the result, behind the `BeaconChain` coordinator.

mod attestation_processor;
mod beacon_chain;
mod beacon_fork_choice_store;
mod block_processor;
mod bls;
mod chain_config;
mod errors;
mod events;
mod metrics;

pub use beacon_chain::BeaconChain;
pub use beacon_fork_choice_store::{get_effective_balances, BeaconForkChoiceStore};
pub use bls::{BlsVerifier, NullBlsVerifier};
pub use chain_config::{ChainConfig, DEFAULT_IMPORT_MAX_SKIP_SLOTS};
pub use errors::{AttestationError, BeaconChainError, BlockError, ForkChoiceError};
pub use events::{BlockEventData, EventKind, HeadEventData, ServerSentEventHandler};
