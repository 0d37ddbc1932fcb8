//! Core consensus data types shared across the workspace: slots/epochs, the validator registry,
//! blocks, attestations, checkpoints and the beacon state itself.
//!
//! Deliberately does not depend on `ssz_types`' compile-time-bounded lists: every variable-length
//! field here is a plain `Vec<T>` (or the hand-rolled `Bitfield`), with bounds enforced at runtime
//! by the components that populate them against a `ChainSpec`. See DESIGN.md for the rationale.

mod attestation;
mod beacon_block;
mod beacon_state;
mod bitfield;
mod chain_spec;
mod checkpoint;
mod crypto_bytes;
mod deposit;
mod eth1_data;
mod fork;
mod slot_epoch;
mod validator;

pub mod test_utils;

pub use attestation::{Attestation, AttestationData, CommitteeIndex, IndexedAttestation};
pub use beacon_block::{BeaconBlock, BeaconBlockBody, BeaconBlockHeader, SignedBeaconBlock};
pub use beacon_state::{BeaconState, BeaconStateError};
pub use bitfield::Bitfield;
pub use chain_spec::{ChainSpec, FAR_FUTURE_EPOCH};
pub use checkpoint::Checkpoint;
pub use crypto_bytes::{PublicKeyBytes, SignatureBytes};
pub use deposit::{Deposit, DepositData};
pub use eth1_data::Eth1Data;
pub use fork::{compute_fork_digest, Domain, Fork, ForkDigest, Version};
pub use slot_epoch::{Epoch, Slot};
pub use validator::Validator;

/// A 32-byte Merkle root / block root / state root. Re-exported from `ethereum-types` rather than
/// hand-rolled, matching how lighthouse's `types` crate sources `Hash256`.
pub use ethereum_types::H256 as Hash256;
