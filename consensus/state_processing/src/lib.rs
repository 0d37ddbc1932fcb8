//! Pure, synchronous state-transition logic: genesis bootstrap and per-block processing.
//!
//! Everything here is CPU-bound and side-effect free beyond its arguments; callers (the block
//! processor, the genesis service) own all I/O, signature verification, and retry policy.

mod errors;
mod genesis;
mod per_block_processing;

pub use errors::BlockProcessingError;
pub use genesis::{initialize_beacon_state_from_eth1, is_valid_genesis_state, process_activations};
pub use per_block_processing::{
    per_block_processing, process_block_header, process_deposit, process_eth1_data, stf,
};
