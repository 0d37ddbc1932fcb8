//! Builds a genesis `BeaconState` from eth1 deposit history, per §4.D.

mod eth1_genesis_service;

pub use eth1_genesis_service::{Eth1GenesisService, GenesisError};
