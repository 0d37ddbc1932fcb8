//! Spec-level LMD-GHOST fork choice: wraps the `proto_array` weighted DAG with justified/
//! best-justified/finalized checkpoint bookkeeping and current-slot attestation queuing.

mod fork_choice;
mod fork_choice_store;

pub use fork_choice::{
    Error, ForkChoice, InvalidAttestation, InvalidBlock, PersistedForkChoice, QueuedAttestation,
    SAFE_SLOTS_TO_UPDATE_JUSTIFIED,
};
pub use fork_choice_store::ForkChoiceStore;
