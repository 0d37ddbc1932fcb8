use lazy_static::lazy_static;
use lighthouse_metrics::*;

lazy_static! {
    pub static ref BLOCK_PROCESSING_REQUESTS: Result<IntCounter> = try_create_int_counter(
        "beacon_block_processing_requests_total",
        "Count of blocks submitted to the Block Processor"
    );
    pub static ref BLOCK_PROCESSING_SUCCESSES: Result<IntCounter> = try_create_int_counter(
        "beacon_block_processing_successes_total",
        "Count of blocks that reached the Stored state"
    );
    pub static ref BLOCK_PROCESSING_ORPHANED: Result<IntGauge> = try_create_int_gauge(
        "beacon_block_processing_orphans",
        "Current number of blocks parked in the orphan pool"
    );
    pub static ref ATTESTATION_PROCESSING_REQUESTS: Result<IntCounter> = try_create_int_counter(
        "beacon_attestation_processing_requests_total",
        "Count of attestations submitted to the Attestation Processor"
    );
    pub static ref ATTESTATION_PROCESSING_SUCCESSES: Result<IntCounter> = try_create_int_counter(
        "beacon_attestation_processing_successes_total",
        "Count of attestations forwarded to fork choice"
    );
    pub static ref HEAD_SLOT: Result<IntGauge> =
        try_create_int_gauge("beacon_head_slot", "Slot of the current chain head");
    pub static ref FINALIZED_EPOCH: Result<IntGauge> =
        try_create_int_gauge("beacon_finalized_epoch", "Current finalized epoch");
}
