use lazy_static::lazy_static;
use lighthouse_metrics::*;

lazy_static! {
    pub static ref BLOCK_CACHE_LEN: Result<IntGauge> =
        try_create_int_gauge("eth1_block_cache_len", "Count of eth1 blocks in cache");
    pub static ref LATEST_CACHED_BLOCK_TIMESTAMP: Result<IntGauge> = try_create_int_gauge(
        "eth1_latest_cached_block_timestamp",
        "Timestamp of latest block in eth1 cache"
    );
    pub static ref DEPOSIT_CACHE_LEN: Result<IntGauge> =
        try_create_int_gauge("eth1_deposit_cache_len", "Number of deposits in the eth1 cache");
    pub static ref SUBSCRIBER_COUNT: Result<IntGauge> =
        try_create_int_gauge("eth1_subscriber_count", "Number of active block subscriptions");
}
