use lazy_static::lazy_static;
use lighthouse_metrics::*;

lazy_static! {
    pub static ref DISK_DB_READ_COUNT: Result<IntCounter> =
        try_create_int_counter("store_read_count", "Total number of key reads from the store");
    pub static ref DISK_DB_WRITE_COUNT: Result<IntCounter> = try_create_int_counter(
        "store_write_count",
        "Total number of key writes to the store"
    );
    pub static ref DISK_DB_BATCH_COUNT: Result<IntCounter> = try_create_int_counter(
        "store_batch_count",
        "Total number of atomic batches applied to the store"
    );
}
