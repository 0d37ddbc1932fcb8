use lazy_static::lazy_static;
use lighthouse_metrics::*;

lazy_static! {
    pub static ref ASYNC_TASKS_COUNT: Result<IntGaugeVec> = try_create_int_gauge_vec(
        "async_tasks_count",
        "Count of active tasks spawned by the task executor, by task name",
        &["name"]
    );
}
