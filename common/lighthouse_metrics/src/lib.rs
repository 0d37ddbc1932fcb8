//! Thin wrapper over `prometheus` so that every subsystem's `metrics.rs` declares its gauges and
//! counters the same way: `lazy_static! { pub static ref X: Result<IntGauge> =
//! try_create_int_gauge(...); }`, then reads them with the helpers below. A metric failing to
//! register (e.g. a duplicate name) is never fatal — callers hold `Result<T>` and the `set_*`/
//! `inc_*` helpers silently no-op on `Err`, since an exporter is out of scope for this core (see
//! §1) and a missing gauge must never fail a consensus-critical code path.

pub use prometheus::{
    Histogram, HistogramTimer, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Result,
};

use prometheus::{HistogramOpts, Opts};

pub fn try_create_int_gauge(name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    prometheus::register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

pub fn try_create_int_gauge_vec(name: &str, help: &str, labels: &[&str]) -> Result<IntGaugeVec> {
    let opts = Opts::new(name, help);
    let gauge_vec = IntGaugeVec::new(opts, labels)?;
    prometheus::register(Box::new(gauge_vec.clone()))?;
    Ok(gauge_vec)
}

pub fn try_create_int_counter(name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    prometheus::register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub fn try_create_int_counter_vec(
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let opts = Opts::new(name, help);
    let counter_vec = IntCounterVec::new(opts, labels)?;
    prometheus::register(Box::new(counter_vec.clone()))?;
    Ok(counter_vec)
}

pub fn try_create_histogram(name: &str, help: &str) -> Result<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help))?;
    prometheus::register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

pub fn try_create_histogram_vec(
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<HistogramVec> {
    let opts = HistogramOpts::new(name, help);
    let histogram_vec = HistogramVec::new(opts, labels)?;
    prometheus::register(Box::new(histogram_vec.clone()))?;
    Ok(histogram_vec)
}

/// Sets a gauge if it registered successfully; a registration failure is a metrics-subsystem
/// problem, never a reason to fail the caller.
pub fn set_gauge(gauge: &Result<IntGauge>, value: i64) {
    if let Ok(gauge) = gauge {
        gauge.set(value);
    }
}

pub fn set_gauge_vec(gauge_vec: &Result<IntGaugeVec>, labels: &[&str], value: i64) {
    if let Ok(gauge_vec) = gauge_vec {
        gauge_vec.with_label_values(labels).set(value);
    }
}

pub fn inc_gauge_vec(gauge_vec: &Result<IntGaugeVec>, labels: &[&str]) {
    if let Ok(gauge_vec) = gauge_vec {
        gauge_vec.with_label_values(labels).inc();
    }
}

pub fn dec_gauge_vec(gauge_vec: &Result<IntGaugeVec>, labels: &[&str]) {
    if let Ok(gauge_vec) = gauge_vec {
        gauge_vec.with_label_values(labels).dec();
    }
}

pub fn inc_counter(counter: &Result<IntCounter>) {
    if let Ok(counter) = counter {
        counter.inc();
    }
}

pub fn inc_counter_vec(counter_vec: &Result<IntCounterVec>, labels: &[&str]) {
    if let Ok(counter_vec) = counter_vec {
        counter_vec.with_label_values(labels).inc();
    }
}

pub fn observe(histogram: &Result<Histogram>, value: f64) {
    if let Ok(histogram) = histogram {
        histogram.observe(value);
    }
}

pub fn observe_vec(histogram_vec: &Result<HistogramVec>, labels: &[&str], value: f64) {
    if let Ok(histogram_vec) = histogram_vec {
        histogram_vec.with_label_values(labels).observe(value);
    }
}

/// Starts a wall-clock timer that records its elapsed duration into `histogram` on drop, or a
/// no-op timer if `histogram` failed to register.
pub fn start_timer(histogram: &Result<Histogram>) -> Option<HistogramTimer> {
    histogram.as_ref().ok().map(|histogram| histogram.start_timer())
}

pub fn stop_timer(timer: Option<HistogramTimer>) {
    if let Some(timer) = timer {
        timer.observe_duration();
    }
}
