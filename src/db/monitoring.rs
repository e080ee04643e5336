// src/db/monitoring.rs

use log::debug;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::future::Future;
use std::time::Instant;

/// Попадания/промахи LRU-кэша (`result` = hit | miss)
pub static CACHE_REQUEST_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "contact_cache_requests_total",
        "Total number of contact cache lookups",
        &["result"]
    )
    .expect("Failed to create CACHE_REQUEST_COUNTER")
});

pub static CACHE_EVICTION_COUNTER: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "contact_cache_evictions_total",
        "Total number of entries evicted from the contact cache"
    )
    .expect("Failed to create CACHE_EVICTION_COUNTER")
});

/// Сколько раз try_lock вернул отказ
pub static LOCK_CONTENTION_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "contact_lock_contention_total",
        "Total number of failed lock acquisitions",
        &["operation"]
    )
    .expect("Failed to create LOCK_CONTENTION_COUNTER")
});

pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "contact_service_operation_duration_seconds",
        "Duration of contact service operations in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]
    )
    .expect("Failed to create OPERATION_DURATION")
});

/// Обёртка над операцией сервиса: замеряет длительность.
pub async fn measure_operation<F, T>(operation: &str, f: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    let secs = start.elapsed().as_secs_f64();

    OPERATION_DURATION.with_label_values(&[operation]).observe(secs);

    debug!("operation {} took {:.6} seconds", operation, secs);
    result
}

/// Метрики в текстовом формате Prometheus.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        log::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
