use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    /// Like/unlike requests handled by the like service
    pub static ref LIKE_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "likebridge_like_requests_total",
        "Total number of like/unlike requests",
        &["strategy", "action", "outcome"]
    ).unwrap();

    /// Like/unlike request latency
    pub static ref LIKE_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "likebridge_like_request_duration_seconds",
        "Time taken to handle a like/unlike request",
        &["strategy", "action"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Messages published to the broker
    pub static ref EVENTS_PUBLISHED_TOTAL: CounterVec = register_counter_vec!(
        "likebridge_events_published_total",
        "Total number of messages published to the broker",
        &["topic", "status"]
    ).unwrap();

    /// Consumer batch size histogram
    pub static ref CONSUMER_BATCH_SIZE: HistogramVec = register_histogram_vec!(
        "likebridge_consumer_batch_size",
        "Number of messages in each received batch",
        &["topic"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    /// Consumed like events by outcome
    pub static ref EVENTS_PROCESSED_TOTAL: CounterVec = register_counter_vec!(
        "likebridge_events_processed_total",
        "Total number of consumed like events by outcome",
        &["outcome"]
    ).unwrap();

    /// Batch apply latency
    pub static ref BATCH_APPLY_DURATION: HistogramVec = register_histogram_vec!(
        "likebridge_batch_apply_duration_seconds",
        "Time taken to apply a batch to the authoritative store",
        &["source"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    /// Dead letter queue events
    pub static ref DEAD_LETTER_EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "likebridge_dead_letter_events_total",
        "Total number of messages sent to the dead letter queue",
        &["topic"]
    ).unwrap();

    /// Dead letter queue size
    pub static ref DEAD_LETTER_QUEUE_SIZE: GaugeVec = register_gauge_vec!(
        "likebridge_dead_letter_queue_size",
        "Current number of messages in the dead letter queue",
        &["topic"]
    ).unwrap();

    /// Counter cache flushes
    pub static ref COUNTER_FLUSHES_TOTAL: CounterVec = register_counter_vec!(
        "likebridge_counter_flushes_total",
        "Total number of counter cache flushes",
        &["sink", "status"]
    ).unwrap();

    /// Counter records written by flushes
    pub static ref COUNTER_RECORDS_FLUSHED: CounterVec = register_counter_vec!(
        "likebridge_counter_records_flushed_total",
        "Total number of counter records emitted by flushes",
        &["sink"]
    ).unwrap();

    /// Tracked counter windows
    pub static ref COUNTER_CACHE_ENTRIES: GaugeVec = register_gauge_vec!(
        "likebridge_counter_cache_entries",
        "Number of counter windows held in the local cache",
        &["state"]
    ).unwrap();

    /// Access guard decisions
    pub static ref ACCESS_GUARD_DECISIONS: CounterVec = register_counter_vec!(
        "likebridge_access_guard_decisions_total",
        "Total number of access guard decisions",
        &["decision"]
    ).unwrap();

    /// Relation cache lookups
    pub static ref RELATION_CACHE_LOOKUPS: CounterVec = register_counter_vec!(
        "likebridge_relation_cache_lookups_total",
        "Total number of relation cache lookups",
        &["result"]
    ).unwrap();

    /// Reconciliation corrections
    pub static ref RECONCILIATION_CORRECTIONS_TOTAL: CounterVec = register_counter_vec!(
        "likebridge_reconciliation_corrections_total",
        "Total number of compensating events emitted by reconciliation",
        &["status"]
    ).unwrap();

    /// Ledger sync records
    pub static ref LEDGER_SYNC_RECORDS_TOTAL: CounterVec = register_counter_vec!(
        "likebridge_ledger_sync_records_total",
        "Total number of temp ledger fields processed",
        &["outcome"]
    ).unwrap();

    /// Background job duration
    pub static ref JOB_DURATION: HistogramVec = register_histogram_vec!(
        "likebridge_job_duration_seconds",
        "Time taken by a background job run",
        &["job"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 60.0, 300.0, 1800.0]
    ).unwrap();
}

/// Record a handled like/unlike request
pub fn record_like_request(strategy: &str, action: &str, outcome: &str, duration: Duration) {
    LIKE_REQUESTS_TOTAL
        .with_label_values(&[strategy, action, outcome])
        .inc();
    LIKE_REQUEST_DURATION
        .with_label_values(&[strategy, action])
        .observe(duration.as_secs_f64());
}

/// Record a publish attempt
pub fn record_publish(topic: &str, status: &str) {
    EVENTS_PUBLISHED_TOTAL.with_label_values(&[topic, status]).inc();
}

/// Record batch size
pub fn record_batch_size(topic: &str, size: usize) {
    CONSUMER_BATCH_SIZE.with_label_values(&[topic]).observe(size as f64);
}

/// Record consumed events by outcome
pub fn record_events_processed(outcome: &str, count: usize) {
    if count > 0 {
        EVENTS_PROCESSED_TOTAL
            .with_label_values(&[outcome])
            .inc_by(count as f64);
    }
}

pub fn record_batch_apply(source: &str, duration: Duration) {
    BATCH_APPLY_DURATION
        .with_label_values(&[source])
        .observe(duration.as_secs_f64());
}

/// Record a counter flush
pub fn record_counter_flush(sink: &str, status: &str, records: usize) {
    COUNTER_FLUSHES_TOTAL.with_label_values(&[sink, status]).inc();
    if status == "success" {
        COUNTER_RECORDS_FLUSHED
            .with_label_values(&[sink])
            .inc_by(records as f64);
    }
}

pub fn update_counter_cache_entries(total: usize, dirty: usize) {
    COUNTER_CACHE_ENTRIES
        .with_label_values(&["total"])
        .set(total as f64);
    COUNTER_CACHE_ENTRIES
        .with_label_values(&["dirty"])
        .set(dirty as f64);
}

pub fn record_access_decision(decision: &str) {
    ACCESS_GUARD_DECISIONS.with_label_values(&[decision]).inc();
}

pub fn record_relation_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    RELATION_CACHE_LOOKUPS.with_label_values(&[result]).inc();
}

pub fn record_reconciliation_corrections(status: &str, count: usize) {
    if count > 0 {
        RECONCILIATION_CORRECTIONS_TOTAL
            .with_label_values(&[status])
            .inc_by(count as f64);
    }
}

pub fn record_ledger_sync_records(outcome: &str, count: usize) {
    if count > 0 {
        LEDGER_SYNC_RECORDS_TOTAL
            .with_label_values(&[outcome])
            .inc_by(count as f64);
    }
}

/// Record a background job run
pub fn record_job_duration(job: &str, duration: Duration) {
    JOB_DURATION
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

/// Export metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
