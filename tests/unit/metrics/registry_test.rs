// Prometheus registry tests

use likebridge::metrics;
use std::time::Duration;

#[cfg(test)]
mod metrics_registry_tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_exported() {
        metrics::record_like_request("locked", "like", "success", Duration::from_millis(3));
        metrics::record_counter_flush("broker", "success", 2);

        let text = metrics::gather_metrics().unwrap();
        assert!(text.contains("likebridge_like_requests_total"));
        assert!(text.contains("likebridge_like_request_duration_seconds"));
        assert!(text.contains("strategy=\"locked\""));
    }

    #[test]
    fn test_reconciliation_corrections_labelled_by_status() {
        metrics::record_reconciliation_corrections("emitted", 1);

        let text = metrics::gather_metrics().unwrap();
        assert!(text.contains("status=\"emitted\""));
    }
}
