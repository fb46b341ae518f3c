use crate::config::{CounterSinkKind, LikeStrategy};
use crate::config::Config;
use crate::error::Result;
use tracing::{info, warn};

/// Validates the configuration and provides warnings/suggestions
pub struct ConfigValidator {
    config: Config,
}

impl ConfigValidator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();

        self.validate_strategy(&mut report);
        self.validate_broker(&mut report);
        self.validate_counter_cache(&mut report);
        self.validate_relation_cache(&mut report);

        Ok(report)
    }

    fn validate_strategy(&self, report: &mut ValidationReport) {
        let service = &self.config.like_service;
        report.add_info(format!("Like strategy: {}", service.strategy.as_str()));

        if service.lock.wait_ms >= service.lock.lease_ms {
            report.add_warning(format!(
                "Lock wait ({}ms) is not shorter than the lease ({}ms). \
                A waiter may acquire a lock that expired under a slow holder.",
                service.lock.wait_ms, service.lock.lease_ms
            ));
        }

        match service.strategy {
            LikeStrategy::AtomicScript => {
                if self.config.ledger_sync.interval_ms / 1000 > service.ledger_slice_secs {
                    report.add_warning(format!(
                        "Ledger sync interval ({}ms) is longer than a slice ({}s). \
                        Slices will accumulate before being drained.",
                        self.config.ledger_sync.interval_ms, service.ledger_slice_secs
                    ));
                }
            }
            LikeStrategy::LockedTransaction | LikeStrategy::EventSourced => {
                if self.config.ledger_sync.always_enabled {
                    report.add_info(
                        "Ledger sync runs although the atomic-script strategy is not active"
                            .to_string(),
                    );
                }
            }
        }

        if !self.config.reconciliation.enabled {
            report.add_warning(
                "Reconciliation is disabled. Lost events will not be compensated.".to_string(),
            );
        }
    }

    fn validate_broker(&self, report: &mut ValidationReport) {
        let broker = &self.config.broker;

        if broker.like_topic == broker.counter_topic {
            report.add_error(format!(
                "Like events and counter records share the topic '{}'",
                broker.like_topic
            ));
        }
        if broker.dead_letter.topic == broker.like_topic {
            report.add_error("Dead letter topic must differ from the like topic".to_string());
        }
        if broker.dead_letter.max_redeliver_count == 0 {
            report.add_warning(
                "max_redeliver_count is 0. A single failure dead-letters a message.".to_string(),
            );
        }
        if broker.dead_letter.storage == "memory" {
            report.add_warning(
                "Dead letters are kept in memory and are lost on restart".to_string(),
            );
        }
        if broker.batch.max_messages > 10_000 {
            report.add_warning(format!(
                "Batch size {} is large. One slow transaction delays the whole batch.",
                broker.batch.max_messages
            ));
        }
    }

    fn validate_counter_cache(&self, report: &mut ValidationReport) {
        let counter = &self.config.counter_cache;

        if counter.ttl_secs * 1000 < counter.flush_interval_ms {
            report.add_warning(format!(
                "Counter ttl ({}s) is shorter than the flush interval ({}ms). \
                Idle windows stay in memory until the next flush.",
                counter.ttl_secs, counter.flush_interval_ms
            ));
        }
        if counter.sink == CounterSinkKind::Kv {
            report.add_info("Counter values are written directly to Redis".to_string());
        }
    }

    fn validate_relation_cache(&self, report: &mut ValidationReport) {
        let cache = &self.config.relation_cache;
        if cache.enabled && cache.max_entries == 0 {
            report.add_error("Relation cache is enabled with max_entries 0".to_string());
        }
        if cache.enabled && cache.hot_threshold == 0 {
            report.add_warning("hot_threshold 0 caches every subject".to_string());
        }
    }
}

/// Report of validation results
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

impl ValidationReport {
    fn new() -> Self {
        Self::default()
    }

    fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    fn add_info(&mut self, info: String) {
        self.info.push(info);
    }

    /// Check if configuration is valid (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Print the validation report
    pub fn print(&self) {
        if !self.errors.is_empty() {
            warn!("Configuration validation errors:");
            for error in &self.errors {
                warn!("  ❌ {}", error);
            }
        }

        if !self.warnings.is_empty() {
            warn!("Configuration warnings:");
            for warning in &self.warnings {
                warn!("  ⚠️  {}", warning);
            }
        }

        if !self.info.is_empty() {
            info!("Configuration info:");
            for info in &self.info {
                info!("  ℹ️  {}", info);
            }
        }

        if self.is_valid() {
            info!("✅ Configuration validation passed");
        }
    }
}
