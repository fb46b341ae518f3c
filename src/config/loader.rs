use super::{Config, DatabaseConnection};
use crate::error::{LikeBridgeError, Result};
use config::{Config as ConfigBuilder, Environment, File};
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        Self::load_with(env::var("CONFIG_PATH").ok().as_deref())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> Result<Config> {
        Self::load_with(Some(path))
    }

    fn load_with(config_path: Option<&str>) -> Result<Config> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        } else {
            let config_files = [
                "config.yaml",
                "config.yml",
                "likebridge.yaml",
                "likebridge.yml",
            ];
            for file in &config_files {
                if Path::new(file).exists() {
                    builder = builder.add_source(File::with_name(file));
                    break;
                }
            }
        }

        if let Ok(env_name) = env::var("APP_ENV") {
            let env_configs = [
                format!("config.{}.yaml", env_name),
                format!("config.{}.yml", env_name),
            ];
            for file in &env_configs {
                if Path::new(file).exists() {
                    builder = builder.add_source(File::with_name(file));
                    break;
                }
            }
        }

        // LIKEBRIDGE__REDIS__URL=redis://... becomes redis.url
        builder = builder.add_source(
            Environment::with_prefix("LIKEBRIDGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| LikeBridgeError::Config(format!("Failed to build config: {}", e)))?;

        let config: Config = config.try_deserialize().map_err(|e| {
            LikeBridgeError::Config(format!("Failed to deserialize config: {}", e))
        })?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Hard checks. Anything failing here prevents startup.
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        if config.redis.url.is_empty() {
            errors.push("Redis URL cannot be empty".to_string());
        }

        match &config.database.connection {
            DatabaseConnection::ConnectionString { url } if url.is_empty() => {
                errors.push("Database URL cannot be empty".to_string());
            }
            DatabaseConnection::Parameters { host, database, .. }
                if host.is_empty() || database.is_empty() =>
            {
                errors.push("Database host and database name are required".to_string());
            }
            _ => {}
        }
        if config.database.pool.max_size == 0 {
            errors.push("Database pool max_size must be > 0".to_string());
        }

        let broker = &config.broker;
        if broker.like_topic.is_empty() || broker.like_subscription.is_empty() {
            errors.push("Broker like topic and subscription cannot be empty".to_string());
        }
        if broker.counter_topic.is_empty() || broker.counter_subscription.is_empty() {
            errors.push("Broker counter topic and subscription cannot be empty".to_string());
        }
        if broker.batch.max_messages == 0 || broker.counter_batch.max_messages == 0 {
            errors.push("Broker batch max_messages must be > 0".to_string());
        }
        for (name, backoff) in [
            ("nack_redelivery", &broker.nack_redelivery),
            ("ack_timeout_redelivery", &broker.ack_timeout_redelivery),
        ] {
            if backoff.min_delay_ms > backoff.max_delay_ms {
                errors.push(format!("Broker {} min_delay_ms must be <= max_delay_ms", name));
            }
            if backoff.multiplier < 1.0 {
                errors.push(format!("Broker {} multiplier must be >= 1.0", name));
            }
        }
        if !matches!(broker.backend.as_str(), "memory" | "redis") {
            errors.push(format!(
                "Unknown broker backend '{}' (expected memory or redis)",
                broker.backend
            ));
        }
        if !matches!(broker.dead_letter.storage.as_str(), "memory" | "redis") {
            errors.push(format!(
                "Unknown dead letter storage '{}' (expected memory or redis)",
                broker.dead_letter.storage
            ));
        }

        let lock = &config.like_service.lock;
        if lock.lease_ms == 0 {
            errors.push("Lock lease_ms must be > 0".to_string());
        }
        if config.like_service.ledger_slice_secs == 0 {
            errors.push("Ledger slice width must be > 0".to_string());
        }

        let counter = &config.counter_cache;
        if counter.interval_secs == 0 {
            errors.push("Counter cache interval_secs must be > 0".to_string());
        }
        if counter.flush_interval_ms == 0 {
            errors.push("Counter cache flush_interval_ms must be > 0".to_string());
        }

        let guard = &config.access_guard;
        if guard.enabled && guard.warn_count > guard.ban_count {
            errors.push("Access guard warn_count must be <= ban_count".to_string());
        }

        let reconcile = &config.reconciliation;
        if reconcile.hour > 23 || reconcile.minute > 59 {
            errors.push("Reconciliation schedule must be a valid hour:minute".to_string());
        }

        if config.ledger_sync.interval_ms == 0 {
            errors.push("Ledger sync interval_ms must be > 0".to_string());
        }

        if !errors.is_empty() {
            return Err(LikeBridgeError::Validation(errors.join(", ")));
        }

        Ok(())
    }

    /// Create a sample configuration file
    pub fn generate_sample() -> &'static str {
        r#"# LikeBridge Configuration Example
# Copy this file to config.yaml and adjust for your environment

app:
  name: likebridge-dev
  # instance_id: auto  # Automatically generated if not specified
  tags:
    environment: development

# Fast tier: relation mirror, counters, locks, temp ledgers, streams
redis:
  url: redis://localhost:6379
  # password: ${REDIS_PASSWORD}
  database: 0
  scan_count: 1000

# Authoritative relational store
database:
  host: localhost
  port: 5432
  database: likes
  username: postgres
  password: postgres  # or LIKEBRIDGE__DATABASE__PASSWORD
  pool:
    max_size: 10
  ensure_schema: true

# Event broker
broker:
  backend: redis  # redis (streams) or memory (single process)
  like_topic: thumb-topic
  like_subscription: thumb-subscription
  counter_topic: counter-sync-topic
  counter_subscription: counter-sync-subscription
  batch:
    max_messages: 1000
    timeout_ms: 10000
  counter_batch:
    max_messages: 500
    timeout_ms: 5000
  nack_redelivery:
    min_delay_ms: 1000
    max_delay_ms: 60000
    multiplier: 2.0
  ack_timeout_redelivery:
    min_delay_ms: 5000
    max_delay_ms: 300000
    multiplier: 3.0
  dead_letter:
    max_redeliver_count: 3
    topic: thumb-dlq-topic
    storage: redis

# Like service strategy: locked_transaction, atomic_script or event_sourced
like_service:
  strategy: event_sourced
  relation_key_prefix: thumb
  ledger_slice_secs: 10
  lock:
    wait_ms: 3000
    lease_ms: 10000

counter_cache:
  interval_secs: 60
  ttl_secs: 60
  flush_interval_ms: 5000
  sink: broker  # kv or broker

access_guard:
  enabled: true
  warn_count: 10
  ban_count: 20

relation_cache:
  enabled: true
  max_entries: 1000
  ttl_secs: 300
  hot_threshold: 100

# Daily sweep comparing the fast-tier mirror with the database
reconciliation:
  enabled: true
  hour: 2
  minute: 0

ledger_sync:
  interval_ms: 10000

logging:
  level: info
  format: text  # text or json

error_handling:
  retry:
    max_attempts: 3
    initial_backoff_ms: 100
    max_backoff_ms: 30000
    backoff_multiplier: 2.0
    jitter: true
"#
    }
}
