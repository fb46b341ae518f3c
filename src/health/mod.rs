//! Reachability of the fast tier, the event log and the authoritative store.

use crate::broker::EventBroker;
use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::store::LikeStore;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Probes slower than this report `Degraded`
const SLOW_PROBE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub latency_ms: Option<u64>,
    pub last_check: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    fn new(status: HealthStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            latency_ms: None,
            last_check: chrono::Utc::now(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatus::Healthy, None)
    }

    pub fn unhealthy(message: String) -> Self {
        Self::new(HealthStatus::Unhealthy, Some(message))
    }

    /// Classify a probe that started at `started`
    pub fn from_probe(probe: Result<()>, started: Instant) -> Self {
        let latency = started.elapsed();
        let mut result = match probe {
            Err(e) => Self::unhealthy(e.to_string()),
            Ok(()) if latency > SLOW_PROBE => Self::new(
                HealthStatus::Degraded,
                Some(format!("slow response: {}ms", latency.as_millis())),
            ),
            Ok(()) => Self::healthy(),
        };
        result.latency_ms = Some(latency.as_millis() as u64);
        result
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    /// Worst status among the components
    pub status: HealthStatus,
    pub components: HashMap<String, HealthCheckResult>,
    pub version: String,
    pub uptime_seconds: u64,
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check_health(&self) -> HealthCheckResult;

    fn component_name(&self) -> &'static str;
}

pub struct HealthRegistry {
    components: RwLock<Vec<Box<dyn HealthCheck>>>,
    started: Instant,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(Vec::new()),
            started: Instant::now(),
        }
    }

    /// Register a check, replacing one with the same component name
    pub async fn register(&self, check: Box<dyn HealthCheck>) {
        let mut components = self.components.write().await;
        components.retain(|existing| existing.component_name() != check.component_name());
        components.push(check);
    }

    /// Probe every component concurrently
    pub async fn get_system_health(&self) -> SystemHealth {
        let components = self.components.read().await;
        let results = join_all(components.iter().map(|check| async move {
            (check.component_name().to_string(), check.check_health().await)
        }))
        .await;

        let status = results
            .iter()
            .map(|(_, result)| result.status)
            .max_by_key(|status| match status {
                HealthStatus::Healthy => 0,
                HealthStatus::Degraded => 1,
                HealthStatus::Unhealthy => 2,
            })
            .unwrap_or(HealthStatus::Healthy);

        SystemHealth {
            status,
            components: results.into_iter().collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    pub async fn get_component_health(&self, name: &str) -> Option<HealthCheckResult> {
        let components = self.components.read().await;
        let check = components.iter().find(|check| check.component_name() == name)?;
        Some(check.check_health().await)
    }
}

pub struct KvHealthCheck {
    store: Arc<dyn KeyValueStore>,
}

impl KvHealthCheck {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheck for KvHealthCheck {
    async fn check_health(&self) -> HealthCheckResult {
        let started = Instant::now();
        HealthCheckResult::from_probe(self.store.ping().await, started)
    }

    fn component_name(&self) -> &'static str {
        "kv"
    }
}

pub struct BrokerHealthCheck {
    broker: Arc<dyn EventBroker>,
}

impl BrokerHealthCheck {
    pub fn new(broker: Arc<dyn EventBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl HealthCheck for BrokerHealthCheck {
    async fn check_health(&self) -> HealthCheckResult {
        let started = Instant::now();
        HealthCheckResult::from_probe(self.broker.ping().await, started)
    }

    fn component_name(&self) -> &'static str {
        "broker"
    }
}

pub struct StoreHealthCheck {
    store: Arc<dyn LikeStore>,
}

impl StoreHealthCheck {
    pub fn new(store: Arc<dyn LikeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheck for StoreHealthCheck {
    async fn check_health(&self) -> HealthCheckResult {
        let started = Instant::now();
        let probe = if self.store.is_healthy().await {
            Ok(())
        } else {
            Err(crate::LikeBridgeError::Database(
                "authoritative store unreachable".to_string(),
            ))
        };
        HealthCheckResult::from_probe(probe, started)
    }

    fn component_name(&self) -> &'static str {
        "store"
    }
}
