use std::{future::Future, sync::Arc, time::Instant as StdInstant};

use chrono::{DateTime, Utc};
use log::*;
use tokio::time::{timeout_at, Instant};

use crate::{
    clock::{Clock, SystemClock},
    config::EngineConfig,
    engine_api::{caller::Caller, errors::EngineError},
    events::EventProducers,
    helpers::OrderNumberGenerator,
    metrics::EngineMetrics,
};

/// Everything an engine API needs besides its database backend.
///
/// The context is cheap to clone. Clones share the metrics registry, the clock and the order number sequence.
#[derive(Clone)]
pub struct EngineContext {
    clock: Arc<dyn Clock>,
    metrics: EngineMetrics,
    config: Arc<EngineConfig>,
    producers: EventProducers,
    numbers: OrderNumberGenerator,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Result<Self, prometheus::Error> {
        Ok(Self {
            clock: Arc::new(SystemClock),
            metrics: EngineMetrics::new()?,
            config: Arc::new(config),
            producers: EventProducers::default(),
            numbers: OrderNumberGenerator::new(),
        })
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_producers(mut self, producers: EventProducers) -> Self {
        self.producers = producers;
        self
    }

    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn producers(&self) -> &EventProducers {
        &self.producers
    }

    pub fn numbers(&self) -> &OrderNumberGenerator {
        &self.numbers
    }

    /// The caller's deadline, or the configured default counted from now.
    pub fn deadline_for(&self, caller: Option<&Caller>) -> Option<Instant> {
        caller
            .and_then(|c| c.deadline)
            .or_else(|| self.config.request_timeout.map(|timeout| Instant::now() + timeout))
    }

    /// Runs `operation` to completion, or until the deadline passes. An expired operation is dropped, which rolls back
    /// any database transaction it holds open.
    pub async fn within_deadline<T, E, F>(&self, deadline: Option<Instant>, operation: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<EngineError>,
    {
        match deadline {
            Some(at) => match timeout_at(at, operation).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => {
                    warn!("📦️ An operation did not complete before its deadline and was abandoned");
                    Err(EngineError::Timeout)
                },
            },
            None => operation.await.map_err(Into::into),
        }
    }

    /// Runs an order operation under its deadline and records its outcome and duration.
    pub async fn run_order_operation<T, E, F>(
        &self,
        operation: &str,
        deadline: Option<Instant>,
        future: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<EngineError>,
    {
        let started = StdInstant::now();
        let result = self.within_deadline(deadline, future).await;
        self.metrics.record_order_operation(operation, result.is_ok(), started);
        result
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EngineContext({:?})", self.config)
    }
}
