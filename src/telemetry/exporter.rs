//! Periodic export of host and aggregate metrics.
//!
//! # Responsibilities
//! - Every period: sample CPU and memory, read active users and pizza totals
//! - Push each value as its own metric
//!
//! # Design Decisions
//! - A cycle never suspends; pushes are handed to the transport and forgotten
//! - Each step's failure is captured in the [`CycleReport`] and logged; the
//!   loop keeps its schedule regardless
//! - The first cycle runs one full period after start

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::telemetry::emitter::MetricEmitter;
use crate::telemetry::host::{HostSampler, SampleError};
use crate::telemetry::registry::MetricRegistry;
use crate::telemetry::series::{self, MetricReading};

/// What one export cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Pushes handed to the transport.
    pub pushed: usize,
    /// Sampling steps that failed this cycle.
    pub sample_errors: Vec<SampleError>,
}

/// Background task pushing periodic metrics.
pub struct PeriodicExporter {
    registry: Arc<MetricRegistry>,
    emitter: MetricEmitter,
    sampler: Arc<dyn HostSampler>,
    period: Duration,
    clear_active_users: bool,
}

impl PeriodicExporter {
    pub fn new(
        registry: Arc<MetricRegistry>,
        emitter: MetricEmitter,
        sampler: Arc<dyn HostSampler>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            emitter,
            sampler,
            period,
            clear_active_users: false,
        }
    }

    /// Clear the active user set after every cycle.
    pub fn clear_active_users(mut self, enabled: bool) -> Self {
        self.clear_active_users = enabled;
        self
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(period = ?self.period, "Periodic metric exporter starting");

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle();
                    tracing::debug!(
                        pushed = report.pushed,
                        sample_errors = report.sample_errors.len(),
                        "Periodic metric export complete"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Periodic metric exporter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Sample and push one round of periodic metrics.
    pub fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        match self.sampler.sample() {
            Ok(host) => {
                self.push_sampled(&mut report, series::CPU_USAGE_PERCENTAGE, host.cpu_usage_percent());
                self.push_sampled(
                    &mut report,
                    series::MEMORY_USAGE_PERCENTAGE,
                    host.memory_usage_percent(),
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Host sampling failed, skipping CPU and memory this cycle");
                report.sample_errors.push(e);
            }
        }

        let active_users = i64::try_from(self.registry.active_users()).unwrap_or(i64::MAX);
        self.push(
            &mut report,
            MetricReading::gauge(series::ACTIVE_USERS, active_users, series::UNIT_USERS),
        );

        let pizza = self.registry.pizza();
        self.push(
            &mut report,
            MetricReading::counter(series::PIZZA_PURCHASES_TOTAL, pizza.purchase_count),
        );
        self.push(
            &mut report,
            MetricReading::counter(series::PIZZA_REVENUE_TOTAL, pizza.revenue_cents()),
        );

        if self.clear_active_users {
            self.registry.clear_users();
        }

        report
    }

    fn push_sampled(&self, report: &mut CycleReport, name: &str, value: Result<i64, SampleError>) {
        match value {
            Ok(percent) => self.push(
                report,
                MetricReading::gauge(name, percent, series::UNIT_PERCENT),
            ),
            Err(e) => {
                tracing::warn!(metric = %name, error = %e, "Skipping host metric");
                report.sample_errors.push(e);
            }
        }
    }

    fn push(&self, report: &mut CycleReport, reading: MetricReading) {
        // Outcome is logged by the transport.
        let _ = self.emitter.emit(&reading);
        report.pushed += 1;
    }
}
