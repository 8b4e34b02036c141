//! Periodic metrics task

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use flume::{Sender, TrySendError};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::stats::counters::ThroughputCounters;
use crate::utils;

/// One published sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricsReport {
    pub capture_rate_hz: f64,
    pub process_rate_hz: f64,
    pub total_frames_captured: u64,
    pub total_frames_processed: u64,
    pub encode_failures: u64,
    pub frames_dropped: u64,
    pub memory_usage_mb: Option<f64>,
}

/// Samples [`ThroughputCounters`] and process memory once per period.
///
/// Must be spawned from inside a Tokio runtime. The task observes the
/// pipeline only through the counters and never blocks it.
pub struct MetricsSampler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
    latest: Arc<ArcSwap<MetricsReport>>,
}

impl MetricsSampler {
    pub fn spawn(
        counters: Arc<ThroughputCounters>,
        period: Duration,
        subscriber: Option<Sender<MetricsReport>>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let latest = Arc::new(ArcSwap::from_pointee(MetricsReport::default()));

        info!("Starting metrics sampler every {:?}", period);
        let handle = tokio::spawn(run(
            counters,
            period,
            latest.clone(),
            subscriber,
            shutdown_rx,
        ));

        Self {
            shutdown,
            handle,
            latest,
        }
    }

    /// Most recent report, or all zeroes before the first period elapses
    pub fn latest(&self) -> Arc<MetricsReport> {
        self.latest.load_full()
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("Metrics sampler ended abnormally: {}", e);
        }
        debug!("Metrics sampler stopped");
    }
}

async fn run(
    counters: Arc<ThroughputCounters>,
    period: Duration,
    latest: Arc<ArcSwap<MetricsReport>>,
    mut subscriber: Option<Sender<MetricsReport>>,
    mut shutdown: watch::Receiver<bool>,
) {
    // interval() panics on a zero period
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First tick completes immediately
    ticker.tick().await;
    let mut last = Instant::now();

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                // A dropped sender also ends the task
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let now = Instant::now();
                let report = sample(&counters, now.duration_since(last));
                last = now;

                publish(&report);
                latest.store(Arc::new(report));

                if let Some(tx) = &subscriber {
                    match tx.try_send(report) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            debug!("Metrics subscriber lagging, sample skipped")
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            debug!("Metrics subscriber went away");
                            subscriber = None;
                        }
                    }
                }
            }
        }
    }
}

fn sample(counters: &ThroughputCounters, elapsed: Duration) -> MetricsReport {
    let rates = counters.sample_and_reset(elapsed.as_secs_f64());
    let totals = counters.totals();

    MetricsReport {
        capture_rate_hz: rates.capture_hz,
        process_rate_hz: rates.process_hz,
        total_frames_captured: totals.captured,
        total_frames_processed: totals.processed,
        encode_failures: totals.encode_failures,
        frames_dropped: totals.frames_dropped,
        memory_usage_mb: utils::resident_memory_mb(),
    }
}

fn publish(report: &MetricsReport) {
    metrics::gauge!("framering_capture_rate_hz").set(report.capture_rate_hz);
    metrics::gauge!("framering_process_rate_hz").set(report.process_rate_hz);
    metrics::counter!("framering_frames_captured_total").absolute(report.total_frames_captured);
    metrics::counter!("framering_encode_failures_total").absolute(report.encode_failures);
    metrics::counter!("framering_frames_dropped_total").absolute(report.frames_dropped);
    if let Some(mb) = report.memory_usage_mb {
        metrics::gauge!("framering_memory_usage_mb").set(mb);
    }

    info!(
        "FPS = {:.1}, PPS = {:.1}, captured = {}, memory = {}",
        report.capture_rate_hz,
        report.process_rate_hz,
        report.total_frames_captured,
        report
            .memory_usage_mb
            .map_or_else(|| "n/a".to_string(), |mb| format!("{mb:.1} MB")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reports_rates_once_per_period() {
        let counters = Arc::new(ThroughputCounters::new());
        let (tx, rx) = flume::bounded(4);
        let sampler = MetricsSampler::spawn(counters.clone(), Duration::from_secs(1), Some(tx));

        for _ in 0..30 {
            counters.increment_captured();
        }
        for _ in 0..12 {
            counters.increment_processed();
        }

        let first = rx.recv_async().await.unwrap();
        assert!((first.capture_rate_hz - 30.0).abs() < 1e-9);
        assert!((first.process_rate_hz - 12.0).abs() < 1e-9);
        assert_eq!(first.total_frames_captured, 30);
        assert_eq!(sampler.latest().total_frames_processed, 12);

        let second = rx.recv_async().await.unwrap();
        assert_eq!(second.capture_rate_hz, 0.0);
        assert_eq!(second.total_frames_captured, 30);

        sampler.stop().await;
        while rx.try_recv().is_ok() {}
        assert!(rx.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_period_publishes_nothing() {
        let counters = Arc::new(ThroughputCounters::new());
        let (tx, rx) = flume::bounded(1);
        let sampler = MetricsSampler::spawn(counters, Duration::from_secs(1), Some(tx));

        assert_eq!(*sampler.latest(), MetricsReport::default());
        sampler.stop().await;
        assert!(rx.try_recv().is_err());
        assert!(rx.is_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn gone_subscriber_does_not_stop_sampling() {
        let counters = Arc::new(ThroughputCounters::new());
        let (tx, rx) = flume::bounded(1);
        drop(rx);
        let sampler = MetricsSampler::spawn(counters.clone(), Duration::from_secs(1), Some(tx));

        counters.increment_captured();
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert_eq!(sampler.latest().total_frames_captured, 1);
        sampler.stop().await;
    }
}
