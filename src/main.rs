//! framering demo: synthetic 4K capture -> encoder -> frame ring, with 1 Hz metrics
//!
//! Usage: framering [config.toml] [run-seconds]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use framering::capture::SyntheticCapture;
use framering::encoder::SyntheticEncoder;
use framering::pipeline::{EncodePipeline, FrameRing};
use framering::stats::{MetricsReport, MetricsSampler};
use framering::Config;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_RUN_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("framering launching...");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let run_for = match args.next() {
        Some(secs) => {
            let secs = secs
                .parse::<u64>()
                .map_err(|e| eyre!("bad run-seconds {secs:?}: {e}"))?;
            Duration::from_secs(secs)
        }
        None => Duration::from_secs(DEFAULT_RUN_SECS),
    };

    // Load configuration
    let config = Config::load(config_path.as_deref())?;
    debug!("Configuration: {:?}", config);

    // Encoder setup failure is fatal
    let encoder = SyntheticEncoder::new(&config.encoder)?;
    let pipeline = Arc::new(EncodePipeline::new(encoder, &config.pipeline)?);
    let ring = pipeline.ring();

    // Metrics consumer
    let (metrics_tx, metrics_rx) = flume::bounded::<MetricsReport>(4);
    let sampler = MetricsSampler::spawn(
        pipeline.counters(),
        config.pipeline.metrics_interval(),
        Some(metrics_tx),
    );
    let _metrics_handle = tokio::spawn(async move {
        while let Ok(report) = metrics_rx.recv_async().await {
            if report.process_rate_hz + 1.0 < report.capture_rate_hz {
                warn!(
                    "Encoder falling behind: {:.1} captured/s vs {:.1} processed/s",
                    report.capture_rate_hz, report.process_rate_hz
                );
            }
        }
    });

    // Capture thread
    pipeline.start();
    let capture = SyntheticCapture::new(config.capture.clone())?;
    let stop = Arc::new(AtomicBool::new(false));
    let capture_pipeline = pipeline.clone();
    let capture_handle = capture.spawn(stop.clone(), move |frame| {
        capture_pipeline.submit(frame);
    })?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = tokio::time::sleep(run_for) => info!("Run time of {:?} elapsed", run_for),
    }

    stop.store(true, Ordering::Release);
    let delivered = capture_handle
        .join()
        .map_err(|_| eyre!("capture thread panicked"))?;
    info!("Capture delivered {} frames", delivered);

    pipeline.stop();
    sampler.stop().await;

    summarize(&ring);

    match Arc::try_unwrap(pipeline) {
        Ok(pipeline) => pipeline.shutdown(),
        Err(_) => warn!("Pipeline still shared at exit"),
    }

    info!("framering shutting down");
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framering=debug"));

    #[cfg(not(feature = "profiling"))]
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    #[cfg(feature = "profiling")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(tracing_subscriber::fmt::time::uptime()),
            )
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
}

/// Drain the ring and report what it holds.
fn summarize(ring: &FrameRing) {
    let guard = ring.acquire_exclusive();
    let records = guard.records();

    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        info!("Frame ring is empty");
        return;
    };

    // Arrival order vs capture order
    let out_of_order = records
        .windows(2)
        .filter(|pair| pair[1].presentation_timestamp() < pair[0].presentation_timestamp())
        .count();
    let bytes: usize = records
        .iter()
        .filter_map(|r| r.payload())
        .map(|payload| payload.len())
        .sum();

    info!(
        "Frame ring holds {} of {} frames (seq {}..={}), {} key frames, \
         {} out of capture order, {:.1} MB",
        records.len(),
        ring.capacity(),
        first.sequence_id(),
        last.sequence_id(),
        guard.key_frame_count(),
        out_of_order,
        bytes as f64 / 1_048_576.0
    );
    debug!(
        "Newest frame pts {:?}, hash {:016x}",
        last.presentation_timestamp(),
        last.content_hash()
    );

    let stats = ring.stats();
    info!(
        "Ring stats: accepted {}, overwritten {}, dropped during drain {}",
        stats.total_accepted, stats.frames_overwritten, stats.frames_dropped
    );
}
