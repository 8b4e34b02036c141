use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framering::capture::{PixelFormat, SyntheticCapture};
use framering::encoder::SyntheticEncoder;
use framering::pipeline::{EncodePipeline, PipelineState};
use framering::stats::MetricsSampler;
use framering::{CaptureConfig, Config, EncoderConfig, PipelineConfig};

fn small_config(ring_buffer_size: usize) -> Config {
    Config {
        capture: CaptureConfig {
            width: 32,
            height: 16,
            fps: 120,
            format: PixelFormat::Nv12,
            buffer_count: 2,
        },
        encoder: EncoderConfig {
            width: 32,
            height: 16,
            bitrate: 1_000_000,
            queue_depth: 1_024,
            ..EncoderConfig::default()
        },
        pipeline: PipelineConfig {
            ring_buffer_size,
            metrics_interval_ms: 50,
        },
    }
}

#[test]
fn capture_to_ring_end_to_end() {
    let config = small_config(100);
    let encoder = SyntheticEncoder::new(&config.encoder).unwrap();
    let pipeline = EncodePipeline::new(encoder, &config.pipeline).unwrap();
    let ring = pipeline.ring();
    let counters = pipeline.counters();

    let mut capture = SyntheticCapture::new(config.capture.clone()).unwrap();
    assert!(pipeline.start());
    for _ in 0..360 {
        assert!(pipeline.submit(capture.next_frame(None)));
    }
    pipeline.shutdown();

    let totals = counters.totals();
    assert_eq!(totals.captured, 360);
    assert_eq!(totals.processed, 360);
    assert_eq!(totals.encode_failures, 0);

    assert_eq!(ring.size(), 100);
    assert_eq!(ring.total_accepted(), 360);

    let guard = ring.acquire_exclusive();
    let records = guard.records();
    let ids: Vec<_> = records.iter().map(|r| r.sequence_id()).collect();
    assert_eq!(ids, (260..360).collect::<Vec<_>>());

    // 360 frames at 120 fps span three one-second key-frame intervals, so
    // at most one key frame can be among the newest 100
    assert!(guard.key_frame_count() <= 1);
    assert!(records.iter().all(|r| r.payload().is_some()));
}

#[test]
fn drain_while_capturing_never_stalls_the_producer() {
    let config = small_config(16);
    let encoder = SyntheticEncoder::new(&config.encoder).unwrap();
    let pipeline = Arc::new(EncodePipeline::new(encoder, &config.pipeline).unwrap());
    let ring = pipeline.ring();
    let counters = pipeline.counters();
    pipeline.start();

    let stop = Arc::new(AtomicBool::new(false));
    let producer = pipeline.clone();
    let handle = SyntheticCapture::new(config.capture.clone())
        .unwrap()
        .spawn(stop.clone(), move |frame| {
            producer.submit(frame);
        })
        .unwrap();

    for _ in 0..5 {
        let guard = ring.acquire_exclusive();
        let before: Vec<_> = guard.records().iter().map(|r| r.sequence_id()).collect();
        std::thread::sleep(Duration::from_millis(30));
        let after: Vec<_> = guard.records().iter().map(|r| r.sequence_id()).collect();
        assert_eq!(before, after);
        drop(guard);
        std::thread::sleep(Duration::from_millis(10));
    }

    stop.store(true, Ordering::Release);
    let delivered = handle.join().unwrap();
    let pipeline = Arc::try_unwrap(pipeline).ok().unwrap();
    pipeline.shutdown();

    let totals = counters.totals();
    assert_eq!(totals.captured, delivered);
    assert_eq!(totals.processed, delivered);
    assert_eq!(
        ring.total_accepted() + totals.frames_dropped + totals.encode_failures,
        delivered
    );
    assert!(ring.size() <= 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sampler_tracks_live_pipeline() {
    let config = small_config(32);
    let encoder = SyntheticEncoder::new(&config.encoder).unwrap();
    let pipeline = EncodePipeline::new(encoder, &config.pipeline).unwrap();
    let (tx, rx) = flume::bounded(16);
    let sampler = MetricsSampler::spawn(
        pipeline.counters(),
        config.pipeline.metrics_interval(),
        Some(tx),
    );

    let mut capture = SyntheticCapture::new(config.capture.clone()).unwrap();
    pipeline.start();
    for _ in 0..40 {
        pipeline.submit(capture.next_frame(None));
    }
    pipeline.stop();
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let mut captured = 0;
    while captured < 40 {
        let report = rx.recv_async().await.unwrap();
        captured = report.total_frames_captured;
    }

    sampler.stop().await;
    pipeline.shutdown();
}
