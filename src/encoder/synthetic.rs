//! Software stand-in for the hardware encoder.
//!
//! A pool of worker threads pulls jobs from a bounded channel, so completions
//! arrive on threads the pipeline does not own and can finish out of order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use flume::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::capture::RawFrame;
use crate::encoder::{Completion, EncodedUnit, VideoEncoder};
use crate::error::{EncodeError, PipelineError};
use crate::EncoderConfig;

const HEADER_LEN: usize = 17;
const SAMPLE_STRIDE: usize = 16;
const KEY_FRAME_SCALE: usize = 4;

struct Job {
    frame: RawFrame,
    is_key_frame: bool,
    completion: Completion,
}

pub struct SyntheticEncoder {
    config: EncoderConfig,
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    /// Index of the key-frame interval last seen, plus one (0 = none yet)
    last_key_interval: AtomicU64,
}

impl SyntheticEncoder {
    /// Set up the encoder session. Fails once, up front, on a configuration
    /// the session cannot honor.
    pub fn new(config: &EncoderConfig) -> Result<Self, PipelineError> {
        Self::validate(config)?;

        let (tx, rx) = flume::bounded::<Job>(config.queue_depth);
        let workers = (0..config.worker_threads)
            .map(|i| {
                let rx = rx.clone();
                let config = config.clone();
                thread::Builder::new()
                    .name(format!("encoder-{i}"))
                    .spawn(move || worker_loop(rx, config))
                    .map_err(|e| {
                        PipelineError::EncoderSetup(format!("failed to spawn worker: {e}"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Encoder session ready: {:?} {}x{} @ {} bps, key frame every {}s, \
             realtime={}, hw={}, {} workers",
            config.codec,
            config.width,
            config.height,
            config.bitrate,
            config.key_frame_interval_secs,
            config.realtime,
            config.hardware_acceleration,
            config.worker_threads
        );

        Ok(Self {
            config: config.clone(),
            jobs: Some(tx),
            workers,
            last_key_interval: AtomicU64::new(0),
        })
    }

    fn validate(config: &EncoderConfig) -> Result<(), PipelineError> {
        let fail = |msg: String| Err(PipelineError::EncoderSetup(msg));

        if config.width == 0 || config.height == 0 {
            return fail(format!("invalid dimensions {}x{}", config.width, config.height));
        }
        if config.bitrate == 0 {
            return fail("bitrate must be non-zero".into());
        }
        if !(config.key_frame_interval_secs.is_finite() && config.key_frame_interval_secs > 0.0) {
            return fail(format!(
                "invalid key frame interval {}",
                config.key_frame_interval_secs
            ));
        }
        if config.allow_frame_reordering {
            return fail("frame reordering is not supported in realtime mode".into());
        }
        if config.worker_threads == 0 || config.queue_depth == 0 {
            return fail("worker_threads and queue_depth must be non-zero".into());
        }
        Ok(())
    }

    fn interval_slot(&self, pts: Duration) -> u64 {
        (pts.as_secs_f64() / self.config.key_frame_interval_secs) as u64 + 1
    }

    /// A frame is a key frame when its timestamp enters a new interval.
    fn mark_key_frame(&self, pts: Duration) -> bool {
        let slot = self.interval_slot(pts);
        self.last_key_interval.swap(slot, Ordering::AcqRel) != slot
    }

    /// Hand back the interval's key frame when the marked frame never
    /// reached a worker, so the next frame in the interval takes it.
    fn unmark_key_frame(&self, pts: Duration) {
        let slot = self.interval_slot(pts);
        let _ = self
            .last_key_interval
            .compare_exchange(slot, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    fn fail_unqueued(&self, job: Job, error: EncodeError) {
        if job.is_key_frame {
            self.unmark_key_frame(job.completion.pts());
        }
        job.completion.complete(Err(error));
    }
}

impl VideoEncoder for SyntheticEncoder {
    fn encode(&self, frame: RawFrame, completion: Completion) {
        if frame.width() != self.config.width || frame.height() != self.config.height {
            let reason = format!(
                "frame is {}x{}, session is {}x{}",
                frame.width(),
                frame.height(),
                self.config.width,
                self.config.height
            );
            completion.complete(Err(EncodeError::Rejected {
                pts: frame.pts,
                reason,
            }));
            return;
        }

        let Some(jobs) = &self.jobs else {
            completion.complete(Err(EncodeError::Shutdown));
            return;
        };

        let job = Job {
            is_key_frame: self.mark_key_frame(frame.pts),
            frame,
            completion,
        };

        match jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => self.fail_unqueued(job, EncodeError::QueueFull),
            Err(TrySendError::Disconnected(job)) => self.fail_unqueued(job, EncodeError::Shutdown),
        }
    }

    fn name(&self) -> &str {
        match self.config.codec {
            crate::Codec::Hevc => "synthetic-hevc",
            crate::Codec::H264 => "synthetic-h264",
        }
    }
}

impl Drop for SyntheticEncoder {
    fn drop(&mut self) {
        // Workers finish queued jobs before they see the disconnect
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Encoder worker panicked");
            }
        }
        debug!("Encoder session invalidated");
    }
}

fn worker_loop(rx: Receiver<Job>, config: EncoderConfig) {
    while let Ok(job) = rx.recv() {
        let unit = compress(&job.frame, job.is_key_frame, &config);
        job.completion.complete(Ok(unit));
    }
}

/// Emit a payload sized to the configured bitrate: a header (pts, key flag,
/// sampled content hash) padded to the per-frame byte budget.
fn compress(frame: &RawFrame, is_key_frame: bool, config: &EncoderConfig) -> EncodedUnit {
    let frame_secs = frame.duration.as_secs_f64();
    let budget = (config.bitrate as f64 / 8.0 * frame_secs).round() as usize;
    let scaled = if is_key_frame {
        budget * KEY_FRAME_SCALE
    } else {
        budget
    };
    let target = scaled.max(HEADER_LEN);

    let mut buf = BytesMut::with_capacity(target);
    buf.put_u64(frame.pts.as_nanos() as u64);
    buf.put_u8(u8::from(is_key_frame));
    buf.put_u64(sample_hash(&frame.data));
    buf.resize(target, 0);

    EncodedUnit {
        data: buf.freeze(),
        is_key_frame,
    }
}

/// FNV-1a over every sixteenth byte of the image
fn sample_hash(data: &[u8]) -> u64 {
    data.iter()
        .step_by(SAMPLE_STRIDE)
        .fold(14_695_981_039_346_656_037u64, |hash, &byte| {
            (hash ^ u64::from(byte)).wrapping_mul(1_099_511_628_211)
        })
}
