//! Synthetic capture source that stands in for a camera session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info};

use crate::capture::frame::{FrameMetadata, RawFrame};
use crate::error::PipelineError;
use crate::CaptureConfig;

/// Paced frame generator cycling through a pool of pre-allocated buffers
pub struct SyntheticCapture {
    config: CaptureConfig,
    sequence: u64,
    frame_interval: Duration,
    buffers: Vec<Bytes>, // Pre-allocated buffers
}

impl SyntheticCapture {
    pub fn new(config: CaptureConfig) -> Result<Self, PipelineError> {
        if config.width == 0 || config.height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "capture dimensions must be non-zero, got {}x{}",
                config.width, config.height
            )));
        }
        if config.fps == 0 {
            return Err(PipelineError::InvalidConfig("capture fps must be non-zero".into()));
        }

        info!(
            "Initializing synthetic capture: {}x{} @ {} fps ({:?})",
            config.width, config.height, config.fps, config.format
        );

        let frame_size = config.format.frame_size(config.width, config.height);
        let buffers = (0..config.buffer_count.max(1))
            .map(|i| Bytes::from(vec![(i as u8).wrapping_mul(37); frame_size]))
            .collect();

        Ok(Self {
            frame_interval: default_frame_duration(config.fps),
            config,
            sequence: 0,
            buffers,
        })
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Produce the next frame. A source that reports no duration gets `1/fps`.
    pub fn next_frame(&mut self, reported_duration: Option<Duration>) -> RawFrame {
        let sequence = self.sequence;
        self.sequence += 1;

        let data = self.buffers[sequence as usize % self.buffers.len()].clone();
        let pts = Duration::from_nanos(sequence * self.frame_interval.as_nanos() as u64);

        RawFrame {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                width: self.config.width,
                height: self.config.height,
                stride: self.config.format.stride(self.config.width),
                format: self.config.format,
            }),
            pts,
            duration: frame_duration(reported_duration, self.config.fps),
        }
    }

    /// Run the capture loop on a dedicated thread until `stop` is raised.
    /// Every frame is handed to `sink` synchronously; the returned handle
    /// yields the number of frames delivered.
    pub fn spawn<F>(
        mut self,
        stop: Arc<AtomicBool>,
        mut sink: F,
    ) -> std::io::Result<JoinHandle<u64>>
    where
        F: FnMut(RawFrame) + Send + 'static,
    {
        thread::Builder::new().name("capture".into()).spawn(move || {
            let started = Instant::now();
            let mut delivered = 0u64;

            while !stop.load(Ordering::Acquire) {
                let frame = self.next_frame(None);
                if delivered == 0 {
                    info!(
                        "First frame {}x{} ({}), {:?} per frame",
                        frame.width(),
                        frame.height(),
                        if frame.is_4k() { "4K" } else { "sub-4K" },
                        frame.duration
                    );
                }
                sink(frame);
                delivered += 1;

                let deadline = started + self.frame_interval * delivered as u32;
                if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }

            debug!("Capture loop stopped after {} frames", delivered);
            delivered
        })
    }
}

/// Nominal duration of one frame at `fps`.
pub fn default_frame_duration(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1)))
}

/// Substitute the nominal duration when the source reports none or zero.
pub fn frame_duration(reported: Option<Duration>, fps: u32) -> Duration {
    match reported {
        Some(duration) if !duration.is_zero() => duration,
        _ => default_frame_duration(fps),
    }
}
