//! Encode pipeline: capture hand-off, completion handling and buffering

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, trace, warn};

use crate::capture::RawFrame;
use crate::encoder::{Completion, EncodedUnit, VideoEncoder};
use crate::error::{EncodeError, PipelineError};
use crate::pipeline::record::FrameRecord;
use crate::pipeline::ringbuf::FrameRing;
use crate::stats::ThroughputCounters;
use crate::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Active = 1,
}

/// Held while `start()` clears the ring; reads as Idle from outside
const STARTING: u8 = 2;

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Active,
            _ => PipelineState::Idle,
        }
    }
}

/// Where encode results land. Cloned into every [`Completion`] so results
/// can be recorded from any encoder thread.
#[derive(Clone)]
pub struct CompletionSink {
    ring: Arc<FrameRing>,
    counters: Arc<ThroughputCounters>,
}

impl CompletionSink {
    pub fn on_encoded(&self, pts: Duration, result: Result<EncodedUnit, EncodeError>) {
        match result {
            Ok(unit) => {
                let record = FrameRecord::new(Some(unit.data), pts, unit.is_key_frame);
                if self.ring.append(record).is_none() {
                    self.counters.record_dropped();
                    trace!("Frame at {:?} dropped during drain", pts);
                }
            }
            Err(e) => {
                self.counters.record_encode_failure();
                warn!("Failed to encode frame at {:?}: {}", pts, e);
            }
        }
        self.counters.increment_processed();
    }
}

/// Feeds captured frames to an encoder and buffers what comes back.
///
/// `submit` is called from the capture thread and never waits on the
/// encoder. Results may arrive on any thread and in any order; the ring's
/// sequence ids record arrival order only.
pub struct EncodePipeline {
    encoder: Box<dyn VideoEncoder>,
    sink: CompletionSink,
    state: AtomicU8,
}

impl EncodePipeline {
    pub fn new<E>(encoder: E, config: &PipelineConfig) -> Result<Self, PipelineError>
    where
        E: VideoEncoder + 'static,
    {
        let ring = Arc::new(FrameRing::new(config.ring_buffer_size)?);
        Ok(Self::with_parts(
            Box::new(encoder),
            ring,
            Arc::new(ThroughputCounters::new()),
        ))
    }

    pub fn with_parts(
        encoder: Box<dyn VideoEncoder>,
        ring: Arc<FrameRing>,
        counters: Arc<ThroughputCounters>,
    ) -> Self {
        info!(
            "Encode pipeline using {} with ring capacity {}",
            encoder.name(),
            ring.capacity()
        );

        Self {
            encoder,
            sink: CompletionSink { ring, counters },
            state: AtomicU8::new(PipelineState::Idle as u8),
        }
    }

    pub fn ring(&self) -> Arc<FrameRing> {
        self.sink.ring.clone()
    }

    pub fn counters(&self) -> Arc<ThroughputCounters> {
        self.sink.counters.clone()
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Idle -> Active. Discards whatever the ring held from a previous run
    /// (waiting out a drain in progress). Returns false if already active
    /// or another `start()` is under way; only the winner clears.
    pub fn start(&self) -> bool {
        let claimed = self
            .state
            .compare_exchange(
                PipelineState::Idle as u8,
                STARTING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !claimed {
            return false;
        }

        self.sink.ring.clear();
        self.state.store(PipelineState::Active as u8, Ordering::Release);
        info!("Encode pipeline active");
        true
    }

    /// Active -> Idle. Encodes already queued still complete into the ring.
    pub fn stop(&self) -> bool {
        let stopped = self
            .state
            .compare_exchange(
                PipelineState::Active as u8,
                PipelineState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if stopped {
            info!("Encode pipeline idle");
        }
        stopped
    }

    /// Hand a frame to the encoder without waiting for the result.
    /// Returns false, touching nothing, when the pipeline is idle.
    #[instrument(level = "trace", skip_all, fields(pts = ?frame.pts))]
    pub fn submit(&self, frame: RawFrame) -> bool {
        if self.state() != PipelineState::Active {
            trace!("Pipeline idle, frame ignored");
            return false;
        }

        self.sink.counters.increment_captured();
        let completion = Completion::new(self.sink.clone(), frame.pts);
        self.encoder.encode(frame, completion);
        true
    }

    /// Record an encode result directly, bypassing a [`Completion`].
    pub fn on_encoded(&self, pts: Duration, result: Result<EncodedUnit, EncodeError>) {
        self.sink.on_encoded(pts, result);
    }

    /// Stop and release the encoder, which flushes whatever it still holds.
    pub fn shutdown(self) {
        self.stop();
        let Self { encoder, sink, .. } = self;
        drop(encoder);

        let totals = sink.counters.totals();
        info!(
            "Encode pipeline shut down: captured {}, processed {}, failed {}, dropped {}, \
             buffered {}",
            totals.captured,
            totals.processed,
            totals.encode_failures,
            totals.frames_dropped,
            sink.ring.size()
        );
    }
}
