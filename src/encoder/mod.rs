//! Encoder contract: frames go in synchronously, results come back through a
//! one-shot [`Completion`] on whatever thread the encoder chooses.

pub mod synthetic;

use std::time::Duration;

use bytes::Bytes;

use crate::capture::RawFrame;
use crate::error::EncodeError;
use crate::pipeline::encode::CompletionSink;

pub use synthetic::SyntheticEncoder;

/// Output of one successful encode
#[derive(Debug, Clone)]
pub struct EncodedUnit {
    pub data: Bytes,
    pub is_key_frame: bool,
}

/// Stateful video encoder
pub trait VideoEncoder: Send + Sync {
    /// Queue one frame. Must return without waiting for the encode; the
    /// result is delivered through `completion`, possibly on another thread
    /// and in any order relative to other submissions.
    fn encode(&self, frame: RawFrame, completion: Completion);

    fn name(&self) -> &str;
}

/// One-shot completion handle for a submitted frame.
///
/// Dropping it without calling [`complete`](Completion::complete) reports the
/// frame as failed.
pub struct Completion {
    sink: Option<CompletionSink>,
    pts: Duration,
}

impl Completion {
    pub(crate) fn new(sink: CompletionSink, pts: Duration) -> Self {
        Self {
            sink: Some(sink),
            pts,
        }
    }

    /// Presentation timestamp of the submitted frame
    pub fn pts(&self) -> Duration {
        self.pts
    }

    pub fn complete(mut self, result: Result<EncodedUnit, EncodeError>) {
        if let Some(sink) = self.sink.take() {
            sink.on_encoded(self.pts, result);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.on_encoded(self.pts, Err(EncodeError::Abandoned));
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("pts", &self.pts)
            .field("pending", &self.sink.is_some())
            .finish()
    }
}
