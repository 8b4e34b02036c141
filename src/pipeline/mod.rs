pub mod encode;
pub mod record;
pub mod ringbuf;

pub use encode::{CompletionSink, EncodePipeline, PipelineState};
pub use record::FrameRecord;
pub use ringbuf::{DrainGuard, FrameRing, RingStats};
