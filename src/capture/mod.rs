pub mod frame;
pub mod synthetic;

pub use frame::{FrameMetadata, PixelFormat, RawFrame};
pub use synthetic::SyntheticCapture;
