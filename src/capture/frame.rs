use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Raw captured frame with zero-copy semantics
#[derive(Clone)]
pub struct RawFrame {
    /// Immutable image data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Presentation timestamp from the capture clock
    pub pts: Duration,

    /// Frame duration as reported by the source
    pub duration: Duration,
}

impl RawFrame {
    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    /// Anything whose short side exceeds 1080 lines counts as 4K-class.
    pub fn is_4k(&self) -> bool {
        self.meta.width.min(self.meta.height) > 1080
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("len", &self.data.len())
            .field("meta", &self.meta)
            .field("pts", &self.pts)
            .field("duration", &self.duration)
            .finish()
    }
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Capture order, starting at 0
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
}

/// Pixel formats the capture side can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Bgra,
    Nv12,
    Rgb24,
}

impl PixelFormat {
    /// Bytes per row for the first plane.
    pub fn stride(self, width: u32) -> u32 {
        match self {
            PixelFormat::Bgra => width * 4,
            PixelFormat::Rgb24 => width * 3,
            PixelFormat::Nv12 => width,
        }
    }

    /// Total buffer size for a frame of the given dimensions.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let plane = self.stride(width) as usize * height as usize;
        match self {
            // Luma plane plus half-height interleaved chroma
            PixelFormat::Nv12 => plane + plane / 2,
            _ => plane,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_includes_chroma_plane() {
        assert_eq!(PixelFormat::Nv12.frame_size(4, 4), 24);
        assert_eq!(PixelFormat::Bgra.frame_size(4, 4), 64);
    }

    #[test]
    fn four_k_detection_uses_short_side() {
        let frame = |width, height| RawFrame {
            data: Bytes::new(),
            meta: Arc::new(FrameMetadata {
                sequence: 0,
                width,
                height,
                stride: width,
                format: PixelFormat::Nv12,
            }),
            pts: Duration::ZERO,
            duration: Duration::ZERO,
        };
        assert!(frame(3840, 2160).is_4k());
        assert!(frame(2160, 3840).is_4k());
        assert!(!frame(1920, 1080).is_4k());
    }
}
