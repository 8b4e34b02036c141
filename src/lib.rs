pub mod capture;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use error::{EncodeError, PipelineError};

/// Environment variables override file values, e.g.
/// `FRAMERING__PIPELINE__RING_BUFFER_SIZE=64`.
pub const ENV_PREFIX: &str = "FRAMERING";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub encoder: EncoderConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Hevc,
    H264,
}

/// Fixed for the encoder session's lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    /// Average bit rate in bits per second
    pub bitrate: u64,
    pub codec: Codec,
    pub realtime: bool,
    pub allow_frame_reordering: bool,
    pub hardware_acceleration: bool,
    pub key_frame_interval_secs: f64,
    pub worker_threads: usize,
    /// Frames allowed in flight before submissions start failing
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ring_buffer_size: usize,
    pub metrics_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 2160,
            fps: 120,
            format: PixelFormat::Nv12,
            buffer_count: 4,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 3840,
            height: 2160,
            bitrate: 100_000_000,
            codec: Codec::Hevc,
            realtime: true,
            allow_frame_reordering: false,
            hardware_acceleration: true,
            key_frame_interval_secs: 1.0,
            worker_threads: 2,
            queue_depth: 32,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_buffer_size: 420,
            metrics_interval_ms: 1000,
        }
    }
}

impl PipelineConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `FRAMERING__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        Self::build(builder)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, PipelineError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));
        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, PipelineError> {
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if self.capture.width == 0 || self.capture.height == 0 {
            return invalid("capture dimensions must be non-zero");
        }
        if self.capture.fps == 0 {
            return invalid("capture fps must be non-zero");
        }
        if self.encoder.width == 0 || self.encoder.height == 0 {
            return invalid("encoder dimensions must be non-zero");
        }
        if self.encoder.bitrate == 0 {
            return invalid("encoder bitrate must be non-zero");
        }
        if !(self.encoder.key_frame_interval_secs > 0.0) {
            return invalid("key frame interval must be positive");
        }
        if self.pipeline.ring_buffer_size == 0 {
            return invalid("ring buffer size must be non-zero");
        }
        if self.pipeline.metrics_interval_ms == 0 {
            return invalid("metrics interval must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_4k_120_capture() {
        let config = Config::default();
        assert_eq!((config.capture.width, config.capture.height), (3840, 2160));
        assert_eq!(config.capture.fps, 120);
        assert_eq!(config.encoder.bitrate, 100_000_000);
        assert!(!config.encoder.allow_frame_reordering);
        assert_eq!(config.pipeline.ring_buffer_size, 420);
        assert_eq!(config.pipeline.metrics_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [capture]
            width = 1920
            height = 1080
            format = "bgra"

            [encoder]
            codec = "h264"

            [pipeline]
            ring_buffer_size = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.width, 1920);
        assert_eq!(config.capture.format, PixelFormat::Bgra);
        assert_eq!(config.capture.fps, 120);
        assert_eq!(config.encoder.codec, Codec::H264);
        assert_eq!(config.pipeline.ring_buffer_size, 64);
        assert_eq!(config.pipeline.metrics_interval_ms, 1000);
    }

    #[test]
    fn zero_ring_size_is_rejected() {
        let result = Config::from_toml_str("[pipeline]\nring_buffer_size = 0\n");
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/framering.toml")));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
