//! Error types for the ingestion core

use std::time::Duration;

/// Errors surfaced by pipeline setup and configuration
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Encoder setup failed: {0}")]
    EncoderSetup(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Per-frame encode failures. These are counted and logged, never propagated
/// past the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("encoder rejected frame at {pts:?}: {reason}")]
    Rejected { pts: Duration, reason: String },

    #[error("encoder queue full")]
    QueueFull,

    #[error("encoder shut down")]
    Shutdown,

    #[error("completion dropped without a result")]
    Abandoned,
}
