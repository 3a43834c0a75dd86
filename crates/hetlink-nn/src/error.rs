//! Error types for hetlink-nn.

use hetlink_core::NodeTypeId;
use thiserror::Error;

/// Encoder error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Graph data error.
    #[error(transparent)]
    Core(#[from] hetlink_core::Error),

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A node type has no features or embeddings.
    #[error("missing node type {0}")]
    MissingNodeType(NodeTypeId),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
