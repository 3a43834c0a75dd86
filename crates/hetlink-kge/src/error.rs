use hetlink_core::RelationType;
use thiserror::Error;

/// Errors that can occur in hetlink-kge.
#[derive(Error, Debug)]
pub enum Error {
    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
    /// Graph data or iterator error.
    #[error(transparent)]
    Core(#[from] hetlink_core::Error),
    /// Encoder error.
    #[error(transparent)]
    Nn(#[from] hetlink_nn::Error),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Scored edges disagree with the original adjacency.
    #[error("data integrity error for relation {relation}: {message}")]
    DataIntegrity {
        /// Relation being evaluated.
        relation: RelationType,
        /// What went wrong.
        message: String,
    },
    /// Invalid hyperparameter.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A metric is undefined because positives or negatives are missing.
    #[error("metric undefined: {positives} positives, {negatives} negatives")]
    DegenerateLabels {
        /// Positive labels seen.
        positives: usize,
        /// Negative labels seen.
        negatives: usize,
    },
    /// Relation has no decoder or is not in the catalog.
    #[error("unknown relation type: {0}")]
    UnknownRelation(RelationType),
}

/// Result type alias for hetlink-kge.
pub type Result<T> = std::result::Result<T, Error>;
