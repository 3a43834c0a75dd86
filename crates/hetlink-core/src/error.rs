use thiserror::Error;

use crate::catalog::{NodeTypeId, RelationType};

/// Errors that can occur in hetlink-core.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Input data disagrees with the relation catalog, or with itself.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Negative sampling could not meet its quota within the attempt budget.
    #[error(
        "negative sampling exhausted for relation {relation}: \
         needed {requested}, sampled {sampled} after {attempts} attempts"
    )]
    SamplingExhausted {
        /// Relation being sampled.
        relation: RelationType,
        /// Number of negatives requested.
        requested: usize,
        /// Number of negatives obtained before giving up.
        sampled: usize,
        /// Draws spent on the negative that failed.
        attempts: usize,
    },

    /// A selected relation type has no positive edges.
    #[error("relation {relation} has no positive edges ({rows}x{cols} adjacency)")]
    EmptyRelation {
        /// Offending relation.
        relation: RelationType,
        /// Adjacency rows.
        rows: usize,
        /// Adjacency columns.
        cols: usize,
    },

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Relation type not present in the catalog.
    #[error("unknown relation type: {0}")]
    UnknownRelation(RelationType),

    /// Node type not present in the catalog.
    #[error("unknown node type: {0}")]
    UnknownNodeType(NodeTypeId),
}

/// Result type alias for hetlink-core.
pub type Result<T> = std::result::Result<T, Error>;
