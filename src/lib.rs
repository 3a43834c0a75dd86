//! Multi-relational link prediction on heterogeneous graphs.
//!
//! `hetlink` learns node embeddings with a relational graph convolution
//! encoder and scores candidate edges of every relation type with a
//! relation-specific decoder:
//!
//! - Validate typed graphs (adjacency per relation, features per node type)
//! - Split each relation into train / validation / test edges with sampled negatives
//! - Train encoder and decoders jointly on round-robin relation minibatches
//! - Report AUROC, AUPRC and AP@k per relation
//!
//! # Crate Structure
//!
//! - [`hetlink_core`] - Relation catalog, sparse matrices, splits, minibatch iterator
//! - [`hetlink_nn`] - Sparse tensors, relational convolution, encoder
//! - [`hetlink_kge`] - Decoders, losses, optimizer, evaluation, trainer
//!
//! # Example
//!
//! ```rust
//! use hetlink::{SyntheticGraph, TrainingConfig};
//!
//! let graph = SyntheticGraph::default().generate().unwrap();
//! let config = TrainingConfig::default()
//!     .with_hidden(16, 8)
//!     .with_epochs(1)
//!     .with_track_held_out_cost(false);
//!
//! let (_trainer, report) = hetlink::train_all_relations(graph, config).unwrap();
//! for relation in &report.test {
//!     println!("{relation}");
//! }
//! ```

// Re-export core types
pub use hetlink_core::{
    DecoderKind, Edge, EdgeMinibatchIterator, EdgeSplit, Error as CoreError, GraphData, GraphFile,
    GraphStats, IteratorConfig, Minibatch, NegativeStrategy, NodeTypeId, RelationCatalog,
    RelationType, Result as CoreResult, SparseMatrix, SyntheticGraph,
};

pub use hetlink_kge::{
    Error, EvaluationMetrics, HeldOut, LinkPredictionModel, RelationReport, Result, Trainer,
    TrainingConfig, TrainingReport,
};

/// Graph data, sampling and minibatching.
pub mod data {
    pub use hetlink_core::*;
}

/// Encoder layers.
pub mod nn {
    pub use hetlink_nn::*;
}

/// Decoders, training and evaluation.
pub mod kge {
    pub use hetlink_kge::*;
}

/// Train on every relation type of `graph` and score the test splits.
pub fn train_all_relations(graph: GraphData, config: TrainingConfig) -> Result<(Trainer, TrainingReport)> {
    let selection = graph.catalog().relation_types();
    let mut trainer = Trainer::new(graph, selection, config)?;
    let report = trainer.train()?;
    Ok((trainer, report))
}
