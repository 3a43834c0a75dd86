// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

//! Core data structures for multi-relational link prediction.
//!
//! This crate has no tensor dependency. It covers everything that happens to
//! a heterogeneous graph before a model sees it:
//!
//! - [`RelationCatalog`] - node types, relation types `(row, col, index)`, decoders
//! - [`SparseMatrix`] - sorted COO adjacency and feature matrices
//! - [`GraphData`] - matrices validated against the catalog, JSON exchange
//! - [`DegreeTable`] - per-relation degrees for weighted negative sampling
//! - [`NegativeSampler`] - bounded rejection sampling of absent edges
//! - [`EdgeSplit`] - train / validation / test partition per relation
//! - [`EdgeMinibatchIterator`] - cyclic minibatch scheduling across relations
//! - [`SyntheticGraph`] - planted-community graphs for demos and tests
//!
//! # Example
//!
//! ```rust
//! use hetlink_core::{EdgeMinibatchIterator, IteratorConfig, SyntheticGraph};
//!
//! let graph = SyntheticGraph::default().generate().unwrap();
//! let selection = graph.catalog().relation_types();
//! let config = IteratorConfig::default().with_batch_size(64);
//!
//! let mut iter = EdgeMinibatchIterator::new(&graph, &selection, config).unwrap();
//! iter.shuffle();
//! let mut steps = 0;
//! while let Some(batch) = iter.next_minibatch().unwrap() {
//!     assert_eq!(batch.negatives.len(), batch.positives.len());
//!     steps += 1;
//! }
//! assert!(iter.end());
//! assert_eq!(steps, iter.batches_per_epoch());
//! ```

pub mod catalog;
pub mod degree;
mod error;
pub mod graph;
pub mod minibatch;
pub mod sampling;
pub mod sparse;
pub mod split;
pub mod synthetic;

pub use catalog::{DecoderKind, NodeTypeId, RelationCatalog, RelationType};
pub use degree::{Axis, DegreeTable};
pub use error::{Error, Result};
pub use graph::{GraphData, GraphFile, GraphStats, RelationStats};
pub use minibatch::{EdgeMinibatchIterator, IteratorConfig, Minibatch, RelationSlot};
pub use sampling::{EdgeSet, NegativeSampler, NegativeStrategy};
pub use sparse::{Edge, SparseMatrix};
pub use split::EdgeSplit;
pub use synthetic::SyntheticGraph;
