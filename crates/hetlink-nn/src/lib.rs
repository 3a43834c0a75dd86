#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_arguments)]

//! Multi-relational graph convolution on candle.
//!
//! `hetlink-nn` turns validated graph data from `hetlink-core` into
//! per-node-type embeddings. It sits between the data layer and the
//! decoders / training loop in `hetlink-kge`.
//!
//! # Modules
//!
//! - [`context`]: Explicit model context (device, dtype, variable store)
//! - [`sparse`]: Sparse-dense products with sparse dropout
//! - [`graph`]: Features and normalised message-passing channels on device
//! - [`conv`]: One multi-relational convolution layer
//! - [`encoder`]: Two-layer encoder producing [`Embeddings`]
//!
//! # Example
//!
//! ```rust
//! use hetlink_core::SyntheticGraph;
//! use hetlink_nn::{EncoderConfig, GraphTensors, ModelContext, MultiRelationalEncoder};
//!
//! let graph = SyntheticGraph::default().generate().unwrap();
//! let ctx = ModelContext::cpu();
//! let config = EncoderConfig::default().with_hidden(16, 8);
//! let tensors =
//!     GraphTensors::new(&graph, graph.adjacency_map(), config.propagation, ctx.device()).unwrap();
//! let encoder = MultiRelationalEncoder::new(&tensors, config, ctx.var_builder()).unwrap();
//!
//! let embeddings = encoder.forward(&tensors, false).unwrap();
//! assert_eq!(embeddings.get(0).unwrap().dims(), &[60, 8]);
//! ```

pub mod context;
pub mod conv;
pub mod encoder;
pub mod error;
pub mod graph;
pub mod sparse;

pub use context::ModelContext;
pub use conv::{Activation, NodeInput, RelationalConv, WeightSharing};
pub use encoder::{EncoderConfig, Embeddings, MultiRelationalEncoder};
pub use error::{Error, Result};
pub use graph::{Channel, GraphTensors, Propagation, PropagationGraph};
pub use sparse::SparseTensor;
