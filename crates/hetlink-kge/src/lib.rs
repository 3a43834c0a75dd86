#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

//! Relation decoders, training and evaluation for multi-relational link
//! prediction.
//!
//! The encoder in `hetlink-nn` produces one embedding per node. This crate
//! turns pairs of embeddings into relation-specific scores and trains the
//! whole model end to end:
//!
//! ```text
//! EdgeMinibatchIterator ──batch──> LinkOptimizer::step
//!                                     │ encoder (train mode)
//!                                     │ DecoderBank::score_edges
//!                                     │ hinge / cross-entropy + L2
//!                                     v
//!                                   Adam update
//! ```
//!
//! ## Decoders
//!
//! | Decoder | Score | Shares parameters |
//! |---------|-------|-------------------|
//! | Bilinear | `u^T R v` | no |
//! | Low-rank bilinear | `u^T L R^T v` | no |
//! | DEDICOM | `u^T D G D v` | `G` across a node-type pair |
//! | DistMult | `u^T diag(r) v` | no |
//! | Inner product | `u^T v` | no parameters |
//!
//! ## Metrics
//!
//! Held-out positives are scored against an equal number of sampled
//! negatives. [`Evaluator`] reports AUROC, AUPRC and AP@k (k = 50 by
//! default) per relation, after checking every scored edge against the
//! original adjacency.
//!
//! # Modules
//!
//! - [`decoder`]: Per-relation scoring functions
//! - [`loss`]: Hinge and cross-entropy objectives, L2 penalty
//! - [`model`]: Encoder + decoders behind one parameter context
//! - [`optimizer`]: Adam steps and held-out costs
//! - [`evaluation`]: AUROC, AUPRC, AP@k
//! - [`checkpoint`]: safetensors checkpoints
//! - [`training`]: Configuration and the epoch loop

pub mod checkpoint;
pub mod decoder;
pub mod error;
pub mod evaluation;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod training;

pub use checkpoint::{
    checkpoint_dir_for_epoch, load_checkpoint, read_checkpoint_meta, save_checkpoint,
    CheckpointMeta,
};
pub use decoder::{Decoder, DecoderBank};
pub use error::{Error, Result};
pub use evaluation::{apk, average_precision, roc_auc, EvaluationMetrics, Evaluator};
pub use loss::{cross_entropy_loss, hinge_loss, l2_penalty, LossKind};
pub use model::LinkPredictionModel;
pub use optimizer::{LinkOptimizer, OptimizerConfig, StepOutput};
pub use training::{
    EpochSummary, HeldOut, RelationReport, Trainer, TrainingConfig, TrainingReport,
};
