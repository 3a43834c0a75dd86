//! Training driver.
//!
//! [`Trainer`] owns the graph, the minibatch iterator, the model and the
//! optimizer, and runs the epoch loop:
//!
//! 1. Shuffle the iterator.
//! 2. For each minibatch: one optimizer step on the batch's relation, then
//!    (optionally) the validation and test cost of that relation.
//! 3. Every `checkpoint_every` epochs, write a checkpoint.
//!
//! After the last epoch every relation slot is scored on its test split.
//!
//! # Example
//!
//! ```rust
//! use hetlink_core::SyntheticGraph;
//! use hetlink_kge::{Trainer, TrainingConfig};
//!
//! let graph = SyntheticGraph::default().generate().unwrap();
//! let selection = graph.catalog().relation_types();
//! let config = TrainingConfig::default()
//!     .with_hidden(16, 8)
//!     .with_epochs(1)
//!     .with_track_held_out_cost(false);
//!
//! let mut trainer = Trainer::new(graph, selection, config).unwrap();
//! let report = trainer.train().unwrap();
//! assert_eq!(report.epochs.len(), 1);
//! ```

use hetlink_core::{
    Edge, EdgeMinibatchIterator, GraphData, IteratorConfig, NegativeStrategy, RelationType,
};
use hetlink_nn::{Activation, EncoderConfig, ModelContext, Propagation, WeightSharing};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::checkpoint::{self, CheckpointMeta};
use crate::error::{Error, Result};
use crate::evaluation::{EvaluationMetrics, Evaluator, DEFAULT_APK_K};
use crate::loss::LossKind;
use crate::model::LinkPredictionModel;
use crate::optimizer::{LinkOptimizer, OptimizerConfig};

/// Every knob of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Negatives per positive in a training batch (default: 1).
    pub neg_sample_size: usize,
    /// Adam step size (default: 0.001).
    pub learning_rate: f64,
    /// Passes over the training edges (default: 1).
    pub epochs: usize,
    /// First layer width (default: 64).
    pub hidden1: usize,
    /// Embedding width (default: 32).
    pub hidden2: usize,
    /// L2 coefficient on encoder transforms (default: 0).
    pub weight_decay: f64,
    /// Dropout rate during training (default: 0.1).
    pub dropout: f32,
    /// Hinge margin (default: 0.1).
    pub max_margin: f64,
    /// Positives per batch (default: 512).
    pub batch_size: usize,
    /// Per-node-type bias in the encoder (default: true).
    pub bias: bool,
    /// Fraction of each relation held out for validation, and again for
    /// test (default: 0.1).
    pub held_out_fraction: f64,
    /// Seed for splits and negatives (default: 0).
    pub seed: u64,
    /// Draws allowed per negative (default: 1000).
    pub max_sampling_attempts: usize,
    /// Training negative distribution (default: uniform).
    pub negative_strategy: NegativeStrategy,
    /// Objective (default: hinge).
    pub loss: LossKind,
    /// AP@k cutoff (default: 50).
    pub apk_k: usize,
    /// Message directions (default: bidirectional).
    pub propagation: Propagation,
    /// Encoder transform sharing (default: per relation).
    pub weight_sharing: WeightSharing,
    /// Checkpoint period in epochs (default: 10).
    pub checkpoint_every: Option<usize>,
    /// Checkpoint root; `None` disables checkpoints.
    pub checkpoint_dir: Option<PathBuf>,
    /// Compute validation and test cost after every step (default: true).
    pub track_held_out_cost: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            neg_sample_size: 1,
            learning_rate: 0.001,
            epochs: 1,
            hidden1: 64,
            hidden2: 32,
            weight_decay: 0.0,
            dropout: 0.1,
            max_margin: 0.1,
            batch_size: 512,
            bias: true,
            held_out_fraction: 0.1,
            seed: 0,
            max_sampling_attempts: 1000,
            negative_strategy: NegativeStrategy::Uniform,
            loss: LossKind::Hinge,
            apk_k: DEFAULT_APK_K,
            propagation: Propagation::Bidirectional,
            weight_sharing: WeightSharing::PerRelation,
            checkpoint_every: Some(10),
            checkpoint_dir: None,
            track_held_out_cost: true,
        }
    }
}

impl TrainingConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_hidden(mut self, hidden1: usize, hidden2: usize) -> Self {
        self.hidden1 = hidden1;
        self.hidden2 = hidden2;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_neg_sample_size(mut self, n: usize) -> Self {
        self.neg_sample_size = n;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.max_margin = margin;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_held_out_fraction(mut self, fraction: f64) -> Self {
        self.held_out_fraction = fraction;
        self
    }

    pub fn with_negative_strategy(mut self, strategy: NegativeStrategy) -> Self {
        self.negative_strategy = strategy;
        self
    }

    pub fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_apk_k(mut self, k: usize) -> Self {
        self.apk_k = k;
        self
    }

    /// Write a checkpoint under `dir` every `every` epochs.
    pub fn with_checkpoints(mut self, dir: impl Into<PathBuf>, every: usize) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self.checkpoint_every = Some(every);
        self
    }

    pub fn with_track_held_out_cost(mut self, track: bool) -> Self {
        self.track_held_out_cost = track;
        self
    }

    /// Reject configurations that cannot train.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Configuration(msg));
        if self.batch_size == 0 {
            return fail("batch_size must be positive".into());
        }
        if self.neg_sample_size == 0 {
            return fail("neg_sample_size must be positive".into());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return fail(format!(
                "learning_rate must be positive and finite, got {}",
                self.learning_rate
            ));
        }
        let non_negative = |x: f64| x >= 0.0 && x.is_finite();
        if !(non_negative(self.weight_decay) && non_negative(self.max_margin)) {
            return fail(format!(
                "weight_decay and max_margin must be non-negative and finite, got {} / {}",
                self.weight_decay, self.max_margin
            ));
        }
        if self.hidden1 == 0 || self.hidden2 == 0 {
            return fail(format!(
                "hidden widths must be positive, got {}/{}",
                self.hidden1, self.hidden2
            ));
        }
        if !(0.0..0.5).contains(&self.held_out_fraction) {
            return fail(format!(
                "held_out_fraction must be in [0, 0.5), got {}",
                self.held_out_fraction
            ));
        }
        if self.apk_k == 0 {
            return fail("apk_k must be positive".into());
        }
        if self.max_sampling_attempts == 0 {
            return fail("max_sampling_attempts must be positive".into());
        }
        if self.checkpoint_every == Some(0) {
            return fail("checkpoint_every must be positive".into());
        }
        Ok(())
    }

    /// Iterator part of the configuration.
    pub fn iterator_config(&self) -> IteratorConfig {
        IteratorConfig::default()
            .with_batch_size(self.batch_size)
            .with_held_out_fraction(self.held_out_fraction)
            .with_neg_sample_size(self.neg_sample_size)
            .with_max_sampling_attempts(self.max_sampling_attempts)
            .with_negative_strategy(self.negative_strategy)
            .with_seed(self.seed)
    }

    /// Encoder part of the configuration.
    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            hidden1: self.hidden1,
            hidden2: self.hidden2,
            dropout: self.dropout,
            bias: self.bias,
            activation1: Activation::Relu,
            activation2: Activation::Identity,
            propagation: self.propagation,
            weight_sharing: self.weight_sharing,
        }
    }

    /// Optimizer part of the configuration.
    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            learning_rate: self.learning_rate,
            margin: self.max_margin,
            weight_decay: self.weight_decay,
            loss: self.loss,
        }
    }
}

/// Which held-out split to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeldOut {
    Validation,
    Test,
}

impl fmt::Display for HeldOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Costs of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Optimizer steps taken.
    pub steps: usize,
    /// Mean training cost per step.
    pub train_cost: f64,
    /// Mean validation cost per step, when tracked.
    pub val_cost: Option<f64>,
    /// Mean test cost per step, when tracked.
    pub test_cost: Option<f64>,
    /// Wall-clock seconds.
    pub seconds: f64,
}

/// Metrics of one relation slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationReport {
    /// Iterator slot.
    pub slot: usize,
    /// Relation of the slot.
    pub relation: RelationType,
    /// Scores on the held-out edges.
    pub metrics: EvaluationMetrics,
}

impl fmt::Display for RelationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Edge type={} AUROC={:.5} AUPRC={:.5} AP@{}={:.5}",
            self.relation, self.metrics.auroc, self.metrics.auprc, self.metrics.k, self.metrics.apk
        )
    }
}

/// Outcome of [`Trainer::train`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Per-epoch costs.
    pub epochs: Vec<EpochSummary>,
    /// Final test metrics per slot.
    pub test: Vec<RelationReport>,
}

impl TrainingReport {
    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Default)]
struct RunningCost {
    sum: f64,
    count: usize,
}

impl RunningCost {
    fn add(&mut self, cost: f32) {
        self.sum += f64::from(cost);
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Owns everything a training run needs.
#[derive(Debug)]
pub struct Trainer {
    config: TrainingConfig,
    graph: GraphData,
    selection: Vec<RelationType>,
    iterator: EdgeMinibatchIterator,
    model: LinkPredictionModel,
    optimizer: LinkOptimizer,
    evaluator: Evaluator,
    epoch: usize,
}

impl Trainer {
    /// Split `selection`, build the model on CPU and register its
    /// parameters with the optimizer.
    pub fn new(graph: GraphData, selection: Vec<RelationType>, config: TrainingConfig) -> Result<Self> {
        Self::with_context(graph, selection, config, ModelContext::cpu())
    }

    /// Like [`new`](Self::new) with an explicit parameter context.
    pub fn with_context(
        graph: GraphData,
        selection: Vec<RelationType>,
        config: TrainingConfig,
        ctx: ModelContext,
    ) -> Result<Self> {
        config.validate()?;
        let iterator = EdgeMinibatchIterator::new(&graph, &selection, config.iterator_config())?;
        let model = LinkPredictionModel::new(
            &graph,
            iterator.train_adjacency(),
            config.encoder_config(),
            ctx,
        )?;
        let optimizer = LinkOptimizer::new(&model, config.optimizer_config())?;
        let evaluator = Evaluator::new(config.apk_k)?;
        tracing::info!(
            slots = selection.len(),
            batches_per_epoch = iterator.batches_per_epoch(),
            parameters = model.context().num_parameters(),
            "trainer ready"
        );
        Ok(Self {
            config,
            graph,
            selection,
            iterator,
            model,
            optimizer,
            evaluator,
            epoch: 0,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphData {
        &self.graph
    }

    pub fn selection(&self) -> &[RelationType] {
        &self.selection
    }

    pub fn iterator(&self) -> &EdgeMinibatchIterator {
        &self.iterator
    }

    pub fn model(&self) -> &LinkPredictionModel {
        &self.model
    }

    /// Completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Run every configured epoch, then score the test splits.
    pub fn train(&mut self) -> Result<TrainingReport> {
        self.train_with_progress(|_| {})
    }

    /// [`train`](Self::train) with a callback after each epoch.
    pub fn train_with_progress(&mut self, mut on_epoch: impl FnMut(&EpochSummary)) -> Result<TrainingReport> {
        let mut epochs = Vec::with_capacity(self.config.epochs);
        for _ in 0..self.config.epochs {
            let summary = self.train_epoch()?;
            on_epoch(&summary);
            epochs.push(summary);
        }

        let test = self.evaluate(HeldOut::Test)?;
        for report in &test {
            tracing::info!(
                relation = %report.relation,
                auroc = report.metrics.auroc,
                auprc = report.metrics.auprc,
                apk = report.metrics.apk,
                "test metrics"
            );
        }
        Ok(TrainingReport { epochs, test })
    }

    /// One pass over every slot's training edges.
    pub fn train_epoch(&mut self) -> Result<EpochSummary> {
        let start = Instant::now();
        self.iterator.shuffle();

        let mut train = RunningCost::default();
        let mut val = RunningCost::default();
        let mut test = RunningCost::default();
        while let Some(batch) = self.iterator.next_minibatch()? {
            let out = self.optimizer.step(&self.model, &batch)?;
            train.add(out.cost);

            if self.config.track_held_out_cost {
                let (v, t) = self.held_out_cost(out.slot)?;
                if let Some(v) = v {
                    val.add(v);
                }
                if let Some(t) = t {
                    test.add(t);
                }
            }
            tracing::debug!(
                epoch = self.epoch + 1,
                step = train.count,
                relation = %out.relation,
                cost = out.cost,
                "train step"
            );
        }
        self.epoch += 1;

        let summary = EpochSummary {
            epoch: self.epoch,
            steps: train.count,
            train_cost: train.mean().unwrap_or(0.0),
            val_cost: val.mean(),
            test_cost: test.mean(),
            seconds: start.elapsed().as_secs_f64(),
        };
        tracing::info!(
            epoch = summary.epoch,
            steps = summary.steps,
            train_cost = summary.train_cost,
            val_cost = ?summary.val_cost,
            test_cost = ?summary.test_cost,
            seconds = summary.seconds,
            "epoch done"
        );

        if let (Some(dir), Some(every)) = (&self.config.checkpoint_dir, self.config.checkpoint_every) {
            if self.epoch % every == 0 {
                self.save_checkpoint(dir)?;
            }
        }
        Ok(summary)
    }

    /// Validation and test cost of one slot in eval mode.
    fn held_out_cost(&self, slot: usize) -> Result<(Option<f32>, Option<f32>)> {
        let Some(slot) = self.iterator.slots().get(slot) else {
            return Err(Error::Configuration(format!("no iterator slot {slot}")));
        };
        let split = slot.split();
        let relation = slot.relation();
        if split.val.is_empty() && split.test.is_empty() {
            return Ok((None, None));
        }
        let embeddings = self.model.embeddings(false)?;
        let cost = |pos: &[Edge], neg: &[Edge]| -> Result<Option<f32>> {
            if pos.is_empty() {
                return Ok(None);
            }
            Ok(Some(self.optimizer.cost(&self.model, &embeddings, &relation, pos, neg)?))
        };
        Ok((
            cost(split.val.as_slice(), split.val_negatives.as_slice())?,
            cost(split.test.as_slice(), split.test_negatives.as_slice())?,
        ))
    }

    /// Score every slot on a held-out split.
    ///
    /// Slots with no held-out edges, or whose labels are one-sided, are
    /// skipped with a warning.
    pub fn evaluate(&self, which: HeldOut) -> Result<Vec<RelationReport>> {
        let embeddings = self.model.embeddings(false)?;
        let mut reports = Vec::new();
        for (idx, slot) in self.iterator.slots().iter().enumerate() {
            let relation = slot.relation();
            let split = slot.split();
            let (positives, negatives) = match which {
                HeldOut::Validation => (&split.val, &split.val_negatives),
                HeldOut::Test => (&split.test, &split.test_negatives),
            };
            if positives.is_empty() {
                tracing::warn!(relation = %relation, split = %which, "no held-out edges, skipping");
                continue;
            }
            let original = self.graph.adjacency(&relation)?;
            match self.evaluator.evaluate(
                &self.model,
                &embeddings,
                &relation,
                positives,
                negatives,
                original,
            ) {
                Ok(metrics) => reports.push(RelationReport {
                    slot: idx,
                    relation,
                    metrics,
                }),
                Err(Error::DegenerateLabels {
                    positives,
                    negatives,
                }) => {
                    tracing::warn!(
                        relation = %relation,
                        positives,
                        negatives,
                        "metrics undefined, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    /// Write a checkpoint for the current epoch under `root`.
    pub fn save_checkpoint(&self, root: impl AsRef<Path>) -> Result<PathBuf> {
        let meta = CheckpointMeta {
            epoch: self.epoch,
            config: self.config.clone(),
            selection: self.selection.clone(),
            num_parameters: self.model.context().num_parameters(),
        };
        checkpoint::save_checkpoint(&self.model, root, &meta)
    }

    /// Restore parameters from a checkpoint directory.
    pub fn load_checkpoint(&mut self, dir: impl AsRef<Path>) -> Result<CheckpointMeta> {
        let meta = checkpoint::load_checkpoint(&mut self.model, dir)?;
        self.epoch = meta.epoch;
        Ok(meta)
    }
}
