//! One gradient step per minibatch.

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use hetlink_core::{Edge, Minibatch, RelationType};
use hetlink_nn::Embeddings;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loss::{l2_penalty, LossKind};
use crate::model::LinkPredictionModel;

/// Optimizer hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Adam step size.
    pub learning_rate: f64,
    /// Hinge margin.
    pub margin: f64,
    /// L2 coefficient on encoder transforms.
    pub weight_decay: f64,
    /// Objective.
    pub loss: LossKind,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            margin: 0.1,
            weight_decay: 0.0,
            loss: LossKind::Hinge,
        }
    }
}

impl OptimizerConfig {
    /// Check step size and coefficients.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::Configuration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        let non_negative = |x: f64| x >= 0.0 && x.is_finite();
        if !(non_negative(self.margin) && non_negative(self.weight_decay)) {
            return Err(Error::Configuration(format!(
                "margin and weight_decay must be non-negative and finite, got {} / {}",
                self.margin, self.weight_decay
            )));
        }
        Ok(())
    }
}

/// Result of one training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutput {
    /// Loss including the L2 penalty.
    pub cost: f32,
    /// Iterator slot of the batch.
    pub slot: usize,
    /// Catalog index of the batch relation.
    pub relation_index: usize,
    /// Relation of the batch.
    pub relation: RelationType,
}

/// Adam over every model parameter plus the configured loss.
pub struct LinkOptimizer {
    config: OptimizerConfig,
    adam: AdamW,
    current: Option<(usize, RelationType)>,
}

impl LinkOptimizer {
    /// Register every variable of `model`.
    pub fn new(model: &LinkPredictionModel, config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        let params = ParamsAdamW {
            lr: config.learning_rate,
            // Decay is applied through the explicit penalty only.
            weight_decay: 0.0,
            ..Default::default()
        };
        let adam = AdamW::new(model.context().all_vars(), params)?;
        Ok(Self {
            config,
            adam,
            current: None,
        })
    }

    /// Hyperparameters.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Catalog index and relation of the latest step.
    pub fn current_relation(&self) -> Option<(usize, RelationType)> {
        self.current
    }

    /// Objective for one set of scores, penalty included.
    fn objective(&self, model: &LinkPredictionModel, pos: &Tensor, neg: &Tensor) -> Result<Tensor> {
        let loss = self.config.loss.compute(pos, neg, self.config.margin)?;
        match l2_penalty(&model.regularized_weights(), self.config.weight_decay)? {
            Some(penalty) => Ok(loss.add(&penalty)?),
            None => Ok(loss),
        }
    }

    /// Forward with dropout, backpropagate, update.
    pub fn step(&mut self, model: &LinkPredictionModel, batch: &Minibatch) -> Result<StepOutput> {
        let embeddings = model.embeddings(true)?;
        let pos = model.score_edges(&embeddings, &batch.relation, &batch.positives)?;
        let neg = model.score_edges(&embeddings, &batch.relation, &batch.negatives)?;
        let loss = self.objective(model, &pos, &neg)?;
        self.adam.backward_step(&loss)?;

        self.current = Some((batch.relation_index, batch.relation));
        let cost = loss.to_dtype(candle_core::DType::F32)?.to_scalar::<f32>()?;
        tracing::trace!(relation = %batch.relation, batch = batch.len(), cost, "step");
        Ok(StepOutput {
            cost,
            slot: batch.slot,
            relation_index: batch.relation_index,
            relation: batch.relation,
        })
    }

    /// Loss of `positives` against `negatives` without updating anything.
    ///
    /// `embeddings` should come from an eval-mode forward pass.
    pub fn cost(
        &self,
        model: &LinkPredictionModel,
        embeddings: &Embeddings,
        relation: &RelationType,
        positives: &[Edge],
        negatives: &[Edge],
    ) -> Result<f32> {
        let pos = model.score_edges(embeddings, relation, positives)?;
        let neg = model.score_edges(embeddings, relation, negatives)?;
        let loss = self.objective(model, &pos, &neg)?;
        Ok(loss.to_dtype(candle_core::DType::F32)?.to_scalar::<f32>()?)
    }
}

impl std::fmt::Debug for LinkOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkOptimizer")
            .field("config", &self.config)
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hetlink_core::{EdgeMinibatchIterator, IteratorConfig, SyntheticGraph};
    use hetlink_nn::{EncoderConfig, ModelContext};

    #[test]
    fn test_steps_reduce_cost() {
        let graph = SyntheticGraph::default()
            .with_node_types(vec![20, 16])
            .generate()
            .unwrap();
        let selection = graph.catalog().relation_types();
        let mut iter = EdgeMinibatchIterator::new(
            &graph,
            &selection,
            IteratorConfig::default().with_batch_size(1_000),
        )
        .unwrap();
        let model = LinkPredictionModel::new(
            &graph,
            iter.train_adjacency(),
            EncoderConfig::default().with_hidden(16, 8).with_dropout(0.0),
            ModelContext::cpu(),
        )
        .unwrap();
        let config = OptimizerConfig {
            learning_rate: 0.01,
            margin: 1.0,
            ..Default::default()
        };
        let mut opt = LinkOptimizer::new(&model, config).unwrap();

        // One full-batch step per relation and epoch; the same batch is
        // replayed, so the hinge cost on it must fall.
        let batch = iter.next_minibatch().unwrap().unwrap();
        let first = opt.step(&model, &batch).unwrap();
        assert_eq!(first.relation_index, batch.relation_index);
        let mut last = first.cost;
        for _ in 0..30 {
            last = opt.step(&model, &batch).unwrap().cost;
        }
        assert!(last < first.cost, "{last} !< {}", first.cost);
    }

    #[test]
    fn test_cost_is_side_effect_free() {
        let graph = SyntheticGraph::default().generate().unwrap();
        let model = LinkPredictionModel::new(
            &graph,
            graph.adjacency_map(),
            EncoderConfig::default().with_hidden(8, 4),
            ModelContext::cpu(),
        )
        .unwrap();
        let opt = LinkOptimizer::new(&model, OptimizerConfig::default()).unwrap();
        let emb = model.embeddings(false).unwrap();
        let rel = RelationType::new(0, 1, 0);
        let a = opt.cost(&model, &emb, &rel, &[(0, 0)], &[(1, 1)]).unwrap();
        let b = opt.cost(&model, &emb, &rel, &[(0, 0)], &[(1, 1)]).unwrap();
        assert_eq!(a, b);
        assert!(opt.current_relation().is_none());
    }

    #[test]
    fn test_invalid_config() {
        let bad = OptimizerConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        for (margin, weight_decay) in [(f64::NAN, 0.0), (0.1, f64::NAN), (-0.1, 0.0), (0.1, f64::INFINITY)] {
            let bad = OptimizerConfig {
                margin,
                weight_decay,
                ..Default::default()
            };
            assert!(bad.validate().is_err(), "{margin} / {weight_decay}");
        }
    }

    #[test]
    fn test_current_relation_is_catalog_index() {
        let graph = SyntheticGraph::default().generate().unwrap();
        let catalog = graph.catalog().clone();
        let rel = RelationType::new(1, 1, 0);
        let mut iter =
            EdgeMinibatchIterator::new(&graph, &[rel], IteratorConfig::default()).unwrap();
        let model = LinkPredictionModel::new(
            &graph,
            iter.train_adjacency(),
            EncoderConfig::default().with_hidden(8, 4),
            ModelContext::cpu(),
        )
        .unwrap();
        let mut opt = LinkOptimizer::new(&model, OptimizerConfig::default()).unwrap();

        let batch = iter.next_minibatch().unwrap().unwrap();
        let out = opt.step(&model, &batch).unwrap();
        let index = catalog.relation_index(&rel).unwrap();
        assert_ne!(index, batch.slot);
        assert_eq!(out.relation_index, index);
        assert_eq!(opt.current_relation(), Some((index, rel)));
    }
}
