//! Two-layer multi-relational encoder.
//!
//! ```text
//! sparse features ──dropout──> RelationalConv(hidden1, relu)
//!                 ──dropout──> RelationalConv(hidden2, identity) ──> Embeddings
//! ```
//!
//! Dropout is active only for training forward passes.

use candle_core::Tensor;
use candle_nn::VarBuilder;
use hetlink_core::NodeTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::conv::{Activation, NodeInput, RelationalConv, WeightSharing};
use crate::error::{Error, Result};
use crate::graph::{GraphTensors, Propagation};

/// Encoder hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// First layer width.
    pub hidden1: usize,
    /// Embedding width.
    pub hidden2: usize,
    /// Dropout rate on layer inputs during training.
    pub dropout: f32,
    /// Add a per-node-type bias in each layer.
    pub bias: bool,
    /// First layer nonlinearity.
    pub activation1: Activation,
    /// Second layer nonlinearity.
    pub activation2: Activation,
    /// Message directions.
    pub propagation: Propagation,
    /// Transform allocation across relations.
    pub weight_sharing: WeightSharing,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            hidden1: 64,
            hidden2: 32,
            dropout: 0.1,
            bias: true,
            activation1: Activation::Relu,
            activation2: Activation::Identity,
            propagation: Propagation::Bidirectional,
            weight_sharing: WeightSharing::PerRelation,
        }
    }
}

impl EncoderConfig {
    /// Set layer widths.
    pub fn with_hidden(mut self, hidden1: usize, hidden2: usize) -> Self {
        self.hidden1 = hidden1;
        self.hidden2 = hidden2;
        self
    }

    /// Set dropout rate.
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Enable or disable biases.
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Set message directions.
    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Set transform sharing.
    pub fn with_weight_sharing(mut self, sharing: WeightSharing) -> Self {
        self.weight_sharing = sharing;
        self
    }

    /// Set the second layer nonlinearity.
    pub fn with_output_activation(mut self, activation: Activation) -> Self {
        self.activation2 = activation;
        self
    }

    /// Check widths and dropout.
    pub fn validate(&self) -> Result<()> {
        if self.hidden1 == 0 || self.hidden2 == 0 {
            return Err(Error::InvalidConfig(format!(
                "hidden widths must be positive, got {}/{}",
                self.hidden1, self.hidden2
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Per-node-type embedding matrices from one forward pass.
#[derive(Debug, Clone)]
pub struct Embeddings {
    by_type: BTreeMap<NodeTypeId, Tensor>,
}

impl Embeddings {
    /// Wrap precomputed embeddings.
    pub fn new(by_type: BTreeMap<NodeTypeId, Tensor>) -> Self {
        Self { by_type }
    }

    /// `(nodes, dim)` embedding matrix of a node type.
    pub fn get(&self, node_type: NodeTypeId) -> Result<&Tensor> {
        self.by_type
            .get(&node_type)
            .ok_or(Error::MissingNodeType(node_type))
    }

    /// Embedding width.
    pub fn dim(&self) -> Result<usize> {
        match self.by_type.values().next() {
            Some(t) => Ok(t.dim(1)?),
            None => Err(Error::InvalidConfig("no embeddings".into())),
        }
    }

    /// Iterate `(node type, matrix)`.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeTypeId, &Tensor)> {
        self.by_type.iter()
    }

    /// Copies cut off from the autograd graph.
    pub fn detach(&self) -> Self {
        Self {
            by_type: self
                .by_type
                .iter()
                .map(|(t, x)| (*t, x.detach()))
                .collect(),
        }
    }
}

/// Two stacked relational convolutions.
#[derive(Debug, Clone)]
pub struct MultiRelationalEncoder {
    config: EncoderConfig,
    layer1: RelationalConv,
    layer2: RelationalConv,
}

impl MultiRelationalEncoder {
    /// Allocate both layers for the channels in `graph`.
    pub fn new(graph: &GraphTensors, config: EncoderConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let propagation = graph.propagation();
        let layer1 = RelationalConv::new(
            propagation,
            &graph.feature_dims(),
            config.hidden1,
            config.weight_sharing,
            config.bias,
            config.activation1,
            vb.pp("layer1"),
        )?;
        let hidden_dims: BTreeMap<NodeTypeId, usize> =
            graph.node_types().map(|t| (t, config.hidden1)).collect();
        let layer2 = RelationalConv::new(
            propagation,
            &hidden_dims,
            config.hidden2,
            config.weight_sharing,
            config.bias,
            config.activation2,
            vb.pp("layer2"),
        )?;
        tracing::debug!(
            layer1_transforms = layer1.num_transforms(),
            layer2_transforms = layer2.num_transforms(),
            "built encoder"
        );
        Ok(Self {
            config,
            layer1,
            layer2,
        })
    }

    /// Encoder configuration.
    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Embed every node type. `train` enables dropout.
    pub fn forward(&self, graph: &GraphTensors, train: bool) -> Result<Embeddings> {
        let rate = if train { self.config.dropout } else { 0.0 };

        let features = graph
            .node_types()
            .map(|t| Ok((t, graph.features(t)?.dropout(rate)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let inputs: BTreeMap<NodeTypeId, NodeInput> = features
            .iter()
            .map(|(t, f)| (*t, NodeInput::Sparse(f)))
            .collect();
        let hidden = self.layer1.forward(graph.propagation(), &inputs)?;

        let hidden = if rate > 0.0 {
            hidden
                .into_iter()
                .map(|(t, h)| Ok((t, candle_nn::ops::dropout(&h, rate)?)))
                .collect::<Result<BTreeMap<_, _>>>()?
        } else {
            hidden
        };
        let inputs: BTreeMap<NodeTypeId, NodeInput> = hidden
            .iter()
            .map(|(t, h)| (*t, NodeInput::Dense(h)))
            .collect();
        let out = self.layer2.forward(graph.propagation(), &inputs)?;
        Ok(Embeddings::new(out))
    }

    /// Transform matrices of both layers, the target of weight decay.
    pub fn transform_weights(&self) -> Vec<Tensor> {
        self.layer1
            .weights()
            .chain(self.layer2.weights())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ModelContext;
    use hetlink_core::SyntheticGraph;

    fn setup(config: EncoderConfig) -> (ModelContext, GraphTensors, MultiRelationalEncoder) {
        let graph = SyntheticGraph::default()
            .with_node_types(vec![12, 9])
            .generate()
            .unwrap();
        let ctx = ModelContext::cpu();
        let tensors =
            GraphTensors::new(&graph, graph.adjacency_map(), config.propagation, ctx.device())
                .unwrap();
        let encoder = MultiRelationalEncoder::new(&tensors, config, ctx.var_builder()).unwrap();
        (ctx, tensors, encoder)
    }

    #[test]
    fn test_embedding_shapes() {
        let (_ctx, tensors, encoder) = setup(EncoderConfig::default().with_hidden(16, 8));
        let emb = encoder.forward(&tensors, false).unwrap();
        assert_eq!(emb.get(0).unwrap().dims(), &[12, 8]);
        assert_eq!(emb.get(1).unwrap().dims(), &[9, 8]);
        assert_eq!(emb.dim().unwrap(), 8);
        assert!(emb.get(2).is_err());
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let (_ctx, tensors, encoder) = setup(EncoderConfig::default().with_dropout(0.5));
        let a = encoder.forward(&tensors, false).unwrap();
        let b = encoder.forward(&tensors, false).unwrap();
        let diff = (a.get(0).unwrap() - b.get(0).unwrap())
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_parameter_count() {
        // 5 relations x 2 directions = 10 transforms per layer.
        let (ctx, _tensors, encoder) = setup(EncoderConfig::default().with_hidden(4, 2));
        assert_eq!(encoder.transform_weights().len(), 20);
        // Identity features: in-dims 12 and 9.
        let w1: usize = encoder.transform_weights()[..10]
            .iter()
            .map(|w| w.elem_count())
            .sum();
        assert!(w1 > 0);
        let biases = 2 * 4 + 2 * 2;
        let w2 = 10 * 4 * 2;
        assert_eq!(ctx.num_parameters(), w1 + w2 + biases);
    }

    #[test]
    fn test_invalid_config() {
        assert!(EncoderConfig::default().with_dropout(1.0).validate().is_err());
        assert!(EncoderConfig::default().with_hidden(0, 4).validate().is_err());
    }
}
