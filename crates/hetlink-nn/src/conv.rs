//! Multi-relational graph convolution.
//!
//! One [`RelationalConv`] layer computes, for every node type `t`,
//!
//! ```text
//! h_t' = act( sum_{c in channels into t} A_c (x_{src(c)} W_c) + b_t )
//! ```
//!
//! with one transform `W_c` per channel. A channel is a (relation, direction)
//! pair, so a relation contributes up to two transforms per layer. With
//! [`WeightSharing::PerNodeTypePair`] all relations of one node-type pair and
//! direction share a transform instead.
//!
//! Node types that receive no channel get a zero (or bias-only) output.
//! Isolated nodes have empty adjacency rows and receive nothing from that
//! relation.
//!
//! # Reference
//!
//! Zitnik, Agrawal & Leskovec, "Modeling polypharmacy side effects with
//! graph convolutional networks", Bioinformatics 2018. Builds on
//! Schlichtkrull et al., "Modeling Relational Data with Graph Convolutional
//! Networks", ESWC 2018.

use candle_core::{Tensor, D};
use candle_nn::{Init, VarBuilder};
use hetlink_core::NodeTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::graph::{Channel, PropagationGraph};
use crate::sparse::SparseTensor;

/// Nonlinearity applied after aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// `max(0, x)`.
    #[default]
    Relu,
    /// No nonlinearity.
    Identity,
}

impl Activation {
    /// Apply to a tensor.
    pub fn apply(self, x: &Tensor) -> Result<Tensor> {
        Ok(match self {
            Self::Relu => x.relu()?,
            Self::Identity => x.clone(),
        })
    }
}

/// How transforms are allocated across relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSharing {
    /// Independent transform per (relation, direction).
    #[default]
    PerRelation,
    /// One transform per (node-type pair, direction).
    PerNodeTypePair,
}

impl WeightSharing {
    fn key(self, channel: &Channel) -> String {
        match self {
            Self::PerRelation => channel.relation_key(),
            Self::PerNodeTypePair => channel.pair_key(),
        }
    }
}

/// Input to a layer: sparse features or dense activations.
#[derive(Debug, Clone, Copy)]
pub enum NodeInput<'a> {
    /// Sparse input features (first layer).
    Sparse(&'a SparseTensor),
    /// Dense hidden activations.
    Dense(&'a Tensor),
}

impl NodeInput<'_> {
    fn transform(&self, w: &Tensor) -> Result<Tensor> {
        match self {
            Self::Sparse(s) => s.matmul(w),
            Self::Dense(x) => Ok(x.matmul(w)?),
        }
    }

    fn width(&self) -> Result<usize> {
        Ok(match self {
            Self::Sparse(s) => s.cols(),
            Self::Dense(x) => x.dim(D::Minus1)?,
        })
    }
}

/// Glorot-uniform bound for an `(fan_in, fan_out)` weight.
pub fn glorot_bound(fan_in: usize, fan_out: usize) -> f64 {
    (6.0 / (fan_in + fan_out) as f64).sqrt()
}

/// One multi-relational convolution layer.
#[derive(Debug, Clone)]
pub struct RelationalConv {
    weights: BTreeMap<String, Tensor>,
    biases: BTreeMap<NodeTypeId, Tensor>,
    sharing: WeightSharing,
    activation: Activation,
    out_dim: usize,
}

impl RelationalConv {
    /// Allocate transforms for every channel of `graph`.
    ///
    /// `input_dims` gives the input width of each node type.
    pub fn new(
        graph: &PropagationGraph,
        input_dims: &BTreeMap<NodeTypeId, usize>,
        out_dim: usize,
        sharing: WeightSharing,
        bias: bool,
        activation: Activation,
        vb: VarBuilder,
    ) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer width must be positive".into()));
        }
        let mut weights = BTreeMap::new();
        for channel in graph.channels() {
            let key = sharing.key(channel);
            if weights.contains_key(&key) {
                continue;
            }
            let in_dim = *input_dims
                .get(&channel.source)
                .ok_or(Error::MissingNodeType(channel.source))?;
            let bound = glorot_bound(in_dim, out_dim);
            let w = vb.get_with_hints(
                (in_dim, out_dim),
                &key,
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                },
            )?;
            weights.insert(key, w);
        }

        let mut biases = BTreeMap::new();
        if bias {
            for &t in graph.node_counts().keys() {
                let b = vb.get_with_hints(out_dim, &format!("bias_{t}"), Init::Const(0.0))?;
                biases.insert(t, b);
            }
        }

        Ok(Self {
            weights,
            biases,
            sharing,
            activation,
            out_dim,
        })
    }

    /// Output width.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Transform matrices, in name order.
    pub fn weights(&self) -> impl Iterator<Item = &Tensor> {
        self.weights.values()
    }

    /// Number of distinct transforms.
    pub fn num_transforms(&self) -> usize {
        self.weights.len()
    }

    /// Propagate `inputs` along every channel and aggregate per node type.
    pub fn forward(
        &self,
        graph: &PropagationGraph,
        inputs: &BTreeMap<NodeTypeId, NodeInput<'_>>,
    ) -> Result<BTreeMap<NodeTypeId, Tensor>> {
        let mut outputs = BTreeMap::new();
        for (&target, &count) in graph.node_counts() {
            let mut acc: Option<Tensor> = None;
            for channel in graph.channels_into(target) {
                let key = self.sharing.key(channel);
                let w = self.weights.get(&key).ok_or_else(|| {
                    Error::InvalidConfig(format!("layer has no transform named {key}"))
                })?;
                let x = inputs
                    .get(&channel.source)
                    .ok_or(Error::MissingNodeType(channel.source))?;
                let expected = w.dim(0)?;
                let got = x.width()?;
                if expected != got {
                    return Err(Error::DimensionMismatch { expected, got });
                }
                let msg = channel.adjacency.matmul(&x.transform(w)?)?;
                acc = Some(match acc {
                    Some(a) => (a + msg)?,
                    None => msg,
                });
            }

            let h = match acc {
                Some(h) => h,
                None => self.zeros_like_output(count, inputs)?,
            };
            let h = match self.biases.get(&target) {
                Some(b) => h.broadcast_add(b)?,
                None => h,
            };
            outputs.insert(target, self.activation.apply(&h)?);
        }
        Ok(outputs)
    }

    fn zeros_like_output(
        &self,
        count: usize,
        inputs: &BTreeMap<NodeTypeId, NodeInput<'_>>,
    ) -> Result<Tensor> {
        let w = self
            .weights
            .values()
            .next()
            .or_else(|| self.biases.values().next());
        match w {
            Some(w) => Ok(Tensor::zeros((count, self.out_dim), w.dtype(), w.device())?),
            None => {
                let device = match inputs.values().next() {
                    Some(NodeInput::Dense(x)) => x.device().clone(),
                    _ => candle_core::Device::Cpu,
                };
                Ok(Tensor::zeros(
                    (count, self.out_dim),
                    candle_core::DType::F32,
                    &device,
                )?)
            }
        }
    }
}
