//! Encoder plus decoder bank behind one parameter store.

use candle_core::Tensor;
use hetlink_core::{Edge, GraphData, RelationCatalog, RelationType, SparseMatrix};
use hetlink_nn::{EncoderConfig, Embeddings, GraphTensors, ModelContext, MultiRelationalEncoder};
use std::collections::BTreeMap;

use crate::decoder::{Decoder, DecoderBank};
use crate::error::Result;

/// Link prediction model: encoder, decoders and the context holding their
/// parameters.
#[derive(Debug)]
pub struct LinkPredictionModel {
    ctx: ModelContext,
    catalog: RelationCatalog,
    tensors: GraphTensors,
    encoder: MultiRelationalEncoder,
    decoders: DecoderBank,
}

impl LinkPredictionModel {
    /// Build a model over `graph` whose message passing uses
    /// `train_adjacency` (held-out edges removed).
    pub fn new(
        graph: &GraphData,
        train_adjacency: &BTreeMap<RelationType, SparseMatrix>,
        config: EncoderConfig,
        ctx: ModelContext,
    ) -> Result<Self> {
        let tensors = GraphTensors::new(graph, train_adjacency, config.propagation, ctx.device())?;
        let hidden2 = config.hidden2;
        let (encoder, decoders) = {
            let vb = ctx.var_builder();
            let encoder = MultiRelationalEncoder::new(&tensors, config, vb.pp("encoder"))?;
            let decoders = DecoderBank::new(graph.catalog(), hidden2, vb.pp("decoder"))?;
            (encoder, decoders)
        };
        tracing::info!(
            relations = graph.catalog().num_relation_types(),
            parameters = ctx.num_parameters(),
            "built link prediction model"
        );
        Ok(Self {
            catalog: graph.catalog().clone(),
            ctx,
            tensors,
            encoder,
            decoders,
        })
    }

    /// Parameter context.
    pub fn context(&self) -> &ModelContext {
        &self.ctx
    }

    /// Mutable parameter context, used to restore checkpoints.
    pub fn context_mut(&mut self) -> &mut ModelContext {
        &mut self.ctx
    }

    /// Relation catalog the model was built for.
    pub fn catalog(&self) -> &RelationCatalog {
        &self.catalog
    }

    /// Encoder.
    pub fn encoder(&self) -> &MultiRelationalEncoder {
        &self.encoder
    }

    /// Decoder of one relation.
    pub fn decoder(&self, relation: &RelationType) -> Result<&Decoder> {
        self.decoders.get(relation)
    }

    /// Forward the encoder. `train` enables dropout.
    pub fn embeddings(&self, train: bool) -> Result<Embeddings> {
        Ok(self.encoder.forward(&self.tensors, train)?)
    }

    /// Raw scores of `edges` under `relation`.
    pub fn score_edges(
        &self,
        embeddings: &Embeddings,
        relation: &RelationType,
        edges: &[Edge],
    ) -> Result<Tensor> {
        self.decoders.score_edges(embeddings, relation, edges)
    }

    /// Dense `(rows, cols)` raw score matrix of `relation` in eval mode.
    pub fn predictions(&self, relation: &RelationType) -> Result<Tensor> {
        let embeddings = self.embeddings(false)?;
        let decoder = self.decoders.get(relation)?;
        decoder.score_matrix(embeddings.get(relation.row)?, embeddings.get(relation.col)?)
    }

    /// Weights subject to the L2 penalty.
    pub fn regularized_weights(&self) -> Vec<Tensor> {
        self.encoder.transform_weights()
    }
}
