//! Model checkpoints on disk.
//!
//! Layout:
//!
//! ```text
//! <root>/ep<N>/model.safetensors   every encoder and decoder parameter
//! <root>/ep<N>/meta.json           epoch, configuration, relation selection
//! ```
//!
//! Optimizer moments are not stored; a restored model is meant for scoring.

use hetlink_core::RelationType;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::LinkPredictionModel;
use crate::training::TrainingConfig;

/// Parameter file name inside a checkpoint directory.
pub const MODEL_FILE: &str = "model.safetensors";
/// Metadata file name inside a checkpoint directory.
pub const META_FILE: &str = "meta.json";

/// Metadata written next to the parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Completed epochs.
    pub epoch: usize,
    /// Configuration the model was trained with.
    pub config: TrainingConfig,
    /// Relation selection of the iterator.
    pub selection: Vec<RelationType>,
    /// Scalar parameter count, checked on load.
    pub num_parameters: usize,
}

/// `<root>/ep<epoch>`.
pub fn checkpoint_dir_for_epoch(root: impl AsRef<Path>, epoch: usize) -> PathBuf {
    root.as_ref().join(format!("ep{epoch}"))
}

/// Write parameters and metadata into `<root>/ep<meta.epoch>`.
pub fn save_checkpoint(
    model: &LinkPredictionModel,
    root: impl AsRef<Path>,
    meta: &CheckpointMeta,
) -> Result<PathBuf> {
    let dir = checkpoint_dir_for_epoch(root, meta.epoch);
    fs::create_dir_all(&dir)?;
    model.context().save(dir.join(MODEL_FILE))?;
    fs::write(dir.join(META_FILE), serde_json::to_string_pretty(meta)?)?;
    tracing::info!(path = %dir.display(), epoch = meta.epoch, "saved checkpoint");
    Ok(dir)
}

/// Read the metadata of a checkpoint directory.
pub fn read_checkpoint_meta(dir: impl AsRef<Path>) -> Result<CheckpointMeta> {
    let json = fs::read_to_string(dir.as_ref().join(META_FILE))?;
    Ok(serde_json::from_str(&json)?)
}

/// Restore parameters of an already constructed `model` from `dir`.
///
/// The model must have been built with the same graph catalog and encoder
/// configuration as the one that was saved.
pub fn load_checkpoint(model: &mut LinkPredictionModel, dir: impl AsRef<Path>) -> Result<CheckpointMeta> {
    let dir = dir.as_ref();
    let meta = read_checkpoint_meta(dir)?;
    let have = model.context().num_parameters();
    if have != meta.num_parameters {
        return Err(Error::Configuration(format!(
            "checkpoint {} holds {} parameters, model has {have}",
            dir.display(),
            meta.num_parameters
        )));
    }
    model.context_mut().load(dir.join(MODEL_FILE))?;
    tracing::info!(path = %dir.display(), epoch = meta.epoch, "loaded checkpoint");
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hetlink_core::SyntheticGraph;
    use hetlink_nn::{EncoderConfig, ModelContext};

    fn model(hidden: usize) -> LinkPredictionModel {
        let graph = SyntheticGraph::default().generate().unwrap();
        LinkPredictionModel::new(
            &graph,
            graph.adjacency_map(),
            EncoderConfig::default().with_hidden(8, hidden),
            ModelContext::cpu(),
        )
        .unwrap()
    }

    fn meta(model: &LinkPredictionModel, epoch: usize) -> CheckpointMeta {
        CheckpointMeta {
            epoch,
            config: TrainingConfig::default(),
            selection: vec![RelationType::new(0, 1, 0)],
            num_parameters: model.context().num_parameters(),
        }
    }

    #[test]
    fn test_dir_layout() {
        assert_eq!(
            checkpoint_dir_for_epoch("/tmp/run", 10),
            PathBuf::from("/tmp/run/ep10")
        );
    }

    #[test]
    fn test_round_trip_restores_predictions() {
        let tmp = tempfile::tempdir().unwrap();
        let saved = model(4);
        let dir = save_checkpoint(&saved, tmp.path(), &meta(&saved, 3)).unwrap();
        assert!(dir.join(MODEL_FILE).exists());
        assert!(dir.join(META_FILE).exists());

        let mut restored = model(4);
        let m = load_checkpoint(&mut restored, &dir).unwrap();
        assert_eq!(m.epoch, 3);
        assert_eq!(m.selection, vec![RelationType::new(0, 1, 0)]);

        let rel = RelationType::new(1, 1, 1);
        let a = saved.predictions(&rel).unwrap().to_vec2::<f32>().unwrap();
        let b = restored.predictions(&rel).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let saved = model(4);
        let dir = save_checkpoint(&saved, tmp.path(), &meta(&saved, 1)).unwrap();
        let mut other = model(6);
        assert!(matches!(
            load_checkpoint(&mut other, &dir),
            Err(Error::Configuration(_))
        ));
    }
}
