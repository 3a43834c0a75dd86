//! Explicit model context.
//!
//! One [`ModelContext`] owns the device, dtype and the variable store for a
//! whole model. Every component that allocates parameters takes a
//! [`VarBuilder`] from it, and the optimizer reads the same variables back
//! through [`ModelContext::all_vars`]. There is no global session.

use candle_core::{DType, Device, Var};
use candle_nn::{VarBuilder, VarMap};
use std::path::Path;

use crate::error::Result;

/// Device, dtype and parameter store shared by encoder and decoders.
pub struct ModelContext {
    device: Device,
    dtype: DType,
    varmap: VarMap,
}

impl ModelContext {
    /// CPU context with `f32` parameters.
    pub fn cpu() -> Self {
        Self::new(Device::Cpu, DType::F32)
    }

    /// Context on an arbitrary device.
    pub fn new(device: Device, dtype: DType) -> Self {
        Self {
            device,
            dtype,
            varmap: VarMap::new(),
        }
    }

    /// Device tensors live on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Parameter dtype.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Builder registering new variables in this context.
    pub fn var_builder(&self) -> VarBuilder<'_> {
        VarBuilder::from_varmap(&self.varmap, self.dtype, &self.device)
    }

    /// Underlying variable store.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Every trainable variable.
    pub fn all_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Total scalar parameter count.
    pub fn num_parameters(&self) -> usize {
        self.all_vars().iter().map(|v| v.elem_count()).sum()
    }

    /// Write every variable to a safetensors file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    /// Overwrite already-registered variables from a safetensors file.
    ///
    /// The model must be constructed first so the variable names exist.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.varmap.load(path)?;
        Ok(())
    }
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext")
            .field("device", &self.device)
            .field("dtype", &self.dtype)
            .field("num_parameters", &self.num_parameters())
            .finish()
    }
}
