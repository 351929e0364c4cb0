use crate::error::{InferenceError, ModelLoadError};
use crate::infer::backend::{Accelerator, AcceleratorPreference, InputSpec, ModelBackend};
use crate::infer::model::ModelAsset;
use crate::infer::registry::BackendChain;
use crate::tensor::Tensor;

/// A loaded model bound to the first backend of the chain that accepted it.
///
/// Owned by the worker thread. `infer` takes `&mut self`, so calls are serialized by
/// construction.
pub struct InferenceEngine {
    backend: Box<dyn ModelBackend>,
    input: InputSpec,
}

impl InferenceEngine {
    /// Load with the compiled-in backends, starting the fallback chain at `preference`.
    pub fn load(
        model: &ModelAsset,
        preference: AcceleratorPreference,
        input: InputSpec,
    ) -> Result<Self, ModelLoadError> {
        Self::load_with(model, &BackendChain::for_preference(preference), input)
    }

    pub fn load_with(
        model: &ModelAsset,
        chain: &BackendChain,
        input: InputSpec,
    ) -> Result<Self, ModelLoadError> {
        let backend = chain.build(model, &input)?;
        Ok(Self { backend, input })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn accelerator(&self) -> Accelerator {
        self.backend.accelerator()
    }

    pub fn input(&self) -> &InputSpec {
        &self.input
    }

    /// One forward pass. Returns a confidence in `[0, 1]`.
    pub fn infer(&mut self, tensor: &Tensor) -> Result<f32, InferenceError> {
        if tensor.shape() != self.input.shape {
            return Err(InferenceError::Shape {
                expected: self.input.shape,
                actual: tensor.shape(),
            });
        }
        let raw = self.backend.infer(tensor)?;
        if raw.is_nan() {
            return Err(InferenceError::NonFinite);
        }
        Ok(raw.clamp(0.0, 1.0))
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("backend", &self.backend.name())
            .field("accelerator", &self.backend.accelerator())
            .field("input", &self.input)
            .finish()
    }
}
