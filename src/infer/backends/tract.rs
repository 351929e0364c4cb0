#![cfg(feature = "backend-tract")]

use std::io::Cursor;

use tract_onnx::prelude::*;

use crate::error::{BackendInitError, InferenceError};
use crate::infer::backend::{Accelerator, BackendFactory, InputSpec, ModelBackend};
use crate::infer::model::ModelAsset;
use crate::tensor::Tensor as InputTensor;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Pure-Rust ONNX execution on the CPU. The universal fallback.
pub struct TractBackend {
    plan: Plan,
    input: InputSpec,
}

impl TractBackend {
    /// Parse, type and optimize the model for a fixed batch-of-one input.
    pub fn load(model: &ModelAsset, input: &InputSpec) -> Result<Self, BackendInitError> {
        let shape = input.layout.batch_shape(input.shape);
        let mut reader = Cursor::new(model.as_bytes());
        let plan = tract_onnx::onnx()
            .model_for_read(&mut reader)
            .map_err(rejected)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(
                shape[0], shape[1], shape[2], shape[3]
            )))
            .map_err(rejected)?
            .into_optimized()
            .map_err(rejected)?
            .into_runnable()
            .map_err(rejected)?;
        Ok(Self {
            plan,
            input: *input,
        })
    }

    fn build_input(&self, tensor: &InputTensor) -> Result<Tensor, InferenceError> {
        let shape = self.input.layout.batch_shape(tensor.shape());
        let data = self.input.layout.flatten(tensor);
        tract_ndarray::Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), data)
            .map(|array| array.into_tensor())
            .map_err(|err| backend_err(err.to_string()))
    }
}

impl ModelBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn accelerator(&self) -> Accelerator {
        Accelerator::Cpu
    }

    fn infer(&mut self, tensor: &InputTensor) -> Result<f32, InferenceError> {
        let input = self.build_input(tensor)?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|err| backend_err(err.to_string()))?;
        let output = outputs.first().ok_or(InferenceError::EmptyOutput)?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|err| backend_err(format!("output tensor was not f32: {}", err)))?;
        scores.iter().next().copied().ok_or(InferenceError::EmptyOutput)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TractFactory;

impl BackendFactory for TractFactory {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn accelerator(&self) -> Accelerator {
        Accelerator::Cpu
    }

    fn build(
        &self,
        model: &ModelAsset,
        input: &InputSpec,
    ) -> Result<Box<dyn ModelBackend>, BackendInitError> {
        Ok(Box::new(TractBackend::load(model, input)?))
    }
}

fn rejected(err: impl std::fmt::Display) -> BackendInitError {
    BackendInitError::Rejected {
        backend: "tract",
        reason: err.to_string(),
    }
}

fn backend_err(reason: String) -> InferenceError {
    InferenceError::Backend {
        backend: "tract",
        reason,
    }
}
