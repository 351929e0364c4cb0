#![cfg(feature = "backend-ort")]

use ort::execution_providers::{
    CUDAExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
    XNNPACKExecutionProvider,
};
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{AcceleratorUnavailable, BackendInitError, InferenceError};
use crate::infer::backend::{Accelerator, BackendFactory, InputSpec, ModelBackend};
use crate::infer::model::ModelAsset;
use crate::tensor::Tensor;

/// ONNX Runtime session pinned to one execution provider.
pub struct OrtBackend {
    session: Session,
    output_name: String,
    accelerator: Accelerator,
    input: InputSpec,
}

impl ModelBackend for OrtBackend {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    fn infer(&mut self, tensor: &Tensor) -> Result<f32, InferenceError> {
        let shape = self.input.layout.batch_shape(tensor.shape());
        let array = ndarray::Array4::from_shape_vec(
            (shape[0], shape[1], shape[2], shape[3]),
            self.input.layout.flatten(tensor),
        )
        .map_err(|err| backend_err(err.to_string()))?;
        let input = TensorRef::from_array_view(array.view())
            .map_err(|err| backend_err(format!("failed to create tensor ref: {}", err)))?;
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|err| backend_err(err.to_string()))?;
        let scores = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|err| backend_err(format!("output tensor was not f32: {}", err)))?;
        scores.iter().next().copied().ok_or(InferenceError::EmptyOutput)
    }
}

/// Builds ONNX Runtime sessions. GPU maps to the CUDA provider, native to XNNPACK.
#[derive(Clone, Copy, Debug)]
pub struct OrtFactory {
    accelerator: Accelerator,
}

impl OrtFactory {
    pub fn gpu() -> Self {
        Self {
            accelerator: Accelerator::Gpu,
        }
    }

    pub fn native() -> Self {
        Self {
            accelerator: Accelerator::Native,
        }
    }

    pub fn cpu() -> Self {
        Self {
            accelerator: Accelerator::Cpu,
        }
    }

    fn provider(&self) -> Result<Option<ExecutionProviderDispatch>, AcceleratorUnavailable> {
        let (available, dispatch) = match self.accelerator {
            Accelerator::Gpu => {
                let ep = CUDAExecutionProvider::default();
                (ep.is_available(), ep.build())
            }
            Accelerator::Native => {
                let ep = XNNPACKExecutionProvider::default();
                (ep.is_available(), ep.build())
            }
            Accelerator::Cpu => return Ok(None),
        };
        match available {
            Ok(true) => Ok(Some(dispatch.error_on_failure())),
            Ok(false) => Err(self.unavailable("execution provider not present in runtime")),
            Err(err) => Err(self.unavailable(err.to_string())),
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> AcceleratorUnavailable {
        AcceleratorUnavailable {
            accelerator: self.accelerator,
            reason: reason.into(),
        }
    }
}

impl BackendFactory for OrtFactory {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    fn build(
        &self,
        model: &ModelAsset,
        input: &InputSpec,
    ) -> Result<Box<dyn ModelBackend>, BackendInitError> {
        let mut builder = Session::builder().map_err(|err| self.unavailable(err.to_string()))?;
        if let Some(provider) = self.provider()? {
            // Registration failure means the provider cannot run here, not that the model is bad.
            builder = builder
                .with_execution_providers([provider])
                .map_err(|err| self.unavailable(err.to_string()))?;
        }
        let session = builder
            .commit_from_memory(model.as_bytes())
            .map_err(|err| BackendInitError::Rejected {
                backend: "onnxruntime",
                reason: err.to_string(),
            })?;
        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or(BackendInitError::Rejected {
                backend: "onnxruntime",
                reason: "model declares no outputs".to_string(),
            })?;
        Ok(Box::new(OrtBackend {
            session,
            output_name,
            accelerator: self.accelerator,
            input: *input,
        }))
    }
}

fn backend_err(reason: String) -> InferenceError {
    InferenceError::Backend {
        backend: "onnxruntime",
        reason,
    }
}
