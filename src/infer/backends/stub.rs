use crate::error::{AcceleratorUnavailable, BackendInitError, InferenceError};
use crate::infer::backend::{Accelerator, BackendFactory, InputSpec, ModelBackend};
use crate::infer::model::ModelAsset;
use crate::tensor::Tensor;

/// Backend that ignores its input and reports a fixed confidence.
///
/// Used for dry runs without a model runtime and as the model stub in tests.
pub struct ConstantBackend {
    accelerator: Accelerator,
    confidence: f32,
    calls: u64,
}

impl ConstantBackend {
    pub fn new(accelerator: Accelerator, confidence: f32) -> Self {
        Self {
            accelerator,
            confidence,
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl ModelBackend for ConstantBackend {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    fn infer(&mut self, _tensor: &Tensor) -> Result<f32, InferenceError> {
        self.calls += 1;
        Ok(self.confidence)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConstantFactory {
    accelerator: Accelerator,
    confidence: f32,
}

impl ConstantFactory {
    pub fn new(accelerator: Accelerator, confidence: f32) -> Self {
        Self {
            accelerator,
            confidence,
        }
    }
}

impl BackendFactory for ConstantFactory {
    fn name(&self) -> &'static str {
        "constant"
    }

    fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    fn build(
        &self,
        _model: &ModelAsset,
        _input: &InputSpec,
    ) -> Result<Box<dyn ModelBackend>, BackendInitError> {
        Ok(Box::new(ConstantBackend::new(
            self.accelerator,
            self.confidence,
        )))
    }
}

/// Placeholder for an accelerator that cannot be used in this build or on this host.
#[derive(Clone, Debug)]
pub struct UnavailableFactory {
    accelerator: Accelerator,
    reason: String,
}

impl UnavailableFactory {
    pub fn new(accelerator: Accelerator, reason: impl Into<String>) -> Self {
        Self {
            accelerator,
            reason: reason.into(),
        }
    }
}

impl BackendFactory for UnavailableFactory {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    fn build(
        &self,
        _model: &ModelAsset,
        _input: &InputSpec,
    ) -> Result<Box<dyn ModelBackend>, BackendInitError> {
        Err(AcceleratorUnavailable {
            accelerator: self.accelerator,
            reason: self.reason.clone(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_backend_counts_calls() -> anyhow::Result<()> {
        let mut backend = ConstantBackend::new(Accelerator::Cpu, 0.9);
        let tensor = Tensor::zeros([2, 2, 3]);
        assert_eq!(backend.infer(&tensor)?, 0.9);
        assert_eq!(backend.infer(&tensor)?, 0.9);
        assert_eq!(backend.calls(), 2);
        Ok(())
    }

    #[test]
    fn unavailable_factory_reports_its_accelerator() {
        let factory = UnavailableFactory::new(Accelerator::Native, "no npu");
        let input = InputSpec {
            shape: [1, 1, 3],
            layout: Default::default(),
        };
        match factory.build(&ModelAsset::from_bytes("m", vec![0]), &input) {
            Err(BackendInitError::Unavailable(err)) => {
                assert_eq!(err.accelerator, Accelerator::Native);
                assert_eq!(err.reason, "no npu");
            }
            _ => panic!("expected an unavailable error"),
        }
    }
}
