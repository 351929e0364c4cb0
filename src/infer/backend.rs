use std::fmt;

use crate::error::{BackendInitError, InferenceError};
use crate::infer::model::ModelAsset;
use crate::tensor::Tensor;

/// Execution path a backend runs on, in fallback order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Accelerator {
    /// Discrete or integrated GPU.
    Gpu,
    /// Platform-native acceleration API (NPU, SIMD kernels).
    Native,
    /// Plain execution. Always the last resort.
    Cpu,
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Accelerator::Gpu => "gpu",
            Accelerator::Native => "native",
            Accelerator::Cpu => "cpu",
        })
    }
}

/// Where the fallback chain starts. Every preference ends at `Accelerator::Cpu`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcceleratorPreference {
    #[default]
    Auto,
    Gpu,
    Native,
    Cpu,
}

impl AcceleratorPreference {
    pub fn chain(self) -> &'static [Accelerator] {
        match self {
            AcceleratorPreference::Auto | AcceleratorPreference::Gpu => {
                &[Accelerator::Gpu, Accelerator::Native, Accelerator::Cpu]
            }
            AcceleratorPreference::Native => &[Accelerator::Native, Accelerator::Cpu],
            AcceleratorPreference::Cpu => &[Accelerator::Cpu],
        }
    }
}

impl std::str::FromStr for AcceleratorPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(AcceleratorPreference::Auto),
            "gpu" | "cuda" => Ok(AcceleratorPreference::Gpu),
            "native" | "npu" => Ok(AcceleratorPreference::Native),
            "cpu" => Ok(AcceleratorPreference::Cpu),
            other => Err(format!("unknown accelerator '{}'", other)),
        }
    }
}

/// Memory order the model expects for its single input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, height, width, channels]`, the order `Tensor` is stored in.
    #[default]
    Nhwc,
    /// `[1, channels, height, width]`.
    Nchw,
}

impl TensorLayout {
    pub fn batch_shape(self, shape: [usize; 3]) -> [usize; 4] {
        let [h, w, c] = shape;
        match self {
            TensorLayout::Nhwc => [1, h, w, c],
            TensorLayout::Nchw => [1, c, h, w],
        }
    }

    /// Copy `tensor` into a flat buffer in this layout.
    pub fn flatten(self, tensor: &Tensor) -> Vec<f32> {
        match self {
            TensorLayout::Nhwc => tensor.as_slice().to_vec(),
            TensorLayout::Nchw => {
                let [h, w, c] = tensor.shape();
                let mut out = Vec::with_capacity(h * w * c);
                for ch in 0..c {
                    for y in 0..h {
                        for x in 0..w {
                            out.push(tensor.get(y, x, ch));
                        }
                    }
                }
                out
            }
        }
    }
}

impl std::str::FromStr for TensorLayout {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout '{}'", other)),
        }
    }
}

/// Model input contract handed to every factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSpec {
    /// Height, width, channels.
    pub shape: [usize; 3],
    pub layout: TensorLayout,
}

/// A loaded model bound to one execution path.
///
/// Backends are driven from a single worker thread and are never called concurrently; `Send`
/// is enough.
pub trait ModelBackend: Send {
    fn name(&self) -> &'static str;

    fn accelerator(&self) -> Accelerator;

    /// Run one forward pass and return the raw first output value.
    ///
    /// The engine validates the tensor shape before calling and range-checks the result after.
    fn infer(&mut self, tensor: &Tensor) -> Result<f32, InferenceError>;
}

/// One entry of the fallback chain.
///
/// `build` reports a missing accelerator as `BackendInitError::Unavailable` and a model the
/// backend cannot load as `BackendInitError::Rejected`. Both move the chain to the next factory.
pub trait BackendFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn accelerator(&self) -> Accelerator;

    fn build(
        &self,
        model: &ModelAsset,
        input: &InputSpec,
    ) -> Result<Box<dyn ModelBackend>, BackendInitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preference_ends_at_cpu() {
        for pref in [
            AcceleratorPreference::Auto,
            AcceleratorPreference::Gpu,
            AcceleratorPreference::Native,
            AcceleratorPreference::Cpu,
        ] {
            assert_eq!(pref.chain().last(), Some(&Accelerator::Cpu));
        }
        assert_eq!(AcceleratorPreference::Auto.chain().len(), 3);
    }

    #[test]
    fn parses_preferences() {
        assert_eq!("GPU".parse(), Ok(AcceleratorPreference::Gpu));
        assert_eq!("native".parse(), Ok(AcceleratorPreference::Native));
        assert!("tpu".parse::<AcceleratorPreference>().is_err());
    }

    #[test]
    fn nchw_flatten_is_channel_major() {
        // 1x2 image, 3 channels: pixel a = (1,2,3), pixel b = (4,5,6).
        let tensor = Tensor::from_vec([1, 2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(
            TensorLayout::Nchw.flatten(&tensor),
            vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
        );
        assert_eq!(TensorLayout::Nchw.batch_shape([1, 2, 3]), [1, 3, 1, 2]);
        assert_eq!(TensorLayout::Nhwc.flatten(&tensor), tensor.as_slice());
    }
}
