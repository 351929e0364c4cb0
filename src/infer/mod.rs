//! Model loading and single-pass inference.
//!
//! Loading walks an ordered `BackendChain`: GPU, then native acceleration, then plain CPU.
//! A backend that cannot start is logged and skipped; only an exhausted chain is an error.

mod backend;
mod backends;
mod engine;
mod model;
mod registry;

pub use backend::{
    Accelerator, AcceleratorPreference, BackendFactory, InputSpec, ModelBackend, TensorLayout,
};
pub use backends::{ConstantBackend, ConstantFactory, UnavailableFactory};
pub use engine::InferenceEngine;
pub use model::ModelAsset;
pub use registry::BackendChain;

#[cfg(feature = "backend-ort")]
pub use backends::{OrtBackend, OrtFactory};
#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, TractFactory};
