//! Error taxonomy for the pipeline.
//!
//! Only `ModelLoadError` is fatal, and only for readiness: the host process keeps running with
//! the pipeline parked in its "not ready" state. Everything else is contained where it occurs.

use thiserror::Error;

use crate::infer::Accelerator;

/// An optional accelerator could not be used. Triggers fallback, never surfaced to the user.
#[derive(Debug, Clone, Error)]
#[error("{accelerator} accelerator unavailable: {reason}")]
pub struct AcceleratorUnavailable {
    pub accelerator: Accelerator,
    pub reason: String,
}

/// Typed outcome of a single backend construction attempt.
#[derive(Debug, Clone, Error)]
pub enum BackendInitError {
    #[error(transparent)]
    Unavailable(#[from] AcceleratorUnavailable),
    #[error("{backend} rejected the model: {reason}")]
    Rejected {
        backend: &'static str,
        reason: String,
    },
}

/// No usable engine after exhausting the fallback chain.
#[derive(Debug, Clone, Error)]
pub enum ModelLoadError {
    #[error("model asset is empty")]
    Empty,
    #[error("failed to read model asset {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("no backend could load the model ({})", summarize(.attempts))]
    Exhausted { attempts: Vec<BackendInitError> },
}

fn summarize(attempts: &[BackendInitError]) -> String {
    if attempts.is_empty() {
        return "no backends compiled in".to_string();
    }
    attempts
        .iter()
        .map(|attempt| attempt.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-frame conversion failure. The frame is dropped, the pipeline continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("frame dimensions {width}x{height} must be even and non-zero")]
    Dimensions { width: u32, height: u32 },
    #[error("plane {plane} too short: needs {needed} bytes, has {available}")]
    PlaneTooShort {
        plane: usize,
        needed: usize,
        available: usize,
    },
    #[error("plane {plane} row stride {row_stride} smaller than row extent {extent}")]
    Stride {
        plane: usize,
        row_stride: usize,
        extent: usize,
    },
}

/// Per-frame inference failure. The frame is dropped, the pipeline continues.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("tensor shape {actual:?} does not match model input {expected:?}")]
    Shape {
        expected: [usize; 3],
        actual: [usize; 3],
    },
    #[error("model produced no output")]
    EmptyOutput,
    #[error("model produced a non-finite confidence")]
    NonFinite,
    #[error("{backend} inference failed: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },
}

/// Everything that can move a frame to the `Failed` state.
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("frame cancelled during teardown")]
    Cancelled,
}

/// Camera binding failure. The pipeline degrades to "no preview" instead of terminating.
#[derive(Debug, Clone, Error)]
#[error("failed to bind camera {device}: {reason}")]
pub struct ResourceBindError {
    pub device: String,
    pub reason: String,
}

/// A bound camera failed to deliver a frame. The driver retries, then reconnects.
#[derive(Debug, Clone, Error)]
#[error("capture from {device} failed: {reason}")]
pub struct CaptureError {
    pub device: String,
    pub reason: String,
}

/// Audio output failure. Alerts are best effort; callers log and continue.
#[derive(Debug, Clone, Error)]
pub enum AudioError {
    #[error("audio device error: {0}")]
    Device(String),
    #[error("invalid tone: {0}")]
    Tone(String),
}
