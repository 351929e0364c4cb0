//! Leafwatch
//!
//! Real-time visual inspection: a camera streams 4:2:0 frames, a paced subset is converted to
//! RGB, cropped and normalized into a tensor, and classified by a single-output model. Each
//! result is published to the presentation layer as label text plus confidence, and a
//! high-confidence positive can sound an audible alert.
//!
//! # Execution contexts
//!
//! 1. **Camera**: `ingest::CameraDriver` pulls frames and offers each to the gate. Never blocks
//!    on inference.
//! 2. **Worker**: one thread owned by `scheduler::PipelineScheduler`. Loads the model, then
//!    processes at most one frame at a time.
//! 3. **UI**: the owner of `scheduler::UiState`, which applies published results to a
//!    `DisplayState` snapshot.
//!
//! # Module Structure
//!
//! - `frame`: frame buffers, pooling, planes, RGB raster
//! - `convert`: YUV 4:2:0 to RGB (`ColorspaceConverter`)
//! - `pacer`: minimum inter-inference interval (`FramePacer`)
//! - `preprocess`, `tensor`: centre crop, resize, normalization
//! - `infer`: model asset, backend fallback chain, `InferenceEngine`
//! - `alert`: tone synthesis and playback (`AlertSignal`)
//! - `scheduler`: gate, worker, result publication
//! - `ingest`: camera sources
//! - `pipeline`, `config`: runtime assembly for the daemon

pub mod alert;
pub mod config;
pub mod convert;
pub mod error;
pub mod frame;
pub mod infer;
pub mod ingest;
pub mod pacer;
pub mod pipeline;
pub mod preprocess;
pub mod scheduler;
pub mod tensor;

pub use alert::{AlertSignal, AudioOutput, NullAudioOutput, Playback, ToneRequest};
pub use config::LeafwatchConfig;
pub use convert::{ColorspaceConverter, YuvMatrix};
pub use error::{
    AcceleratorUnavailable, AudioError, BackendInitError, CaptureError, ConversionError,
    FrameError, InferenceError, ModelLoadError, ResourceBindError,
};
pub use frame::{FramePool, Plane, PlaneLayout, PooledBuffer, RawFrame, RgbBuffer};
pub use infer::{
    Accelerator, AcceleratorPreference, BackendChain, InferenceEngine, InputSpec, ModelAsset,
    TensorLayout,
};
pub use ingest::{open_source, CameraConfig, CameraDriver, CameraSource, SyntheticCamera};
pub use pacer::FramePacer;
pub use pipeline::Pipeline;
pub use preprocess::{PreprocessSettings, Preprocessor};
pub use scheduler::{
    ui_channel, AlertToggle, DisplayState, DropReason, FrameDisposition, FrameGate, FrameState,
    InferenceResult, Label, Labels, PipelineScheduler, SchedulerSettings, StatsSnapshot, UiEvent,
    UiSink, UiState,
};
pub use tensor::Tensor;
