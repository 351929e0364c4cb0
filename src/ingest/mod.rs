//! Camera sources.
//!
//! - Synthetic source for `stub://` device strings (tests, headless dry runs)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources fill buffers checked out of a `FramePool` and wrap them in `RawFrame`s. Pixel
//! content is never logged or written anywhere by this layer.

mod driver;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use driver::CameraDriver;
pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

use crate::error::{CaptureError, ResourceBindError};
use crate::frame::{FramePool, RawFrame};

pub const STUB_PREFIX: &str = "stub://";

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0"), or `stub://name` for the synthetic source.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Frame buffers shared between the source and the pipeline.
    pub buffers: usize,
    /// Delivery rate of the synthetic source. Devices run at their own cadence.
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            buffers: 4,
            fps: 30,
        }
    }
}

impl CameraConfig {
    pub fn is_synthetic(&self) -> bool {
        self.device.starts_with(STUB_PREFIX)
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub device: String,
    pub frames_captured: u64,
    /// Captures skipped because every pool buffer was still held downstream.
    pub stalls: u64,
}

/// Camera-context frame producer.
pub trait CameraSource: Send {
    fn device(&self) -> &str;

    /// Bind the device. Failure leaves the pipeline in its "no preview" state.
    fn connect(&mut self) -> Result<(), ResourceBindError>;

    /// Capture the next frame. `Ok(None)` means the pool is exhausted and the source stalls
    /// until the pipeline releases a frame.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Pick the source implementation for `config.device`.
pub fn open_source(
    config: &CameraConfig,
    pool: FramePool,
) -> Result<Box<dyn CameraSource>, ResourceBindError> {
    if config.is_synthetic() {
        return Ok(Box::new(SyntheticCamera::new(config.clone(), pool)));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Camera::new(config.clone(), pool)))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        let _ = pool;
        Err(ResourceBindError {
            device: config.device.clone(),
            reason: "v4l2 support not compiled in (enable feature ingest-v4l2)".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_devices_open_the_synthetic_source() -> anyhow::Result<()> {
        let config = CameraConfig {
            device: "stub://bench".to_string(),
            ..CameraConfig::default()
        };
        let source = open_source(&config, FramePool::new(2))?;
        assert_eq!(source.device(), "stub://bench");
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_paths_need_v4l2() {
        let result = open_source(&CameraConfig::default(), FramePool::new(2));
        assert!(result.is_err());
    }
}
