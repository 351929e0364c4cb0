//! V4L2 camera source.
//!
//! Negotiates a 4:2:0 capture format (YU12 preferred, NV12 accepted) and copies each dequeued
//! buffer into a pooled frame buffer. The mmap ring buffer is requeued on the next capture.

use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::{CameraConfig, CameraSource, SourceStats};
use crate::error::{CaptureError, ResourceBindError};
use crate::frame::{FramePool, RawFrame};

const HEALTH_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    /// Planar Y, U, V.
    Yu12,
    /// Y plane followed by interleaved U/V.
    Nv12,
}

impl Layout {
    fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"YU12" => Some(Layout::Yu12),
            b"NV12" => Some(Layout::Nv12),
            _ => None,
        }
    }
}

pub struct V4l2Camera {
    config: CameraConfig,
    pool: FramePool,
    state: Option<DeviceState>,
    layout: Layout,
    stride: usize,
    frame_count: u64,
    stalls: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(config: CameraConfig, pool: FramePool) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            stride: config.width as usize,
            layout: Layout::Yu12,
            config,
            pool,
            state: None,
            frame_count: 0,
            stalls: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn bind_err(&self, reason: impl std::fmt::Display) -> ResourceBindError {
        ResourceBindError {
            device: self.config.device.clone(),
            reason: reason.to_string(),
        }
    }

    fn capture_err(&mut self, reason: impl std::fmt::Display) -> CaptureError {
        let reason = reason.to_string();
        self.last_error = Some(reason.clone());
        CaptureError {
            device: self.config.device.clone(),
            reason,
        }
    }
}

impl CameraSource for V4l2Camera {
    fn device(&self) -> &str {
        &self.config.device
    }

    fn connect(&mut self) -> Result<(), ResourceBindError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        self.state = None;
        let device = v4l::Device::with_path(&self.config.device)
            .map_err(|err| self.bind_err(format!("open device: {}", err)))?;
        let mut format = device
            .format()
            .map_err(|err| self.bind_err(format!("read format: {}", err)))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"YU12");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .map_err(|err| self.bind_err(format!("read format after set failure: {}", err)))?
            }
        };

        let layout = Layout::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            self.bind_err(format!(
                "device delivers {} instead of a 4:2:0 format (YU12/NV12)",
                format.fourcc
            ))
        })?;
        if format.width % 2 != 0 || format.height % 2 != 0 {
            return Err(self.bind_err(format!(
                "odd frame size {}x{}",
                format.width, format.height
            )));
        }

        self.layout = layout;
        self.stride = (format.stride as usize).max(format.width as usize);
        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let buffers = self.config.buffers.max(1) as u32;
        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, buffers)
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            self.bind_err(format!("create buffer stream: {}", err))
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Camera: connected to {} ({}x{} {:?}, stride {})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.layout,
            self.stride
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Err(self.capture_err("device not connected"));
        };
        let pool = &self.pool;
        let captured = state.with_mut(|fields| {
            fields.stream.next().map(|(buf, _meta)| {
                pool.checkout(buf.len()).map(|mut buffer| {
                    buffer.as_mut_slice().copy_from_slice(buf);
                    buffer
                })
            })
        });
        let buffer = match captured {
            Ok(Some(buffer)) => buffer,
            Ok(None) => {
                self.stalls += 1;
                return Ok(None);
            }
            Err(err) => return Err(self.capture_err(err)),
        };

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let (width, height) = (self.active_width, self.active_height);
        let frame = match self.layout {
            Layout::Yu12 => RawFrame::from_i420(
                buffer,
                width,
                height,
                self.stride,
                self.stride / 2,
                Instant::now(),
            ),
            Layout::Nv12 => RawFrame::from_nv12(buffer, width, height, self.stride, Instant::now()),
        };
        Ok(Some(frame.with_sequence(self.frame_count)))
    }

    fn is_healthy(&self) -> bool {
        if self.state.is_none() || self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= HEALTH_GRACE
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            device: self.config.device.clone(),
            frames_captured: self.frame_count,
            stalls: self.stalls,
        }
    }
}
