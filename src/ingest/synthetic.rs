use std::time::{Duration, Instant};

use super::{CameraConfig, CameraSource, SourceStats};
use crate::error::{CaptureError, ResourceBindError};
use crate::frame::{FramePool, RawFrame};

/// Row padding added to every plane, so consumers cannot get away with assuming
/// stride == width.
const LUMA_PAD: usize = 32;
const CHROMA_PAD: usize = 16;

/// I420 source for `stub://` devices.
///
/// Simulates a scene with occasional changes: a drifting luma gradient, with the chroma tint
/// shifting every 50 frames. Frames are delivered at `config.fps`.
pub struct SyntheticCamera {
    config: CameraConfig,
    pool: FramePool,
    connected: bool,
    frame_count: u64,
    stalls: u64,
    scene_state: u8,
    next_due: Option<Instant>,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig, pool: FramePool) -> Self {
        Self {
            config,
            pool,
            connected: false,
            frame_count: 0,
            stalls: 0,
            scene_state: 0,
            next_due: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        if self.config.fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / self.config.fps
        }
    }

    fn pace(&mut self) {
        let interval = self.frame_interval();
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + interval);
    }

    fn fill(&self, data: &mut [u8], y_stride: usize, c_stride: usize) {
        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let drift = (self.frame_count % 256) as usize;
        let (luma, chroma) = data.split_at_mut(y_stride * h);
        for (row, line) in luma.chunks_exact_mut(y_stride).enumerate() {
            for (col, px) in line[..w].iter_mut().enumerate() {
                *px = (16 + (col + row / 4 + drift) % 220) as u8;
            }
            line[w..].fill(0);
        }

        let tint = self.scene_state.wrapping_mul(37);
        let (u_plane, v_plane) = chroma.split_at_mut(c_stride * (h / 2));
        for line in u_plane.chunks_exact_mut(c_stride) {
            line[..w / 2].fill(128u8.wrapping_add(tint / 4));
            line[w / 2..].fill(0);
        }
        for line in v_plane.chunks_exact_mut(c_stride) {
            line[..w / 2].fill(128u8.wrapping_sub(tint / 4));
            line[w / 2..].fill(0);
        }
    }
}

impl CameraSource for SyntheticCamera {
    fn device(&self) -> &str {
        &self.config.device
    }

    /// Synthetic sources always connect, unless the configured geometry is unusable.
    fn connect(&mut self) -> Result<(), ResourceBindError> {
        let (w, h) = (self.config.width, self.config.height);
        if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
            return Err(ResourceBindError {
                device: self.config.device.clone(),
                reason: format!("unsupported synthetic geometry {}x{}", w, h),
            });
        }
        self.connected = true;
        log::info!(
            "SyntheticCamera: connected to {} ({}x{} @ {} fps)",
            self.config.device,
            w,
            h,
            self.config.fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        if !self.connected {
            return Err(CaptureError {
                device: self.config.device.clone(),
                reason: "not connected".to_string(),
            });
        }
        self.pace();

        let (w, h) = (self.config.width as usize, self.config.height as usize);
        let y_stride = w + LUMA_PAD;
        let c_stride = w / 2 + CHROMA_PAD;
        let Some(mut buffer) = self.pool.checkout(y_stride * h + 2 * c_stride * (h / 2)) else {
            self.stalls += 1;
            return Ok(None);
        };

        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        self.fill(buffer.as_mut_slice(), y_stride, c_stride);

        Ok(Some(
            RawFrame::from_i420(
                buffer,
                self.config.width,
                self.config.height,
                y_stride,
                c_stride,
                Instant::now(),
            )
            .with_sequence(self.frame_count),
        ))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            device: self.config.device.clone(),
            frames_captured: self.frame_count,
            stalls: self.stalls,
        }
    }
}
