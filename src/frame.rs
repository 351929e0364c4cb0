//! Camera frame ownership layer.
//!
//! - `FramePool`: fixed set of byte buffers owned by a camera source.
//! - `RawFrame`: one captured 4:2:0 frame. Dropping it releases its buffer back to the pool.
//! - `RgbBuffer`: interleaved RGB raster reused across frames by the inference worker.
//!
//! A `RawFrame` is released exactly once: it is not `Clone`, and its buffer goes back to the
//! source in `Drop`, whichever terminal state the frame reaches.

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

// ----------------------------------------------------------------------------
// FramePool: source-owned buffer reclamation
// ----------------------------------------------------------------------------

/// Bounded pool of frame buffers.
///
/// Sources check a buffer out per captured frame. If every buffer is still held by the
/// pipeline the source stalls (`checkout` returns `None`) until frames are released.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    free_tx: Sender<Vec<u8>>,
    free_rx: Receiver<Vec<u8>>,
    capacity: usize,
    outstanding: AtomicUsize,
}

impl FramePool {
    pub fn new(buffers: usize) -> Self {
        let capacity = buffers.max(1);
        let (free_tx, free_rx) = crossbeam_channel::bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel was sized for exactly this many buffers.
            let _ = free_tx.try_send(Vec::new());
        }
        Self {
            inner: Arc::new(PoolInner {
                free_tx,
                free_rx,
                capacity,
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Take a buffer of `len` bytes. Reuses the buffer's allocation once sizes stabilize.
    pub fn checkout(&self, len: usize) -> Option<PooledBuffer> {
        let mut data = self.inner.free_rx.try_recv().ok()?;
        data.resize(len, 0);
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(PooledBuffer {
            data,
            pool: Arc::clone(&self.inner),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Buffers currently held by frames that have not been released.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.inner.free_rx.len()
    }
}

/// A buffer checked out of a `FramePool`. Returns itself to the pool on drop.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        let _ = self.pool.free_tx.try_send(data);
        self.pool.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Backing storage of a `RawFrame`.
pub enum FrameData {
    Pooled(PooledBuffer),
    Owned(Vec<u8>),
}

impl FrameData {
    fn as_slice(&self) -> &[u8] {
        match self {
            FrameData::Pooled(buffer) => buffer.as_slice(),
            FrameData::Owned(data) => data,
        }
    }
}

impl From<PooledBuffer> for FrameData {
    fn from(buffer: PooledBuffer) -> Self {
        FrameData::Pooled(buffer)
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Owned(data)
    }
}

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// Where a plane lives inside the frame's backing buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offset: usize,
    /// Bytes between the starts of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples in a row (1 planar, 2 semi-planar).
    pub pixel_stride: usize,
}

impl PlaneLayout {
    pub fn new(offset: usize, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            offset,
            row_stride,
            pixel_stride,
        }
    }
}

/// Borrowed view of one plane.
#[derive(Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    /// Bytes needed to address `rows` x `cols` samples with this plane's strides.
    pub fn required_len(&self, rows: usize, cols: usize) -> usize {
        if rows == 0 || cols == 0 {
            return 0;
        }
        (rows - 1) * self.row_stride + (cols - 1) * self.pixel_stride + 1
    }

    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.row_stride + col * self.pixel_stride]
    }

    /// Contiguous bytes of a row starting at column 0. Only meaningful for pixel stride 1.
    #[inline]
    pub fn row(&self, row: usize, cols: usize) -> &'a [u8] {
        let start = row * self.row_stride;
        &self.data[start..start + cols]
    }
}

/// One captured 4:2:0 frame: a luma plane and two half-resolution chroma planes (U, V).
///
/// There is no `Clone`: each frame is released exactly once.
///
/// ```compile_fail
/// use leafwatch::RawFrame;
/// let frame = RawFrame::from_i420(vec![0u8; 6], 2, 2, 2, 1, std::time::Instant::now());
/// let _copy = frame.clone();
/// ```
pub struct RawFrame {
    data: FrameData,
    planes: [PlaneLayout; 3],
    pub width: u32,
    pub height: u32,
    captured_at: Instant,
    sequence: u64,
}

impl RawFrame {
    /// Wrap a filled buffer. Geometry is validated by the converter, not here.
    pub fn new(
        data: impl Into<FrameData>,
        width: u32,
        height: u32,
        planes: [PlaneLayout; 3],
        captured_at: Instant,
    ) -> Self {
        Self {
            data: data.into(),
            planes,
            width,
            height,
            captured_at,
            sequence: 0,
        }
    }

    /// Fully planar Y, U, V layout with independent luma and chroma row strides.
    pub fn from_i420(
        data: impl Into<FrameData>,
        width: u32,
        height: u32,
        y_stride: usize,
        chroma_stride: usize,
        captured_at: Instant,
    ) -> Self {
        let u_offset = y_stride * height as usize;
        let v_offset = u_offset + chroma_stride * (height as usize / 2);
        Self::new(
            data,
            width,
            height,
            [
                PlaneLayout::new(0, y_stride, 1),
                PlaneLayout::new(u_offset, chroma_stride, 1),
                PlaneLayout::new(v_offset, chroma_stride, 1),
            ],
            captured_at,
        )
    }

    /// Semi-planar Y plane followed by interleaved U/V pairs.
    pub fn from_nv12(
        data: impl Into<FrameData>,
        width: u32,
        height: u32,
        stride: usize,
        captured_at: Instant,
    ) -> Self {
        let uv_offset = stride * height as usize;
        Self::new(
            data,
            width,
            height,
            [
                PlaneLayout::new(0, stride, 1),
                PlaneLayout::new(uv_offset, stride, 2),
                PlaneLayout::new(uv_offset + 1, stride, 2),
            ],
            captured_at,
        )
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Plane 0 is luma, 1 is U (Cb), 2 is V (Cr).
    pub fn plane(&self, index: usize) -> Plane<'_> {
        let layout = self.planes[index];
        let bytes = self.data.as_slice();
        let start = layout.offset.min(bytes.len());
        Plane {
            data: &bytes[start..],
            row_stride: layout.row_stride,
            pixel_stride: layout.pixel_stride,
        }
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content stays out of logs.
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// RgbBuffer
// ----------------------------------------------------------------------------

/// Interleaved 8-bit RGB raster owned by the inference worker.
#[derive(Debug, Default)]
pub struct RgbBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
    allocations: u64,
}

impl RgbBuffer {
    pub const CHANNELS: usize = 3;

    pub fn new() -> Self {
        Self::default()
    }

    /// Resize to `width` x `height`. Reallocates only when the dimensions change.
    ///
    /// Returns true when a reallocation happened.
    pub fn ensure_capacity(&mut self, width: u32, height: u32) -> bool {
        if self.width == width && self.height == height && !self.data.is_empty() {
            return false;
        }
        let len = width as usize * height as usize * Self::CHANNELS;
        self.data = vec![0u8; len];
        self.width = width;
        self.height = height;
        self.allocations += 1;
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Number of times the raster has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Build a raster from interleaved RGB bytes. Used by tests and still-image tooling.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
            allocations: 1,
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
