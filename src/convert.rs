//! YUV 4:2:0 to interleaved RGB conversion.
//!
//! Conversion runs in two stages. Stage one repacks whatever plane geometry the camera
//! delivered (row strides, pixel strides) into a canonical NV21 sequence: the full luma plane
//! followed by one V/U pair per 2x2 luma block. Stage two applies a fixed YUV to RGB matrix to
//! that sequence. Only stage one knows about capture-device layouts.

use crate::error::ConversionError;
use crate::frame::{Plane, RawFrame, RgbBuffer};

/// Fixed YUV to RGB transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum YuvMatrix {
    /// BT.601 video range (Y in 16..=235), integer arithmetic.
    #[default]
    Bt601Limited,
    /// BT.601 full range (Y in 0..=255).
    Bt601Full,
}

impl std::str::FromStr for YuvMatrix {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bt601-limited" | "limited" => Ok(YuvMatrix::Bt601Limited),
            "bt601-full" | "full" => Ok(YuvMatrix::Bt601Full),
            other => Err(format!("unknown colour matrix '{}'", other)),
        }
    }
}

/// Converts camera frames into an `RgbBuffer`, reusing its intermediate NV21 buffer.
#[derive(Debug, Default)]
pub struct ColorspaceConverter {
    matrix: YuvMatrix,
    nv21: Vec<u8>,
}

impl ColorspaceConverter {
    pub fn new(matrix: YuvMatrix) -> Self {
        Self {
            matrix,
            nv21: Vec::new(),
        }
    }

    pub fn matrix(&self) -> YuvMatrix {
        self.matrix
    }

    /// Convert `frame` into `destination`.
    ///
    /// # Panics
    ///
    /// Panics if `destination` does not have the frame's dimensions. Callers size it with
    /// `RgbBuffer::ensure_capacity` first.
    pub fn convert(
        &mut self,
        frame: &RawFrame,
        destination: &mut RgbBuffer,
    ) -> Result<(), ConversionError> {
        assert!(
            destination.width() == frame.width && destination.height() == frame.height,
            "destination {}x{} does not match frame {}x{}",
            destination.width(),
            destination.height(),
            frame.width,
            frame.height
        );
        validate(frame)?;

        let width = frame.width as usize;
        let height = frame.height as usize;
        self.repack_nv21(frame, width, height);

        let out = destination.as_mut_bytes();
        match self.matrix {
            YuvMatrix::Bt601Limited => transform(&self.nv21, width, height, out, bt601_limited),
            YuvMatrix::Bt601Full => transform(&self.nv21, width, height, out, bt601_full),
        }
        Ok(())
    }

    fn repack_nv21(&mut self, frame: &RawFrame, width: usize, height: usize) {
        let luma_len = width * height;
        // resize is a no-op once the dimensions stop changing.
        self.nv21.resize(luma_len + luma_len / 2, 0);

        let y_plane = frame.plane(0);
        let (luma, chroma) = self.nv21.split_at_mut(luma_len);
        for (row, dst) in luma.chunks_exact_mut(width).enumerate() {
            if y_plane.pixel_stride == 1 {
                dst.copy_from_slice(y_plane.row(row, width));
            } else {
                for (col, px) in dst.iter_mut().enumerate() {
                    *px = y_plane.sample(row, col);
                }
            }
        }

        let u_plane = frame.plane(1);
        let v_plane = frame.plane(2);
        let chroma_width = width / 2;
        for (row, dst) in chroma.chunks_exact_mut(width).enumerate() {
            for col in 0..chroma_width {
                dst[col * 2] = v_plane.sample(row, col);
                dst[col * 2 + 1] = u_plane.sample(row, col);
            }
        }
    }
}

fn validate(frame: &RawFrame) -> Result<(), ConversionError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(ConversionError::Dimensions { width, height });
    }
    let (w, h) = (width as usize, height as usize);
    check_plane(0, frame.plane(0), h, w)?;
    check_plane(1, frame.plane(1), h / 2, w / 2)?;
    check_plane(2, frame.plane(2), h / 2, w / 2)?;
    Ok(())
}

fn check_plane(
    index: usize,
    plane: Plane<'_>,
    rows: usize,
    cols: usize,
) -> Result<(), ConversionError> {
    let extent = (cols - 1) * plane.pixel_stride.max(1) + 1;
    if plane.pixel_stride == 0 || plane.row_stride < extent {
        return Err(ConversionError::Stride {
            plane: index,
            row_stride: plane.row_stride,
            extent,
        });
    }
    let needed = plane.required_len(rows, cols);
    if plane.data.len() < needed {
        return Err(ConversionError::PlaneTooShort {
            plane: index,
            needed,
            available: plane.data.len(),
        });
    }
    Ok(())
}

fn transform(
    nv21: &[u8],
    width: usize,
    height: usize,
    rgb: &mut [u8],
    pixel: fn(u8, u8, u8) -> [u8; 3],
) {
    let luma_len = width * height;
    for j in 0..height {
        let uv_row = luma_len + (j / 2) * width;
        let out_row = &mut rgb[j * width * 3..(j + 1) * width * 3];
        for i in 0..width {
            let y = nv21[j * width + i];
            let uv = uv_row + (i / 2) * 2;
            let v = nv21[uv];
            let u = nv21[uv + 1];
            out_row[i * 3..i * 3 + 3].copy_from_slice(&pixel(y, u, v));
        }
    }
}

/// Integer BT.601 video-range transform, 8 fractional bits.
#[inline]
fn bt601_limited(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 298 * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_i32((c + 409 * e + 128) >> 8),
        clamp_i32((c - 100 * d - 208 * e + 128) >> 8),
        clamp_i32((c + 516 * d + 128) >> 8),
    ]
}

#[inline]
fn bt601_full(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_i32(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn i420(width: u32, height: u32, y: u8, u: u8, v: u8, pad: usize) -> RawFrame {
        let (w, h) = (width as usize, height as usize);
        let y_stride = w + pad;
        let c_stride = w / 2 + pad;
        let mut data = vec![0xEE; y_stride * h + 2 * c_stride * (h / 2)];
        for row in 0..h {
            data[row * y_stride..row * y_stride + w].fill(y);
        }
        let u_off = y_stride * h;
        let v_off = u_off + c_stride * (h / 2);
        for row in 0..h / 2 {
            data[u_off + row * c_stride..u_off + row * c_stride + w / 2].fill(u);
            data[v_off + row * c_stride..v_off + row * c_stride + w / 2].fill(v);
        }
        RawFrame::from_i420(data, width, height, y_stride, c_stride, Instant::now())
    }

    #[test]
    fn full_range_gray_stays_gray() -> Result<(), ConversionError> {
        let frame = i420(2, 2, 128, 128, 128, 0);
        let mut rgb = RgbBuffer::new();
        rgb.ensure_capacity(2, 2);
        ColorspaceConverter::new(YuvMatrix::Bt601Full).convert(&frame, &mut rgb)?;
        assert_eq!(rgb.as_bytes(), &[128u8; 12][..]);
        Ok(())
    }

    #[test]
    fn limited_range_black_and_white() -> Result<(), ConversionError> {
        let mut converter = ColorspaceConverter::new(YuvMatrix::Bt601Limited);
        let mut rgb = RgbBuffer::new();
        rgb.ensure_capacity(4, 2);

        converter.convert(&i420(4, 2, 16, 128, 128, 0), &mut rgb)?;
        assert_eq!(rgb.pixel(0, 0), [0, 0, 0]);

        converter.convert(&i420(4, 2, 235, 128, 128, 0), &mut rgb)?;
        assert_eq!(rgb.pixel(3, 1), [255, 255, 255]);
        Ok(())
    }

    #[test]
    fn padding_bytes_never_leak_into_output() -> Result<(), ConversionError> {
        let mut converter = ColorspaceConverter::default();
        let mut padded = RgbBuffer::new();
        let mut tight = RgbBuffer::new();
        padded.ensure_capacity(8, 4);
        tight.ensure_capacity(8, 4);

        converter.convert(&i420(8, 4, 90, 60, 200, 24), &mut padded)?;
        converter.convert(&i420(8, 4, 90, 60, 200, 0), &mut tight)?;
        assert_eq!(padded.as_bytes(), tight.as_bytes());
        Ok(())
    }

    #[test]
    fn semi_planar_matches_planar() -> Result<(), ConversionError> {
        let (w, h) = (4usize, 4usize);
        let mut nv12 = vec![70u8; w * h];
        for _ in 0..(w / 2) * (h / 2) {
            nv12.extend_from_slice(&[100, 180]);
        }
        let semi = RawFrame::from_nv12(nv12, 4, 4, 4, Instant::now());

        let mut converter = ColorspaceConverter::default();
        let mut a = RgbBuffer::new();
        let mut b = RgbBuffer::new();
        a.ensure_capacity(4, 4);
        b.ensure_capacity(4, 4);
        converter.convert(&semi, &mut a)?;
        converter.convert(&i420(4, 4, 70, 100, 180, 0), &mut b)?;
        assert_eq!(a.as_bytes(), b.as_bytes());
        Ok(())
    }

    #[test]
    fn odd_dimensions_are_rejected() {
        let frame = RawFrame::from_i420(vec![0u8; 64], 3, 2, 3, 2, Instant::now());
        let mut rgb = RgbBuffer::new();
        rgb.ensure_capacity(3, 2);
        let err = ColorspaceConverter::default()
            .convert(&frame, &mut rgb)
            .unwrap_err();
        assert_eq!(err, ConversionError::Dimensions { width: 3, height: 2 });
    }

    #[test]
    fn short_chroma_plane_is_rejected() {
        // Luma complete, chroma truncated.
        let frame = RawFrame::from_i420(vec![0u8; 4 * 4 + 3], 4, 4, 4, 2, Instant::now());
        let mut rgb = RgbBuffer::new();
        rgb.ensure_capacity(4, 4);
        let err = ColorspaceConverter::default()
            .convert(&frame, &mut rgb)
            .unwrap_err();
        assert!(matches!(err, ConversionError::PlaneTooShort { plane: 1, .. }));
    }

    #[test]
    fn stride_shorter_than_row_is_rejected() {
        let frame = RawFrame::from_i420(vec![0u8; 256], 8, 2, 4, 4, Instant::now());
        let mut rgb = RgbBuffer::new();
        rgb.ensure_capacity(8, 2);
        let err = ColorspaceConverter::default()
            .convert(&frame, &mut rgb)
            .unwrap_err();
        assert!(matches!(err, ConversionError::Stride { plane: 0, .. }));
    }

    #[test]
    #[should_panic(expected = "does not match frame")]
    fn mismatched_destination_panics() {
        let frame = i420(4, 4, 16, 128, 128, 0);
        let mut rgb = RgbBuffer::new();
        rgb.ensure_capacity(2, 2);
        let _ = ColorspaceConverter::default().convert(&frame, &mut rgb);
    }
}
