//! RGB raster to model tensor.
//!
//! Three steps, in order: center crop-or-pad to the crop box, bilinear resize to the model's
//! input resolution, affine normalization `(value - mean) / std`. The output shape depends only
//! on the settings, never on the incoming frame size.

use crate::frame::RgbBuffer;
use crate::tensor::Tensor;

pub const CHANNELS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreprocessSettings {
    pub crop_height: usize,
    pub crop_width: usize,
    pub input_height: usize,
    pub input_width: usize,
    pub mean: f32,
    pub std: f32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            crop_height: 224,
            crop_width: 298,
            input_height: 224,
            input_width: 298,
            mean: 0.0,
            std: 255.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Preprocessor {
    settings: PreprocessSettings,
}

impl Preprocessor {
    pub fn new(settings: PreprocessSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PreprocessSettings {
        &self.settings
    }

    pub fn output_shape(&self) -> [usize; 3] {
        [self.settings.input_height, self.settings.input_width, CHANNELS]
    }

    pub fn prepare(&self, rgb: &RgbBuffer) -> Tensor {
        let mut tensor = Tensor::zeros(self.output_shape());
        self.prepare_into(rgb, &mut tensor);
        tensor
    }

    /// Same as `prepare`, writing into a caller-owned tensor of `output_shape()`.
    pub fn prepare_into(&self, rgb: &RgbBuffer, tensor: &mut Tensor) {
        debug_assert_eq!(tensor.shape(), self.output_shape());
        let s = &self.settings;
        let crop = CropWindow::centered(rgb, s.crop_height, s.crop_width);
        let scale_y = s.crop_height as f32 / s.input_height as f32;
        let scale_x = s.crop_width as f32 / s.input_width as f32;
        let inv_std = 1.0 / s.std;

        let out = tensor.as_mut_slice();
        for oy in 0..s.input_height {
            let (y0, y1, fy) = sample_axis(oy, scale_y, s.crop_height);
            for ox in 0..s.input_width {
                let (x0, x1, fx) = sample_axis(ox, scale_x, s.crop_width);
                let p00 = crop.pixel(y0, x0);
                let p01 = crop.pixel(y0, x1);
                let p10 = crop.pixel(y1, x0);
                let p11 = crop.pixel(y1, x1);
                let base = (oy * s.input_width + ox) * CHANNELS;
                for c in 0..CHANNELS {
                    let top = p00[c] as f32 + (p01[c] as f32 - p00[c] as f32) * fx;
                    let bottom = p10[c] as f32 + (p11[c] as f32 - p10[c] as f32) * fx;
                    let value = top + (bottom - top) * fy;
                    out[base + c] = (value - s.mean) * inv_std;
                }
            }
        }
    }
}

/// Half-pixel-center source coordinate for output index `dst`.
fn sample_axis(dst: usize, scale: f32, src_len: usize) -> (usize, usize, f32) {
    let max = src_len.saturating_sub(1) as f32;
    let src = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, max);
    let i0 = src.floor() as usize;
    let i1 = (i0 + 1).min(src_len.saturating_sub(1));
    (i0, i1, src - i0 as f32)
}

/// A crop box over the raster. Coordinates outside the raster read as zero (padding).
struct CropWindow<'a> {
    rgb: &'a RgbBuffer,
    offset_y: i64,
    offset_x: i64,
}

impl<'a> CropWindow<'a> {
    fn centered(rgb: &'a RgbBuffer, height: usize, width: usize) -> Self {
        // Positive offset crops, negative offset pads; both split evenly around the center.
        Self {
            rgb,
            offset_y: (rgb.height() as i64 - height as i64) / 2,
            offset_x: (rgb.width() as i64 - width as i64) / 2,
        }
    }

    #[inline]
    fn pixel(&self, y: usize, x: usize) -> [u8; 3] {
        let sy = y as i64 + self.offset_y;
        let sx = x as i64 + self.offset_x;
        if sy < 0 || sx < 0 || sy >= self.rgb.height() as i64 || sx >= self.rgb.width() as i64 {
            return [0, 0, 0];
        }
        self.rgb.pixel(sx as u32, sy as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 3]) -> RgbBuffer {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        RgbBuffer::from_rgb(width, height, data).unwrap()
    }

    fn settings(crop: (usize, usize), input: (usize, usize)) -> PreprocessSettings {
        PreprocessSettings {
            crop_height: crop.0,
            crop_width: crop.1,
            input_height: input.0,
            input_width: input.1,
            mean: 0.0,
            std: 255.0,
        }
    }

    #[test]
    fn output_shape_ignores_frame_size() {
        let pre = Preprocessor::new(PreprocessSettings::default());
        for (w, h) in [(640, 480), (320, 240), (100, 600)] {
            let tensor = pre.prepare(&raster(w, h, |_, _| [10, 20, 30]));
            assert_eq!(tensor.shape(), [224, 298, 3]);
        }
    }

    #[test]
    fn normalizes_into_unit_range() {
        let pre = Preprocessor::new(settings((4, 4), (4, 4)));
        let tensor = pre.prepare(&raster(4, 4, |_, _| [255, 0, 51]));
        assert_eq!(tensor.get(0, 0, 0), 1.0);
        assert_eq!(tensor.get(3, 3, 1), 0.0);
        assert!((tensor.get(2, 1, 2) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn center_crop_takes_the_middle() {
        // 6x2 raster, crop to 2x2: keep columns 2 and 3.
        let pre = Preprocessor::new(settings((2, 2), (2, 2)));
        let tensor = pre.prepare(&raster(6, 2, |x, _| [x as u8 * 10, 0, 0]));
        assert!((tensor.get(0, 0, 0) - 20.0 / 255.0).abs() < 1e-6);
        assert!((tensor.get(0, 1, 0) - 30.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn pad_fills_with_zero() {
        // 2x2 raster padded into a 4x4 box: border is zero, center keeps the value.
        let pre = Preprocessor::new(settings((4, 4), (4, 4)));
        let tensor = pre.prepare(&raster(2, 2, |_, _| [255, 255, 255]));
        assert_eq!(tensor.get(0, 0, 0), 0.0);
        assert_eq!(tensor.get(3, 3, 2), 0.0);
        assert_eq!(tensor.get(1, 1, 0), 1.0);
        assert_eq!(tensor.get(2, 2, 1), 1.0);
    }

    #[test]
    fn bilinear_downscale_averages_neighbours() {
        // 4 wide -> 2 wide: each output samples exactly between two inputs.
        let pre = Preprocessor::new(PreprocessSettings {
            std: 1.0,
            ..settings((1, 4), (1, 2))
        });
        let tensor = pre.prepare(&raster(4, 1, |x, _| [(x * 10) as u8, 0, 0]));
        assert!((tensor.get(0, 0, 0) - 5.0).abs() < 1e-4);
        assert!((tensor.get(0, 1, 0) - 25.0).abs() < 1e-4);
    }

    #[test]
    fn prepare_is_deterministic() {
        let pre = Preprocessor::new(settings((48, 64), (24, 30)));
        let rgb = raster(80, 60, |x, y| [(x * 3) as u8, (y * 4) as u8, (x ^ y) as u8]);
        assert_eq!(pre.prepare(&rgb), pre.prepare(&rgb));
    }
}
