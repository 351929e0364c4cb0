use std::time::Instant;

use leafwatch::{ColorspaceConverter, RawFrame, RgbBuffer, YuvMatrix};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn uniform_i420(y: u8, u: u8, v: u8, pad: usize) -> RawFrame {
    let (w, h) = (WIDTH as usize, HEIGHT as usize);
    let y_stride = w + pad;
    let c_stride = w / 2 + pad / 2;
    let mut data = vec![y; y_stride * h];
    data.extend(std::iter::repeat(u).take(c_stride * h / 2));
    data.extend(std::iter::repeat(v).take(c_stride * h / 2));
    RawFrame::from_i420(data, WIDTH, HEIGHT, y_stride, c_stride, Instant::now())
}

fn uniform_nv12(y: u8, u: u8, v: u8) -> RawFrame {
    let (w, h) = (WIDTH as usize, HEIGHT as usize);
    let mut data = vec![y; w * h];
    for _ in 0..(w * h / 4) {
        data.push(u);
        data.push(v);
    }
    RawFrame::from_nv12(data, WIDTH, HEIGHT, w, Instant::now())
}

fn expected_limited(y: u8, u: u8, v: u8) -> [f64; 3] {
    let c = 1.164 * (y as f64 - 16.0);
    let d = u as f64 - 128.0;
    let e = v as f64 - 128.0;
    [
        (c + 1.596 * e).clamp(0.0, 255.0),
        (c - 0.391 * d - 0.813 * e).clamp(0.0, 255.0),
        (c + 2.018 * d).clamp(0.0, 255.0),
    ]
}

fn expected_full(y: u8, u: u8, v: u8) -> [f64; 3] {
    let y = y as f64;
    let d = u as f64 - 128.0;
    let e = v as f64 - 128.0;
    [
        (y + 1.402 * e).clamp(0.0, 255.0),
        (y - 0.344_136 * d - 0.714_136 * e).clamp(0.0, 255.0),
        (y + 1.772 * d).clamp(0.0, 255.0),
    ]
}

fn assert_uniform(rgb: &RgbBuffer, expected: [f64; 3], what: &str) {
    let first = rgb.pixel(0, 0);
    for (channel, (&got, want)) in first.iter().zip(expected).enumerate() {
        assert!(
            (got as f64 - want).abs() <= 2.0,
            "{}: channel {} is {}, expected {:.2}",
            what,
            channel,
            got,
            want
        );
    }
    assert!(
        rgb.as_bytes().chunks_exact(3).all(|px| px == first),
        "{}: output is not uniform",
        what
    );
}

const SAMPLES: [(u8, u8, u8); 6] = [
    (16, 128, 128),
    (235, 128, 128),
    (81, 90, 240),
    (145, 54, 34),
    (41, 240, 110),
    (120, 100, 160),
];

#[test]
fn limited_range_matches_float_bt601() {
    let mut converter = ColorspaceConverter::new(YuvMatrix::Bt601Limited);
    let mut rgb = RgbBuffer::new();
    rgb.ensure_capacity(WIDTH, HEIGHT);

    for (y, u, v) in SAMPLES {
        let frame = uniform_i420(y, u, v, 0);
        converter.convert(&frame, &mut rgb).expect("valid frame");
        assert_uniform(&rgb, expected_limited(y, u, v), &format!("yuv({y},{u},{v})"));
    }
}

#[test]
fn full_range_matches_float_bt601() {
    let mut converter = ColorspaceConverter::new(YuvMatrix::Bt601Full);
    let mut rgb = RgbBuffer::new();
    rgb.ensure_capacity(WIDTH, HEIGHT);

    for (y, u, v) in SAMPLES {
        let frame = uniform_i420(y, u, v, 0);
        converter.convert(&frame, &mut rgb).expect("valid frame");
        assert_uniform(&rgb, expected_full(y, u, v), &format!("yuv({y},{u},{v})"));
    }
}

#[test]
fn padded_and_semi_planar_layouts_agree() {
    let mut converter = ColorspaceConverter::default();
    let mut planar = RgbBuffer::new();
    let mut padded = RgbBuffer::new();
    let mut semi = RgbBuffer::new();
    for rgb in [&mut planar, &mut padded, &mut semi] {
        rgb.ensure_capacity(WIDTH, HEIGHT);
    }

    let (y, u, v) = (145, 54, 34);
    converter
        .convert(&uniform_i420(y, u, v, 0), &mut planar)
        .expect("planar");
    converter
        .convert(&uniform_i420(y, u, v, 64), &mut padded)
        .expect("padded");
    converter
        .convert(&uniform_nv12(y, u, v), &mut semi)
        .expect("nv12");

    assert_eq!(planar.as_bytes(), padded.as_bytes());
    assert_eq!(planar.as_bytes(), semi.as_bytes());
    assert_uniform(&semi, expected_limited(y, u, v), "nv12");
}
