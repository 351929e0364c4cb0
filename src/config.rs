use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::ToneRequest;
use crate::convert::YuvMatrix;
use crate::infer::{AcceleratorPreference, TensorLayout};
use crate::ingest::CameraConfig;
use crate::preprocess::PreprocessSettings;
use crate::scheduler::{Labels, SchedulerSettings, Thresholds};

const DEFAULT_MODEL_PATH: &str = "leafwatch.onnx";
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_BUFFERS: usize = 4;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_MIN_INTERVAL_MS: u64 = 300;

#[derive(Debug, Deserialize, Default)]
struct LeafwatchConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    pacing: Option<PacingConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
    colorspace: Option<ColorspaceConfigFile>,
    thresholds: Option<ThresholdsConfigFile>,
    labels: Option<LabelsConfigFile>,
    alert: Option<AlertConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    accelerator: Option<String>,
    layout: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    buffers: Option<usize>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PacingConfigFile {
    min_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PreprocessConfigFile {
    crop_height: Option<usize>,
    crop_width: Option<usize>,
    input_height: Option<usize>,
    input_width: Option<usize>,
    mean: Option<f32>,
    std: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ColorspaceConfigFile {
    matrix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdsConfigFile {
    positive: Option<f32>,
    alert: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct LabelsConfigFile {
    positive: Option<String>,
    negative: Option<String>,
    waiting: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    enabled: Option<bool>,
    frequency_hz: Option<f64>,
    duration_ms: Option<u64>,
    fade_fraction: Option<f64>,
    sample_rate: Option<u32>,
    device: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LeafwatchConfig {
    pub model: ModelSettings,
    pub camera: CameraConfig,
    pub min_interval: Duration,
    pub preprocess: PreprocessSettings,
    pub matrix: YuvMatrix,
    pub thresholds: Thresholds,
    pub labels: Labels,
    pub alert: AlertSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub accelerator: AcceleratorPreference,
    pub layout: TensorLayout,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Initial state of the user toggle.
    pub enabled: bool,
    pub tone: ToneRequest,
    /// Audio sink name; `None` uses the default device.
    pub device: Option<String>,
}

impl LeafwatchConfig {
    /// Defaults, then the JSON file named by `LEAFWATCH_CONFIG`, then `LEAFWATCH_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LEAFWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LeafwatchConfigFile) -> Result<Self> {
        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            path: model_file
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            accelerator: parse_or_default(model_file.accelerator.as_deref(), "model.accelerator")?,
            layout: parse_or_default(model_file.layout.as_deref(), "model.layout")?,
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            buffers: camera_file.buffers.unwrap_or(DEFAULT_CAMERA_BUFFERS),
            fps: camera_file.fps.unwrap_or(DEFAULT_CAMERA_FPS),
        };

        let min_interval = Duration::from_millis(
            file.pacing
                .and_then(|pacing| pacing.min_interval_ms)
                .unwrap_or(DEFAULT_MIN_INTERVAL_MS),
        );

        let defaults = PreprocessSettings::default();
        let pre = file.preprocess.unwrap_or_default();
        let preprocess = PreprocessSettings {
            crop_height: pre.crop_height.unwrap_or(defaults.crop_height),
            crop_width: pre.crop_width.unwrap_or(defaults.crop_width),
            input_height: pre.input_height.unwrap_or(defaults.input_height),
            input_width: pre.input_width.unwrap_or(defaults.input_width),
            mean: pre.mean.unwrap_or(defaults.mean),
            std: pre.std.unwrap_or(defaults.std),
        };

        let matrix = parse_or_default(
            file.colorspace
                .as_ref()
                .and_then(|colorspace| colorspace.matrix.as_deref()),
            "colorspace.matrix",
        )?;

        let default_thresholds = Thresholds::default();
        let thresholds = file.thresholds.unwrap_or_default();
        let thresholds = Thresholds {
            positive: thresholds.positive.unwrap_or(default_thresholds.positive),
            alert: thresholds.alert.unwrap_or(default_thresholds.alert),
        };

        let default_labels = Labels::default();
        let labels_file = file.labels.unwrap_or_default();
        let labels = Labels {
            positive: labels_file.positive.unwrap_or(default_labels.positive),
            negative: labels_file.negative.unwrap_or(default_labels.negative),
            waiting: labels_file.waiting.unwrap_or(default_labels.waiting),
        };

        let default_tone = ToneRequest::default();
        let alert_file = file.alert.unwrap_or_default();
        let alert = AlertSettings {
            enabled: alert_file.enabled.unwrap_or(false),
            tone: ToneRequest {
                frequency_hz: alert_file.frequency_hz.unwrap_or(default_tone.frequency_hz),
                duration: alert_file
                    .duration_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default_tone.duration),
                fade_fraction: alert_file
                    .fade_fraction
                    .unwrap_or(default_tone.fade_fraction),
                sample_rate: alert_file.sample_rate.unwrap_or(default_tone.sample_rate),
            },
            device: alert_file.device.filter(|device| !device.trim().is_empty()),
        };

        Ok(Self {
            model,
            camera,
            min_interval,
            preprocess,
            matrix,
            thresholds,
            labels,
            alert,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LEAFWATCH_MODEL") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(accelerator) = std::env::var("LEAFWATCH_ACCELERATOR") {
            if !accelerator.trim().is_empty() {
                self.model.accelerator = accelerator
                    .parse()
                    .map_err(|e| anyhow!("LEAFWATCH_ACCELERATOR: {}", e))?;
            }
        }
        if let Ok(device) = std::env::var("LEAFWATCH_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(interval) = std::env::var("LEAFWATCH_INTERVAL_MS") {
            let ms: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("LEAFWATCH_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.min_interval = Duration::from_millis(ms);
        }
        if let Ok(alert) = std::env::var("LEAFWATCH_ALERT") {
            self.alert.enabled = parse_flag(&alert)
                .ok_or_else(|| anyhow!("LEAFWATCH_ALERT must be one of 1/0, true/false, on/off"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let (w, h) = (self.camera.width, self.camera.height);
        if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
            return Err(anyhow!(
                "camera dimensions must be even and non-zero (got {}x{})",
                w,
                h
            ));
        }
        if self.camera.buffers == 0 {
            return Err(anyhow!("camera.buffers must be greater than zero"));
        }
        if self.min_interval.is_zero() {
            return Err(anyhow!("pacing interval must be greater than zero"));
        }
        let pre = &self.preprocess;
        if pre.crop_height == 0 || pre.crop_width == 0 || pre.input_height == 0 || pre.input_width == 0
        {
            return Err(anyhow!("crop and input dimensions must be non-zero"));
        }
        if pre.std == 0.0 || !pre.std.is_finite() || !pre.mean.is_finite() {
            return Err(anyhow!("preprocess.std must be finite and non-zero"));
        }
        for (name, value) in [
            ("thresholds.positive", self.thresholds.positive),
            ("thresholds.alert", self.thresholds.alert),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1] (got {})", name, value));
            }
        }
        self.alert
            .tone
            .synthesize()
            .map_err(|e| anyhow!("alert tone: {}", e))?;
        Ok(())
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            min_interval: self.min_interval,
            matrix: self.matrix,
            preprocess: self.preprocess,
            layout: self.model.layout,
            thresholds: self.thresholds,
        }
    }
}

fn read_config_file(path: &Path) -> Result<LeafwatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_or_default<T>(value: Option<&str>, field: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String> + Default,
{
    match value {
        Some(raw) => raw.parse().map_err(|e| anyhow!("{}: {}", field, e)),
        None => Ok(T::default()),
    }
}

/// `1/true/on/yes` or `0/false/off/no`, case-insensitive.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
