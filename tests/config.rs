use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use leafwatch::config::LeafwatchConfig;
use leafwatch::{AcceleratorPreference, TensorLayout, YuvMatrix};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LEAFWATCH_CONFIG",
        "LEAFWATCH_MODEL",
        "LEAFWATCH_ACCELERATOR",
        "LEAFWATCH_CAMERA",
        "LEAFWATCH_INTERVAL_MS",
        "LEAFWATCH_ALERT",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LeafwatchConfig::load().expect("load defaults");

    assert_eq!(cfg.model.path.to_str(), Some("leafwatch.onnx"));
    assert_eq!(cfg.model.accelerator, AcceleratorPreference::Auto);
    assert_eq!(cfg.model.layout, TensorLayout::Nhwc);
    assert_eq!(cfg.camera.device, "/dev/video0");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.buffers, 4);
    assert_eq!(cfg.min_interval, Duration::from_millis(300));
    assert_eq!(cfg.preprocess.crop_height, 224);
    assert_eq!(cfg.preprocess.crop_width, 298);
    assert_eq!(cfg.preprocess.std, 255.0);
    assert_eq!(cfg.matrix, YuvMatrix::Bt601Limited);
    assert_eq!(cfg.thresholds.positive, 0.5);
    assert_eq!(cfg.thresholds.alert, 0.75);
    assert_eq!(cfg.labels.waiting, "Waiting for input...");
    assert!(!cfg.alert.enabled);
    assert_eq!(cfg.alert.tone.frequency_hz, 1000.0);
    assert_eq!(cfg.alert.tone.duration, Duration::from_millis(300));
    assert_eq!(cfg.alert.tone.sample_rate, 44_100);
    assert!(cfg.alert.device.is_none());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "model": { "path": "/opt/models/leafroll.onnx", "accelerator": "gpu", "layout": "nchw" },
            "camera": { "device": "/dev/video2", "width": 1280, "height": 720, "buffers": 6 },
            "pacing": { "min_interval_ms": 500 },
            "preprocess": { "mean": 0.5, "std": 0.25 },
            "colorspace": { "matrix": "bt601-full" },
            "thresholds": { "positive": 0.6, "alert": 0.9 },
            "labels": { "positive": "Roll", "negative": "Healthy" },
            "alert": { "enabled": false, "frequency_hz": 880, "duration_ms": 150, "device": "alsa_output.usb" }
        }"#,
    );

    std::env::set_var("LEAFWATCH_CONFIG", file.path());
    std::env::set_var("LEAFWATCH_CAMERA", "stub://bench");
    std::env::set_var("LEAFWATCH_INTERVAL_MS", "250");
    std::env::set_var("LEAFWATCH_ALERT", "on");

    let cfg = LeafwatchConfig::load().expect("load config");

    assert_eq!(cfg.model.path.to_str(), Some("/opt/models/leafroll.onnx"));
    assert_eq!(cfg.model.accelerator, AcceleratorPreference::Gpu);
    assert_eq!(cfg.model.layout, TensorLayout::Nchw);
    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.camera.buffers, 6);
    assert_eq!(cfg.min_interval, Duration::from_millis(250));
    assert_eq!(cfg.preprocess.mean, 0.5);
    assert_eq!(cfg.preprocess.std, 0.25);
    assert_eq!(cfg.preprocess.input_width, 298);
    assert_eq!(cfg.matrix, YuvMatrix::Bt601Full);
    assert_eq!(cfg.thresholds.positive, 0.6);
    assert_eq!(cfg.thresholds.alert, 0.9);
    assert_eq!(cfg.labels.positive, "Roll");
    assert_eq!(cfg.labels.negative, "Healthy");
    assert_eq!(cfg.labels.waiting, "Waiting for input...");
    assert!(cfg.alert.enabled);
    assert_eq!(cfg.alert.tone.frequency_hz, 880.0);
    assert_eq!(cfg.alert.tone.duration, Duration::from_millis(150));
    assert_eq!(cfg.alert.device.as_deref(), Some("alsa_output.usb"));

    let settings = cfg.scheduler_settings();
    assert_eq!(settings.min_interval, Duration::from_millis(250));
    assert_eq!(settings.layout, TensorLayout::Nchw);
    assert_eq!(settings.thresholds.alert, 0.9);

    clear_env();
}

#[test]
fn model_and_accelerator_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LEAFWATCH_MODEL", "/tmp/other.onnx");
    std::env::set_var("LEAFWATCH_ACCELERATOR", "cpu");
    std::env::set_var("LEAFWATCH_ALERT", "0");

    let cfg = LeafwatchConfig::load().expect("load config");
    assert_eq!(cfg.model.path.to_str(), Some("/tmp/other.onnx"));
    assert_eq!(cfg.model.accelerator, AcceleratorPreference::Cpu);
    assert!(!cfg.alert.enabled);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for json in [
        r#"{ "camera": { "width": 641 } }"#,
        r#"{ "camera": { "height": 0 } }"#,
        r#"{ "pacing": { "min_interval_ms": 0 } }"#,
        r#"{ "preprocess": { "std": 0.0 } }"#,
        r#"{ "preprocess": { "input_width": 0 } }"#,
        r#"{ "thresholds": { "alert": 1.5 } }"#,
        r#"{ "alert": { "fade_fraction": 2.0 } }"#,
        r#"{ "model": { "accelerator": "tpu" } }"#,
        r#"{ "colorspace": { "matrix": "bt709" } }"#,
        r#"{ "camera": "not an object" }"#,
    ] {
        let file = write_config(json);
        std::env::set_var("LEAFWATCH_CONFIG", file.path());
        assert!(LeafwatchConfig::load().is_err(), "accepted {}", json);
    }

    clear_env();
    std::env::set_var("LEAFWATCH_INTERVAL_MS", "soon");
    assert!(LeafwatchConfig::load().is_err());

    clear_env();
    std::env::set_var("LEAFWATCH_ALERT", "maybe");
    assert!(LeafwatchConfig::load().is_err());

    clear_env();
    std::env::set_var("LEAFWATCH_CONFIG", "/nonexistent/leafwatch.json");
    assert!(LeafwatchConfig::load().is_err());

    clear_env();
}
