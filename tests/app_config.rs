use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use person_watch::config::AppConfig;
use person_watch::DetectorMethod;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PERSONWATCH_CONFIG",
        "PERSONWATCH_METHOD",
        "PERSONWATCH_CAMERA",
        "PERSONWATCH_MODEL",
        "PERSONWATCH_FPS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detector": {
            "method": "YOLO",
            "model_path": "/models/yolov8n.onnx",
            "confidence": 0.4,
            "hog": { "scale": 1.1 }
        },
        "camera": { "device": "2", "width": 320, "height": 240 },
        "display": { "box_color": [0, 0, 255], "box_thickness": 3 },
        "stats": { "window": 20, "history_capacity": 30 },
        "runtime": { "target_fps": 15 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("PERSONWATCH_CONFIG", file.path());
    std::env::set_var("PERSONWATCH_METHOD", "hog");
    std::env::set_var("PERSONWATCH_FPS", "10");

    let cfg = AppConfig::load().expect("load config");

    assert_eq!(cfg.detector.method, DetectorMethod::Hog);
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/yolov8n.onnx"))
    );
    assert_eq!(cfg.detector.confidence, 0.4);
    assert_eq!(cfg.detector.iou, 0.45);
    assert_eq!(cfg.detector.hog.scale, 1.1);
    assert_eq!(cfg.detector.hog.win_stride, [8, 8]);
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!(cfg.camera.width, 320);
    assert_eq!(cfg.camera.height, 240);
    assert_eq!(cfg.display.box_color, [0, 0, 255]);
    assert_eq!(cfg.display.box_thickness, 3);
    assert_eq!(cfg.display.text_color, [255, 0, 0]);
    assert_eq!(cfg.stats.window, 20);
    assert_eq!(cfg.stats.history_capacity, 30);
    assert_eq!(cfg.stats.history_limit, 5);
    assert_eq!(cfg.runtime.target_fps, 10);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[camera]
device = "stub://hall"
seed = 42

[runtime]
render_interval_ms = 250
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = AppConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.camera.device, "stub://hall");
    assert_eq!(cfg.camera.seed, 42);
    assert_eq!(cfg.runtime.render_interval_ms, 250);
    assert_eq!(cfg.runtime.target_fps, 30);

    clear_env();
}

#[test]
fn defaults_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PERSONWATCH_CAMERA", "0");
    let cfg = AppConfig::load().expect("load config");
    assert_eq!(cfg.camera.device, "/dev/video0");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.detector.method, DetectorMethod::Hog);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PERSONWATCH_FPS", "0");
    assert!(AppConfig::load().is_err());
    std::env::set_var("PERSONWATCH_FPS", "fast");
    assert!(AppConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "detector": { "iou": 1.5 } }"#)
        .expect("write config");
    assert!(AppConfig::load_from(Some(file.path())).is_err());

    std::env::set_var("PERSONWATCH_METHOD", "ssd");
    assert!(AppConfig::load().is_err());

    clear_env();
}
