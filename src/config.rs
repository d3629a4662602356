use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DetectorMethod;

const DEFAULT_METHOD: DetectorMethod = DetectorMethod::Hog;
const DEFAULT_CAMERA_DEVICE: &str = "stub://camera0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_STATS_WINDOW: usize = 10;
const DEFAULT_HISTORY_CAPACITY: usize = 10;
const DEFAULT_HISTORY_LIMIT: usize = 5;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_RENDER_INTERVAL_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    detector: Option<DetectorConfigFile>,
    camera: Option<CameraConfigFile>,
    display: Option<DisplayConfigFile>,
    stats: Option<StatsConfigFile>,
    runtime: Option<RuntimeConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    method: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
    hog: Option<HogConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct HogConfigFile {
    win_stride: Option<[i32; 2]>,
    padding: Option<[i32; 2]>,
    scale: Option<f64>,
    hit_threshold: Option<f64>,
    group_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    box_color: Option<[u8; 3]>,
    label_text_color: Option<[u8; 3]>,
    time_color: Option<[u8; 3]>,
    text_color: Option<[u8; 3]>,
    box_thickness: Option<u32>,
    text_scale: Option<u32>,
    label_scale: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StatsConfigFile {
    window: Option<usize>,
    history_capacity: Option<usize>,
    history_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RuntimeConfigFile {
    target_fps: Option<u32>,
    render_interval_ms: Option<u64>,
}

/// Resolved configuration, passed by value into sessions and services.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub detector: DetectorSettings,
    pub camera: CameraSettings,
    pub display: DisplaySettings,
    pub stats: StatsSettings,
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub method: DetectorMethod,
    /// ONNX export used by the neural backend.
    pub model_path: Option<PathBuf>,
    /// Square model input side in pixels.
    pub input_size: u32,
    pub confidence: f32,
    pub iou: f32,
    pub hog: HogSettings,
}

#[derive(Debug, Clone)]
pub struct HogSettings {
    pub win_stride: [i32; 2],
    pub padding: [i32; 2],
    pub scale: f64,
    pub hit_threshold: f64,
    pub group_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Device path (e.g. "/dev/video0") or "stub://<name>" for a synthetic scene.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Seed for synthetic scenes.
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySettings {
    pub box_color: [u8; 3],
    pub label_text_color: [u8; 3],
    pub time_color: [u8; 3],
    pub text_color: [u8; 3],
    pub box_thickness: u32,
    /// Integer glyph scale for the timestamp/status/count lines.
    pub text_scale: u32,
    /// Integer glyph scale for "Person N" labels.
    pub label_scale: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSettings {
    /// Number of recent events averaged by `get_current_stats`.
    pub window: usize,
    /// History retention cap.
    pub history_capacity: usize,
    /// Default number of events returned by `get_detection_history`.
    pub history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub target_fps: u32,
    pub render_interval_ms: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            method: DEFAULT_METHOD,
            model_path: None,
            input_size: DEFAULT_MODEL_INPUT,
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
            hog: HogSettings::default(),
        }
    }
}

impl Default for HogSettings {
    fn default() -> Self {
        Self {
            win_stride: [8, 8],
            padding: [16, 16],
            scale: 1.05,
            hit_threshold: 0.0,
            group_threshold: 2.0,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_CAMERA_DEVICE.to_string(),
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            seed: 0,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            box_color: [0, 255, 0],
            label_text_color: [0, 0, 0],
            time_color: [255, 255, 255],
            text_color: [255, 0, 0],
            box_thickness: 2,
            text_scale: 2,
            label_scale: 1,
        }
    }
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_STATS_WINDOW,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            render_interval_ms: DEFAULT_RENDER_INTERVAL_MS,
        }
    }
}

impl RuntimeSettings {
    /// Worker cadence derived from the FPS target.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

impl AppConfig {
    /// Load from the file named by `PERSONWATCH_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PERSONWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = AppConfig::default();

        let detector_file = file.detector.unwrap_or_default();
        let method = match detector_file.method.as_deref() {
            Some(name) => name.parse()?,
            None => defaults.detector.method,
        };
        let hog_file = detector_file.hog.unwrap_or_default();
        let hog_defaults = defaults.detector.hog;
        let detector = DetectorSettings {
            method,
            model_path: detector_file.model_path,
            input_size: detector_file
                .input_size
                .unwrap_or(defaults.detector.input_size),
            confidence: detector_file
                .confidence
                .unwrap_or(defaults.detector.confidence),
            iou: detector_file.iou.unwrap_or(defaults.detector.iou),
            hog: HogSettings {
                win_stride: hog_file.win_stride.unwrap_or(hog_defaults.win_stride),
                padding: hog_file.padding.unwrap_or(hog_defaults.padding),
                scale: hog_file.scale.unwrap_or(hog_defaults.scale),
                hit_threshold: hog_file.hit_threshold.unwrap_or(hog_defaults.hit_threshold),
                group_threshold: hog_file
                    .group_threshold
                    .unwrap_or(hog_defaults.group_threshold),
            },
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file
                .device
                .map(|d| resolve_camera_device(&d))
                .unwrap_or(defaults.camera.device),
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
            seed: camera_file.seed.unwrap_or(defaults.camera.seed),
        };

        let display_file = file.display.unwrap_or_default();
        let d = defaults.display;
        let display = DisplaySettings {
            box_color: display_file.box_color.unwrap_or(d.box_color),
            label_text_color: display_file.label_text_color.unwrap_or(d.label_text_color),
            time_color: display_file.time_color.unwrap_or(d.time_color),
            text_color: display_file.text_color.unwrap_or(d.text_color),
            box_thickness: display_file.box_thickness.unwrap_or(d.box_thickness),
            text_scale: display_file.text_scale.unwrap_or(d.text_scale),
            label_scale: display_file.label_scale.unwrap_or(d.label_scale),
        };

        let stats_file = file.stats.unwrap_or_default();
        let stats = StatsSettings {
            window: stats_file.window.unwrap_or(defaults.stats.window),
            history_capacity: stats_file
                .history_capacity
                .unwrap_or(defaults.stats.history_capacity),
            history_limit: stats_file
                .history_limit
                .unwrap_or(defaults.stats.history_limit),
        };

        let runtime_file = file.runtime.unwrap_or_default();
        let runtime = RuntimeSettings {
            target_fps: runtime_file
                .target_fps
                .unwrap_or(defaults.runtime.target_fps),
            render_interval_ms: runtime_file
                .render_interval_ms
                .unwrap_or(defaults.runtime.render_interval_ms),
        };

        Ok(Self {
            detector,
            camera,
            display,
            stats,
            runtime,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(method) = std::env::var("PERSONWATCH_METHOD") {
            if !method.trim().is_empty() {
                self.detector.method = method.parse()?;
            }
        }
        if let Ok(device) = std::env::var("PERSONWATCH_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = resolve_camera_device(&device);
            }
        }
        if let Ok(path) = std::env::var("PERSONWATCH_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(fps) = std::env::var("PERSONWATCH_FPS") {
            self.runtime.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("PERSONWATCH_FPS must be a positive integer"))?;
        }
        Ok(())
    }

    /// Reject settings no session or worker can run with.
    pub fn validate(&self) -> Result<()> {
        if self.runtime.target_fps == 0 {
            return Err(anyhow!("target_fps must be greater than zero"));
        }
        if self.runtime.render_interval_ms == 0 {
            return Err(anyhow!("render_interval_ms must be greater than zero"));
        }
        if self.stats.window == 0 {
            return Err(anyhow!("stats window must be greater than zero"));
        }
        if self.stats.history_capacity == 0 {
            return Err(anyhow!("history capacity must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!("confidence threshold must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.detector.iou) {
            return Err(anyhow!("IoU threshold must be within 0..=1"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.display.text_scale == 0 || self.display.label_scale == 0 {
            return Err(anyhow!("text scales must be greater than zero"));
        }
        Ok(())
    }
}

/// Map a bare camera index ("0") to its V4L2 device node; pass anything else through.
pub fn resolve_camera_device(value: &str) -> String {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        format!("/dev/video{}", value)
    } else {
        value.to_string()
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.detector.method, DetectorMethod::Hog);
        assert_eq!(cfg.stats.window, 10);
        assert_eq!(cfg.stats.history_capacity, 10);
        assert_eq!(cfg.runtime.target_fps, 30);
    }

    #[test]
    fn camera_index_maps_to_device_node() {
        assert_eq!(resolve_camera_device("0"), "/dev/video0");
        assert_eq!(resolve_camera_device("12"), "/dev/video12");
        assert_eq!(resolve_camera_device("stub://lobby"), "stub://lobby");
    }

    #[test]
    fn frame_interval_follows_fps() {
        let runtime = RuntimeSettings {
            target_fps: 30,
            render_interval_ms: 100,
        };
        assert_eq!(runtime.frame_interval().as_millis(), 33);
        assert_eq!(runtime.render_interval(), Duration::from_millis(100));
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut cfg = AppConfig::default();
        cfg.stats.window = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_file_rejects_unknown_method() {
        let file = AppConfigFile {
            detector: Some(DetectorConfigFile {
                method: Some("ssd".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(AppConfig::from_file(file).is_err());
    }
}
