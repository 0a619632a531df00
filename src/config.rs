use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::catalog::PERSON_CLASS_ID;
use crate::controller::DEFAULT_MAX_CONSECUTIVE_FAILURES;
use crate::detect::{BackendKind, Thresholds};
use crate::display::HeadlessConfig;
use crate::ingest::{CaptureSettings, SourceSpec};

pub const CONFIG_ENV: &str = "HEADCOUNT_CONFIG";

const DEFAULT_SOURCE: &str = "0";
const DEFAULT_MODEL_PATH: &str = "models/yolo11m.onnx";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.4;
const DEFAULT_OVERLAP: f32 = 0.55;
const DEFAULT_WINDOW_TITLE: &str = "YOLO Detection";

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    source: Option<String>,
    model: Option<ModelConfigFile>,
    capture: Option<CaptureConfigFile>,
    detection: Option<DetectionConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    backend: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence: Option<f32>,
    overlap: Option<f32>,
    person_class: Option<u32>,
    max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    window_title: Option<String>,
    show_fps: Option<bool>,
    labels: Option<PathBuf>,
    font: Option<PathBuf>,
    log_every: Option<u64>,
    snapshot_dir: Option<PathBuf>,
    snapshot_every: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Camera index, video file, image directory or `stub://` URL.
    pub source: String,
    pub model: ModelSettings,
    pub capture: CaptureSettings,
    pub detection: DetectionSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub backend: BackendKind,
    pub input_width: u32,
    pub input_height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence: f32,
    pub overlap: f32,
    pub person_class: u32,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub window_title: String,
    pub show_fps: bool,
    /// Labels file overriding the built-in COCO names.
    pub labels: Option<PathBuf>,
    pub font: Option<PathBuf>,
    pub headless: HeadlessConfig,
}

impl AppConfig {
    /// File named by `HEADCOUNT_CONFIG`, then `HEADCOUNT_*` environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let model = file.model.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let capture_defaults = CaptureSettings::default();
        let headless_defaults = HeadlessConfig::default();

        Ok(Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            model: ModelSettings {
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                backend: model
                    .backend
                    .as_deref()
                    .unwrap_or(DEFAULT_BACKEND)
                    .parse()?,
                input_width: model.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
                input_height: model.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            capture: CaptureSettings {
                width: capture.width.unwrap_or(capture_defaults.width),
                height: capture.height.unwrap_or(capture_defaults.height),
                target_fps: capture.target_fps.unwrap_or(capture_defaults.target_fps),
            },
            detection: DetectionSettings {
                confidence: detection.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                overlap: detection.overlap.unwrap_or(DEFAULT_OVERLAP),
                person_class: detection.person_class.unwrap_or(PERSON_CLASS_ID),
                max_consecutive_failures: detection
                    .max_consecutive_failures
                    .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            },
            display: DisplaySettings {
                window_title: display
                    .window_title
                    .unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_string()),
                show_fps: display.show_fps.unwrap_or(true),
                labels: display.labels,
                font: display.font,
                headless: HeadlessConfig {
                    log_every: display.log_every.unwrap_or(headless_defaults.log_every),
                    snapshot_dir: display.snapshot_dir,
                    snapshot_every: display
                        .snapshot_every
                        .unwrap_or(headless_defaults.snapshot_every),
                },
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_string("HEADCOUNT_SOURCE") {
            self.source = source;
        }
        if let Some(path) = env_string("HEADCOUNT_MODEL") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(backend) = env_string("HEADCOUNT_BACKEND") {
            self.model.backend = backend.parse()?;
        }
        if let Some(confidence) = env_parsed("HEADCOUNT_CONFIDENCE", "a number between 0 and 1")? {
            self.detection.confidence = confidence;
        }
        if let Some(overlap) = env_parsed("HEADCOUNT_OVERLAP", "a number between 0 and 1")? {
            self.detection.overlap = overlap;
        }
        if let Some(max) = env_parsed("HEADCOUNT_MAX_FAILURES", "a non-negative integer")? {
            self.detection.max_consecutive_failures = max;
        }
        if let Some(path) = env_string("HEADCOUNT_LABELS") {
            self.display.labels = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("HEADCOUNT_FONT") {
            self.display.font = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check every setting that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        self.thresholds()?;
        self.source_spec()?;
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture size must be non-zero"));
        }
        if self.display.window_title.trim().is_empty() {
            return Err(anyhow!("window title must not be empty"));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.detection.confidence, self.detection.overlap)
    }

    pub fn source_spec(&self) -> Result<SourceSpec> {
        SourceSpec::parse(&self.source).with_context(|| format!("invalid source '{}'", self.source))
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
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

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parsed<T: FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    env_string(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| anyhow!("{} must be {}, got '{}'", key, expected, value))
        })
        .transpose()
}
