use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{FaceLockError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/facelock.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub door: DoorConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
    /// Consecutive failed captures after which the camera counts as lost.
    #[serde(default = "default_max_capture_failures")]
    pub max_capture_failures: u32,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 3 }
fn default_warmup_delay() -> u64 { 50 }
fn default_max_capture_failures() -> u32 { 5 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
            max_capture_failures: default_max_capture_failures(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_detector_path")]
    pub detector_path: PathBuf,
    #[serde(default = "default_recognizer_path")]
    pub recognizer_path: PathBuf,
}

fn default_detector_path() -> PathBuf { PathBuf::from("models/face_detector.onnx") }
fn default_recognizer_path() -> PathBuf { PathBuf::from("models/face_recognizer.onnx") }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: default_detector_path(),
            recognizer_path: default_recognizer_path(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_input")]
    pub input_width: u32,
    #[serde(default = "default_detector_input")]
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,
}

fn default_detector_input() -> u32 { 640 }
fn default_detection_confidence() -> f32 { 0.5 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: default_detector_input(),
            input_height: default_detector_input(),
            detection_confidence: default_detection_confidence(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default = "default_recognizer_input")]
    pub input_size: u32,
    #[serde(default = "default_normalization_value")]
    pub normalization_value: f32,
}

fn default_recognizer_input() -> u32 { 112 }
fn default_normalization_value() -> f32 { 127.5 }

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: default_recognizer_input(),
            normalization_value: default_normalization_value(),
        }
    }
}

/// Thresholds for turning an embedding into an access decision.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchingConfig {
    /// A candidate at or beyond this distance is not reported at all.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
    /// Minimum confidence (0-100) required to unlock.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: i32,
}

fn default_distance_threshold() -> f32 { 0.6 }
fn default_confidence_threshold() -> i32 { 85 }

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DoorConfig {
    #[serde(default = "default_unlock_duration")]
    pub unlock_duration_secs: u32,
    #[serde(default = "default_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub countdown_interval_ms: u64,
}

fn default_unlock_duration() -> u32 { 10 }
fn default_interval_ms() -> u64 { 1000 }

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            unlock_duration_secs: default_unlock_duration(),
            tick_interval_ms: default_interval_ms(),
            countdown_interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
}

fn default_sample_count() -> usize { 10 }

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self { sample_count: default_sample_count() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Overrides the platform data directory when set.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_speech_command")]
    pub command: String,
}

fn default_speech_command() -> String { "spd-say".to_string() }

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: default_speech_command(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

fn default_optimization_level() -> u32 { 3 }

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceLockError::Config(format!(
                "Config file not found: {}. Please create it from the example.", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceLockError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceLockError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceLockError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if !(self.matching.distance_threshold > 0.0) {
            return Err(FaceLockError::Config(format!(
                "Distance threshold must be positive, got {}",
                self.matching.distance_threshold
            )));
        }
        if self.matching.confidence_threshold < 0 || self.matching.confidence_threshold > 100 {
            return Err(FaceLockError::Config(format!(
                "Confidence threshold must be between 0 and 100, got {}",
                self.matching.confidence_threshold
            )));
        }
        if self.detector.detection_confidence < 0.0 || self.detector.detection_confidence > 1.0 {
            return Err(FaceLockError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.detection_confidence
            )));
        }

        if self.door.unlock_duration_secs < 1 || self.door.unlock_duration_secs > 300 {
            return Err(FaceLockError::Config(format!(
                "Unlock duration must be between 1 and 300 seconds, got {}",
                self.door.unlock_duration_secs
            )));
        }
        if self.door.tick_interval_ms == 0 || self.door.countdown_interval_ms == 0 {
            return Err(FaceLockError::Config(
                "Tick and countdown intervals must be non-zero".into()
            ));
        }

        if self.enrollment.sample_count == 0 || self.enrollment.sample_count > 100 {
            return Err(FaceLockError::Config(format!(
                "Enrollment sample count must be between 1 and 100, got {}",
                self.enrollment.sample_count
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(FaceLockError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(FaceLockError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }
        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceLockError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.matching.distance_threshold, 0.6);
        assert_eq!(config.matching.confidence_threshold, 85);
        assert_eq!(config.door.unlock_duration_secs, 10);
        assert_eq!(config.door.tick_interval_ms, 1000);
        assert_eq!(config.enrollment.sample_count, 10);
        assert!(!config.speech.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = Config::from_toml(
            "[matching]\nconfidence_threshold = 90\n\n[door]\nunlock_duration_secs = 5\n",
        )
        .unwrap();
        assert_eq!(config.matching.confidence_threshold, 90);
        assert_eq!(config.matching.distance_threshold, 0.6);
        assert_eq!(config.door.unlock_duration_secs, 5);
        assert_eq!(config.camera.width, 640);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(Config::from_toml("[matching]\nconfidence_threshold = 150\n").is_err());
        assert!(Config::from_toml("[enrollment]\nsample_count = 0\n").is_err());
        assert!(Config::from_toml("[matching]\ndistance_threshold = 0.0\n").is_err());
        assert!(Config::from_toml("[door]\ntick_interval_ms = 0\n").is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load_from_path(Path::new("/nonexistent/facelock.toml")).unwrap_err();
        assert!(matches!(err, FaceLockError::Config(_)));
    }

    #[test]
    fn shipped_config_parses() {
        let config = Config::from_toml(include_str!("../../configs/facelock.toml")).unwrap();
        assert_eq!(config.camera.max_capture_failures, 5);
        assert_eq!(config.speech.command, "spd-say");
        assert!(config.storage.data_dir.is_none());
    }
}
