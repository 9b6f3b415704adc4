//! Configuration management for the viewer and edge processes

use crate::displacement::EstimatorConfig;
use crate::session::SessionDescriptor;
use crate::supervisor::RetryPolicy;
use crate::transport::{WireFormat, DEFAULT_MAX_FRAME_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete camlink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub viewer: ViewerConfig,

    #[serde(default)]
    pub displacement: DisplacementConfig,

    #[serde(default)]
    pub edge: EdgeConfig,
}

/// Viewer-side connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Liveness probe period (milliseconds)
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which a connection is declared dead (milliseconds)
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Consecutive failed reconnects before giving up (0 = unlimited)
    #[serde(default)]
    pub max_reconnect_attempts: u32,

    /// Largest accepted frame payload (bytes)
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default)]
    pub wire_format: WireFormat,

    /// Statistics reporting interval (seconds)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,

    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraEndpoint>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            frame_timeout_ms: default_frame_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: 0,
            max_frame_bytes: default_max_frame_bytes(),
            wire_format: WireFormat::default(),
            stats_interval_seconds: default_stats_interval(),
            cameras: default_cameras(),
        }
    }
}

impl ViewerConfig {
    /// Session descriptor for one configured camera
    pub fn descriptor(&self, camera: &CameraEndpoint) -> SessionDescriptor {
        SessionDescriptor {
            label: camera.label.clone(),
            host: camera.host.clone(),
            port: camera.port,
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            frame_timeout: Duration::from_millis(self.frame_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_frame_bytes: self.max_frame_bytes,
            wire_format: self.wire_format,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_millis(self.reconnect_interval_ms),
            max_attempts: (self.max_reconnect_attempts > 0).then_some(self.max_reconnect_attempts),
        }
    }
}

/// One camera endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEndpoint {
    pub label: String,
    pub host: String,
    #[serde(default = "default_camera_port")]
    pub port: u16,
}

impl CameraEndpoint {
    pub fn new(label: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            label: label.into(),
            host: host.into(),
            port,
        }
    }
}

/// Displacement monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplacementConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Label of the camera used as the source of the offset
    #[serde(default = "default_reference")]
    pub reference: String,

    #[serde(default = "default_target")]
    pub target: String,

    /// Estimation period (milliseconds)
    #[serde(default = "default_displacement_interval_ms")]
    pub interval_ms: u64,

    /// Physical units per pixel
    #[serde(default = "default_units_per_pixel")]
    pub units_per_pixel: f64,

    /// Hysteresis threshold in physical units
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_max_features")]
    pub max_features: usize,

    #[serde(default = "default_fast_threshold")]
    pub fast_threshold: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hamming_distance: Option<u32>,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reference: default_reference(),
            target: default_target(),
            interval_ms: default_displacement_interval_ms(),
            units_per_pixel: default_units_per_pixel(),
            threshold: default_threshold(),
            max_features: default_max_features(),
            fast_threshold: default_fast_threshold(),
            max_hamming_distance: None,
        }
    }
}

impl DisplacementConfig {
    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            units_per_pixel: self.units_per_pixel,
            threshold: self.threshold,
            max_features: self.max_features,
            fast_threshold: self.fast_threshold,
            max_hamming_distance: self.max_hamming_distance,
            ..EstimatorConfig::default()
        }
    }
}

/// Edge sender settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub wire_format: WireFormat,

    /// Frames per second
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Frame width in pixels (test pattern only)
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels (test pattern only)
    #[serde(default = "default_height")]
    pub height: u32,

    /// JPEG quality (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Directory of JPEG files to stream; a test pattern is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            wire_format: WireFormat::default(),
            fps: default_fps(),
            width: default_width(),
            height: default_height(),
            quality: default_quality(),
            directory: None,
        }
    }
}

// Default value functions
fn default_heartbeat_interval_ms() -> u64 {
    2000
}
fn default_frame_timeout_ms() -> u64 {
    5000
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
fn default_reconnect_interval_ms() -> u64 {
    5000
}
fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
fn default_stats_interval() -> u64 {
    10
}
fn default_camera_port() -> u16 {
    8000
}
fn default_cameras() -> Vec<CameraEndpoint> {
    vec![
        CameraEndpoint::new("camera1", "192.168.0.10", 8000),
        CameraEndpoint::new("camera2", "192.168.0.13", 8000),
    ]
}
fn default_true() -> bool {
    true
}
fn default_reference() -> String {
    "camera1".to_string()
}
fn default_target() -> String {
    "camera2".to_string()
}
fn default_displacement_interval_ms() -> u64 {
    100
}
fn default_units_per_pixel() -> f64 {
    0.1
}
fn default_threshold() -> f64 {
    1.0
}
fn default_max_features() -> usize {
    500
}
fn default_fast_threshold() -> u8 {
    20
}
fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}
fn default_fps() -> u32 {
    30
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_quality() -> u8 {
    85
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Loads configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_viewer()?;
        if self.displacement.enabled {
            self.validate_displacement()?;
        }
        self.validate_edge()
    }

    fn validate_viewer(&self) -> Result<(), ConfigError> {
        let cfg = &self.viewer;

        for (name, value) in [
            ("heartbeat_interval_ms", cfg.heartbeat_interval_ms),
            ("frame_timeout_ms", cfg.frame_timeout_ms),
            ("connect_timeout_ms", cfg.connect_timeout_ms),
            ("reconnect_interval_ms", cfg.reconnect_interval_ms),
            ("stats_interval_seconds", cfg.stats_interval_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("viewer.{} must be > 0", name)));
            }
        }

        // A healthy but idle stream must survive at least one heartbeat
        if cfg.frame_timeout_ms <= cfg.heartbeat_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "viewer.frame_timeout_ms ({}) must be greater than heartbeat_interval_ms ({})",
                cfg.frame_timeout_ms, cfg.heartbeat_interval_ms
            )));
        }

        if cfg.max_frame_bytes == 0 || cfg.max_frame_bytes > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "viewer.max_frame_bytes must be between 1 and {}, got {}",
                u32::MAX,
                cfg.max_frame_bytes
            )));
        }

        let mut labels = HashSet::new();
        for camera in &cfg.cameras {
            if camera.label.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "camera label must not be empty".to_string(),
                ));
            }
            if !labels.insert(camera.label.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate camera label '{}'",
                    camera.label
                )));
            }
            if camera.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{}: host must not be empty",
                    camera.label
                )));
            }
            if camera.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{}: port must be > 0",
                    camera.label
                )));
            }
        }

        Ok(())
    }

    fn validate_displacement(&self) -> Result<(), ConfigError> {
        let cfg = &self.displacement;

        if cfg.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "displacement.interval_ms must be > 0".to_string(),
            ));
        }

        if !(cfg.units_per_pixel.is_finite() && cfg.units_per_pixel > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "displacement.units_per_pixel must be > 0, got {}",
                cfg.units_per_pixel
            )));
        }

        if !(cfg.threshold.is_finite() && cfg.threshold >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "displacement.threshold must be >= 0, got {}",
                cfg.threshold
            )));
        }

        if cfg.max_features == 0 {
            return Err(ConfigError::Invalid(
                "displacement.max_features must be > 0".to_string(),
            ));
        }

        if cfg.reference == cfg.target {
            return Err(ConfigError::Invalid(format!(
                "displacement reference and target must differ, both are '{}'",
                cfg.reference
            )));
        }

        for name in [&cfg.reference, &cfg.target] {
            if !self.viewer.cameras.iter().any(|c| &c.label == name) {
                return Err(ConfigError::Invalid(format!(
                    "displacement camera '{}' is not configured",
                    name
                )));
            }
        }

        Ok(())
    }

    fn validate_edge(&self) -> Result<(), ConfigError> {
        let cfg = &self.edge;

        if cfg.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("edge.bind must not be empty".to_string()));
        }

        if cfg.width == 0 || cfg.height == 0 {
            return Err(ConfigError::Invalid(
                "edge: width and height must be > 0".to_string(),
            ));
        }

        if cfg.fps == 0 || cfg.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "edge: FPS must be between 1 and 120, got {}",
                cfg.fps
            )));
        }

        if cfg.quality == 0 || cfg.quality > 100 {
            return Err(ConfigError::Invalid(format!(
                "edge: quality must be between 1 and 100, got {}",
                cfg.quality
            )));
        }

        Ok(())
    }

    /// Saves configuration to TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.viewer.cameras.len(), 2);
        assert_eq!(config.viewer.cameras[0].host, "192.168.0.10");
        assert_eq!(config.viewer.cameras[1].host, "192.168.0.13");
        assert_eq!(config.viewer.wire_format, WireFormat::Envelope);
        assert_eq!(config.displacement.units_per_pixel, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.viewer.heartbeat_interval_ms, 2000);
        assert_eq!(config.viewer.frame_timeout_ms, 5000);
        assert_eq!(config.edge.bind, "0.0.0.0:8000");
        assert!(config.edge.directory.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[viewer]
heartbeat_interval_ms = 500
frame_timeout_ms = 1500
max_reconnect_attempts = 4
wire_format = "raw"

[[viewer.cameras]]
label = "left"
host = "10.0.0.2"
port = 9000

[[viewer.cameras]]
label = "right"
host = "10.0.0.3"

[displacement]
reference = "left"
target = "right"
units_per_pixel = 0.25
max_hamming_distance = 64

[edge]
fps = 15
directory = "/srv/frames"
        "#;

        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.viewer.wire_format, WireFormat::Raw);
        assert_eq!(config.viewer.cameras[1].port, 8000);

        let descriptor = config.viewer.descriptor(&config.viewer.cameras[0]);
        assert_eq!(descriptor.address(), "10.0.0.2:9000");
        assert_eq!(descriptor.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(descriptor.frame_timeout, Duration::from_millis(1500));

        let policy = config.viewer.retry_policy();
        assert_eq!(policy.max_attempts, Some(4));
        assert_eq!(policy.interval, Duration::from_millis(5000));

        let estimator = config.displacement.estimator_config();
        assert_eq!(estimator.units_per_pixel, 0.25);
        assert_eq!(estimator.max_hamming_distance, Some(64));

        assert_eq!(config.edge.fps, 15);
        assert_eq!(config.edge.directory, Some(PathBuf::from("/srv/frames")));
    }

    #[test]
    fn test_zero_attempts_means_unlimited() {
        assert_eq!(ViewerConfig::default().retry_policy().max_attempts, None);
    }

    #[test]
    fn test_timeout_must_exceed_heartbeat() {
        let toml = r#"
[viewer]
heartbeat_interval_ms = 2000
frame_timeout_ms = 2000
        "#;

        assert!(matches!(Config::from_str(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let toml = r#"
[[viewer.cameras]]
label = "camera1"
host = "10.0.0.2"

[[viewer.cameras]]
label = "camera1"
host = "10.0.0.3"
        "#;

        assert!(matches!(Config::from_str(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_displacement_camera_rejected() {
        let toml = r#"
[displacement]
reference = "camera1"
target = "camera9"
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_displacement_checks_skipped_when_disabled() {
        let toml = r#"
[displacement]
enabled = false
reference = "camera1"
target = "camera1"
        "#;

        assert!(Config::from_str(toml).is_ok());
    }

    #[test]
    fn test_invalid_edge_quality() {
        let toml = r#"
[edge]
quality = 0
        "#;

        assert!(Config::from_str(toml).is_err());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_str("[viewer\nport = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camlink.toml");

        let mut config = Config::default();
        config.viewer.max_reconnect_attempts = 7;
        config.edge.quality = 60;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.viewer.max_reconnect_attempts, 7);
        assert_eq!(loaded.edge.quality, 60);
        assert_eq!(loaded.viewer.cameras, config.viewer.cameras);
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.viewer.cameras, default_cameras());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
