use crate::permission::PermissionStatus;
use crate::platform::Platform;
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub permission: PermissionConfig,
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.camera.validate()?;
        self.surface.validate()?;
        self.sampler.validate()?;
        self.model.validate()
    }
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Front,
    Back,
}

#[derive(Clone, Deserialize, Debug)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: i32,
    #[serde(default = "default_stream_fps")]
    pub stream_fps: u64,
    #[serde(default = "default_facing")]
    pub facing: Facing,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            stream_fps: default_stream_fps(),
            facing: default_facing(),
        }
    }
}

fn default_stream_fps() -> u64 {
    60
}

fn default_facing() -> Facing {
    Facing::Back
}

fn fps_to_delay_ms(fps: u64) -> u64 {
    (1000.0 / fps as f64).round() as u64
}

impl CameraConfig {
    pub fn get_stream_delay_ms(&self) -> u64 {
        fps_to_delay_ms(self.stream_fps)
    }
}

impl Validatable for CameraConfig {
    fn validate(&self) -> Result<(), String> {
        if self.stream_fps == 0 {
            return Err("camera.stream_fps must be at least 1".into());
        }
        if self.device_index < 0 {
            return Err(format!(
                "camera.device_index must not be negative, got {}",
                self.device_index
            ));
        }
        Ok(())
    }
}

/// Shape of the tensor each camera frame is resized into.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
pub struct SurfaceConfig {
    #[serde(default = "default_resize")]
    pub resize_height: u32,
    #[serde(default = "default_resize")]
    pub resize_width: u32,
    #[serde(default = "default_resize_depth")]
    pub resize_depth: u32,
}

fn default_resize() -> u32 {
    128
}

fn default_resize_depth() -> u32 {
    3
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            resize_height: default_resize(),
            resize_width: default_resize(),
            resize_depth: default_resize_depth(),
        }
    }
}

impl Validatable for SurfaceConfig {
    fn validate(&self) -> Result<(), String> {
        if self.resize_height == 0 || self.resize_width == 0 {
            return Err("surface resize dimensions must be non-zero".into());
        }
        if self.resize_depth != 3 {
            return Err(format!(
                "surface.resize_depth must be 3 (RGB), got {}",
                self.resize_depth
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Deserialize, Debug)]
pub struct SamplerConfig {
    #[serde(default = "default_detect_every")]
    pub detect_every: u64,
    #[serde(default)]
    pub detection_enabled: bool,
}

fn default_detect_every() -> u64 {
    60
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            detect_every: default_detect_every(),
            detection_enabled: false,
        }
    }
}

impl Validatable for SamplerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.detect_every == 0 {
            return Err("sampler.detect_every must be at least 1".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelSource {
    Bundled { model_dir: PathBuf, model_file: String },
    Remote { url: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub source: ModelSource,
    pub labels_dir: PathBuf,
    pub labels_file: String,
    #[serde(default = "default_min_probability")]
    pub min_probability: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

fn default_min_probability() -> f32 {
    0.5
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_input_size() -> u32 {
    640
}

fn default_output_name() -> String {
    "output0".into()
}

fn default_num_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ModelConfig {
    pub fn get_labels_path(&self) -> PathBuf {
        self.labels_dir.join(&self.labels_file)
    }

    pub fn get_model_path(&self) -> Option<PathBuf> {
        match &self.source {
            ModelSource::Bundled {
                model_dir,
                model_file,
            } => Some(model_dir.join(model_file)),
            ModelSource::Remote { .. } => None,
        }
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if let ModelSource::Remote { url } = &self.source {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Model url must be http(s): {}", url));
            }
        }
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(format!(
                "model.min_probability must be within [0, 1], got {}",
                self.min_probability
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "model.iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            ));
        }
        if self.input_size == 0 {
            return Err("model.input_size must be non-zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PermissionConfig {
    #[default]
    Device,
    Static {
        status: PermissionStatus,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| ConfigError::Message(format!("Failed to read current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigError::Message)?;

    let builder = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("TC")
                .prefix_separator("_")
                .separator("__"),
        );

    build_configuration(builder)
}

pub fn build_configuration(builder: ConfigBuilder<DefaultState>) -> Result<Config, ConfigError> {
    let config: Config = builder.build()?.try_deserialize::<Config>()?;

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn builder_from(yaml: &str) -> ConfigBuilder<DefaultState> {
        config::Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml))
    }

    fn labels_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
    }

    fn remote_yaml(extra: &str) -> String {
        format!(
            r#"
server:
  host: 127.0.0.1
  port: 8000
log_level: debug
model:
  source:
    kind: remote
    url: https://example.com/ssd.onnx
  labels_dir: {}
  labels_file: coco_labels.txt
{}
"#,
            labels_dir().display(),
            extra
        )
    }

    #[test]
    fn test_defaults_applied() {
        let config = build_configuration(builder_from(&remote_yaml(""))).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.camera.stream_fps, 60);
        assert_eq!(config.camera.facing, Facing::Back);
        assert_eq!(config.surface, SurfaceConfig::default());
        assert_eq!(config.sampler.detect_every, 60);
        assert!(!config.sampler.detection_enabled);
        assert_eq!(config.permission, PermissionConfig::Device);
        assert_eq!(config.model.output_name, "output0");
        assert_eq!(config.model.get_model_path(), None);
    }

    #[test]
    fn test_static_permission_and_platform() {
        let yaml = remote_yaml(
            r#"
platform: web
permission:
  kind: static
  status: denied
"#,
        );
        let config = build_configuration(builder_from(&yaml)).unwrap();

        assert_eq!(config.platform, Platform::Web);
        assert_eq!(
            config.permission,
            PermissionConfig::Static {
                status: PermissionStatus::Denied
            }
        );
    }

    #[test]
    fn test_rejects_zero_detect_every() {
        let yaml = remote_yaml(
            r#"
sampler:
  detect_every: 0
"#,
        );
        assert!(build_configuration(builder_from(&yaml)).is_err());
    }

    #[test]
    fn test_missing_bundled_model_still_loads() {
        let yaml = format!(
            r#"
server:
  host: 127.0.0.1
  port: 8000
log_level: info
model:
  source:
    kind: bundled
    model_dir: /nonexistent
    model_file: model.onnx
  labels_dir: {}
  labels_file: coco_labels.txt
"#,
            labels_dir().display()
        );
        // The file is only opened by the model loader in the background.
        let config = build_configuration(builder_from(&yaml)).unwrap();
        assert_eq!(
            config.model.get_model_path(),
            Some(PathBuf::from("/nonexistent/model.onnx"))
        );
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let yaml = remote_yaml("").replace("log_level: debug", "log_level: trace");
        assert!(build_configuration(builder_from(&yaml)).is_err());
    }

    #[test]
    fn test_stream_delay() {
        let camera = CameraConfig::default();
        assert_eq!(camera.get_stream_delay_ms(), 17);
    }
}
