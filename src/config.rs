use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FormcheckConfig {
    pub camera: CameraConfig,
    pub model: ModelConfig,
    pub classifier: ClassifierConfig,
    pub controller: ControllerConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Frame source backend
    #[serde(default = "default_camera_backend")]
    pub backend: CameraBackend,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Requested resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// How long acquisition waits for the first frame
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Pose engine backend
    #[serde(default = "default_model_backend")]
    pub backend: ModelBackend,

    /// Model asset reference handed to the backend
    #[serde(default = "default_model_asset")]
    pub asset: String,

    /// Compute delegate for the engine
    #[serde(default = "default_delegate")]
    pub delegate: Delegate,

    /// Landmarks per detected pose in the model topology
    #[serde(default = "default_landmark_count")]
    pub landmark_count: usize,

    /// Square input edge, in pixels, the model expects
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Hip, knee and ankle must all be strictly above this visibility
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,

    /// Knee angles above this are standing
    #[serde(default = "default_stand_above")]
    pub stand_above: f64,

    /// Knee angles above this (and not standing) are descending
    #[serde(default = "default_descend_above")]
    pub descend_above: f64,

    /// Knee angles above this (and not descending) are at good depth
    #[serde(default = "default_good_depth_above")]
    pub good_depth_above: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControllerConfig {
    /// Upper bound on cycles per second
    #[serde(default = "default_max_fps")]
    pub max_fps: u32,

    /// How long stop() waits for the cycle task before detaching it
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    Synthetic,
    Gstreamer,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// ONNX Runtime running a BlazePose landmark model
    Onnx,
    /// Recorded landmark stream, for development without a model
    Replay,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
    Cpu,
    Gpu,
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delegate::Cpu => write!(f, "CPU"),
            Delegate::Gpu => write!(f, "GPU"),
        }
    }
}

impl FormcheckConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("formcheck.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.backend", "gstreamer")?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.ready_timeout_ms", default_ready_timeout_ms())?
            .set_default("model.backend", "onnx")?
            .set_default("model.asset", default_model_asset())?
            .set_default("model.delegate", "cpu")?
            .set_default("model.landmark_count", default_landmark_count() as i64)?
            .set_default("model.input_size", default_input_size())?
            .set_default(
                "classifier.visibility_threshold",
                default_visibility_threshold() as f64,
            )?
            .set_default("classifier.stand_above", default_stand_above())?
            .set_default("classifier.descend_above", default_descend_above())?
            .set_default("classifier.good_depth_above", default_good_depth_above())?
            .set_default("controller.max_fps", default_max_fps())?
            .set_default("controller.stop_timeout_ms", default_stop_timeout_ms())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // FORMCHECK_CAMERA__FPS=15 overrides camera.fps
            .add_source(
                Environment::with_prefix("FORMCHECK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: FormcheckConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.ready_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera ready_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.model.asset.trim().is_empty() {
            return Err(ConfigError::Message(
                "Model asset must not be empty".to_string(),
            ));
        }

        if self.model.landmark_count == 0 {
            return Err(ConfigError::Message(
                "Model landmark_count must be greater than 0".to_string(),
            ));
        }

        if self.model.input_size == 0 {
            return Err(ConfigError::Message(
                "Model input_size must be greater than 0".to_string(),
            ));
        }

        self.classifier.validate()?;

        if self.controller.max_fps == 0 {
            return Err(ConfigError::Message(
                "Controller max_fps must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ClassifierConfig {
    /// Bands must be strictly descending inside [0, 180]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.visibility_threshold) {
            return Err(ConfigError::Message(
                "Classifier visibility_threshold must be within [0, 1]".to_string(),
            ));
        }

        let ordered = 180.0 >= self.stand_above
            && self.stand_above > self.descend_above
            && self.descend_above > self.good_depth_above
            && self.good_depth_above >= 0.0;

        if !ordered {
            return Err(ConfigError::Message(format!(
                "Classifier bands must satisfy 180 >= stand_above ({}) > descend_above ({}) > good_depth_above ({}) >= 0",
                self.stand_above, self.descend_above, self.good_depth_above
            )));
        }

        Ok(())
    }
}

impl Default for FormcheckConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            model: ModelConfig::default(),
            classifier: ClassifierConfig::default(),
            controller: ControllerConfig::default(),
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: default_camera_backend(),
            index: default_camera_index(),
            resolution: default_camera_resolution(),
            fps: default_camera_fps(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_model_backend(),
            asset: default_model_asset(),
            delegate: default_delegate(),
            landmark_count: default_landmark_count(),
            input_size: default_input_size(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            stand_above: default_stand_above(),
            descend_above: default_descend_above(),
            good_depth_above: default_good_depth_above(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_fps: default_max_fps(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

// Default value functions
fn default_camera_backend() -> CameraBackend {
    CameraBackend::Gstreamer
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_ready_timeout_ms() -> u64 {
    5000
}

fn default_model_backend() -> ModelBackend {
    ModelBackend::Onnx
}
fn default_model_asset() -> String {
    "models/pose_landmark_lite.onnx".to_string()
}
fn default_delegate() -> Delegate {
    Delegate::Cpu
}
fn default_landmark_count() -> usize {
    crate::landmark::POSE_LANDMARK_COUNT
}
fn default_input_size() -> u32 {
    256
}

fn default_visibility_threshold() -> f32 {
    0.8
}
fn default_stand_above() -> f64 {
    160.0
}
fn default_descend_above() -> f64 {
    100.0
}
fn default_good_depth_above() -> f64 {
    80.0
}

fn default_max_fps() -> u32 {
    30
}
fn default_stop_timeout_ms() -> u64 {
    500
}

fn default_event_bus_capacity() -> usize {
    100
}
