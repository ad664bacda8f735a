use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormcheckError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("Computation error: {0}")]
    Computation(#[from] ComputationError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Pose engine is not ready: {reason}")]
    NotReady { reason: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FormcheckError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn not_ready<S: Into<String>>(reason: S) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    /// Errors that end a session and send the controller back to idle
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, Self::Acquisition(_) | Self::ModelLoad(_))
    }
}

/// Capture device failures. Fatal to the attempted session, never retried automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    #[error("No capture device available: {details}")]
    DeviceUnavailable { details: String },

    #[error("Permission to use the capture device was refused")]
    PermissionDenied,

    #[error("Capture device configuration failed: {details}")]
    Configuration { details: String },

    #[error("No frames received within {timeout_ms}ms")]
    NoFrames { timeout_ms: u64 },

    #[error("Capture stream ended")]
    StreamEnded,
}

/// Pose engine initialisation failures. Blocks `start()` until a fresh load succeeds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelLoadError {
    #[error("Failed to fetch model asset '{asset}': {details}")]
    Fetch { asset: String, details: String },

    #[error("Failed to parse model asset '{asset}': {details}")]
    Parse { asset: String, details: String },

    #[error("Delegate {delegate} is not supported by backend {backend}")]
    UnsupportedDelegate { backend: String, delegate: String },

    #[error("Pose backend {backend} is unavailable: {details}")]
    BackendUnavailable { backend: String, details: String },
}

/// Frame bytes that cannot be turned into an RGB image
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameDecodeError {
    #[error("RGB frame {id} has {len} bytes, expected {width}x{height}x3")]
    Truncated {
        id: u64,
        len: usize,
        width: u32,
        height: u32,
    },

    #[error("Failed to decode JPEG frame {id}: {details}")]
    Jpeg { id: u64, details: String },
}

/// Degenerate geometry. Recovered inside the cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    #[error("Angle is undefined: {first} and {second} coincide")]
    CoincidentPoints {
        first: &'static str,
        second: &'static str,
    },

    #[error("Landmark {index} missing from a set of {len}")]
    MissingLandmark { index: usize, len: usize },

    #[error("Angle is undefined: non-finite {quantity}")]
    NonFinite { quantity: &'static str },
}

/// Per-frame engine failures. Caught per cycle; the loop keeps running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Pose engine failed: {details}")]
    Engine { details: String },

    #[error("Timestamp {timestamp_ms}ms is not after the previous {previous_ms}ms")]
    NonMonotonicTimestamp { timestamp_ms: u64, previous_ms: u64 },

    #[error("Pose has {actual} landmarks, model topology defines {expected}")]
    Topology { expected: usize, actual: usize },

    #[error("Pose engine has been disposed")]
    Disposed,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },
}

pub type Result<T> = std::result::Result<T, FormcheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fatal_classification() {
        let acquisition: FormcheckError = AcquisitionError::PermissionDenied.into();
        let model: FormcheckError = ModelLoadError::Fetch {
            asset: "pose.task".to_string(),
            details: "404".to_string(),
        }
        .into();
        let inference: FormcheckError = InferenceError::Engine {
            details: "gpu lost".to_string(),
        }
        .into();
        let computation: FormcheckError = ComputationError::CoincidentPoints {
            first: "hip",
            second: "knee",
        }
        .into();

        assert!(acquisition.is_fatal_to_session());
        assert!(model.is_fatal_to_session());
        assert!(!inference.is_fatal_to_session());
        assert!(!computation.is_fatal_to_session());
        assert!(!FormcheckError::not_ready("loading").is_fatal_to_session());
    }

    #[test]
    fn test_error_messages() {
        let err = InferenceError::NonMonotonicTimestamp {
            timestamp_ms: 10,
            previous_ms: 12,
        };
        assert_eq!(
            err.to_string(),
            "Timestamp 10ms is not after the previous 12ms"
        );

        let err = FormcheckError::component("controller", "boom");
        assert_eq!(err.to_string(), "Component error in controller: boom");
    }
}
