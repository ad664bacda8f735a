pub mod app;
pub mod camera;
pub mod classifier;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod events;
pub mod frame;
pub mod geometry;
pub mod inference;
pub mod keyboard_input;
pub mod landmark;

#[cfg(test)]
pub(crate) mod fixtures;

pub use app::{ComponentState, FormcheckApp, ShutdownReason};
pub use camera::{
    CameraInterface, CaptureConstraints, CaptureDevice, FrameAcquisition, StreamHandle,
};
#[cfg(any(test, feature = "testing"))]
pub use camera::{MockBehavior, MockCaptureDevice};
pub use classifier::{classify, FeedbackState, PostureClassifier};
pub use config::FormcheckConfig;
pub use controller::{ControllerState, LoopController, LoopControllerBuilder, LoopStats};
pub use display::{DisplaySink, NullDisplay, OverlayRenderer};
pub use error::{FormcheckError, Result};
pub use events::{
    EventBus, EventFilter, EventReceiver, FeedbackConsumer, FormcheckEvent, SessionStatus,
};
pub use frame::{FrameData, FrameFormat};
pub use inference::{InferenceAdapter, OnnxBackend, PoseBackend, PoseModel, ReplayBackend};
#[cfg(any(test, feature = "testing"))]
pub use inference::ScriptedBackend;
pub use keyboard_input::KeyboardInputHandler;
pub use landmark::{Landmark, LandmarkSet, PoseLandmark};
