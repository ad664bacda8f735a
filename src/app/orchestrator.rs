use super::types::{ComponentState, ShutdownReason};
use crate::camera::{CameraInterface, CaptureDevice, FrameAcquisition};
use crate::config::{FormcheckConfig, ModelBackend};
use crate::controller::LoopController;
use crate::display::OverlayRenderer;
use crate::error::Result;
use crate::events::EventBus;
use crate::inference::{OnnxBackend, PoseBackend, ReplayBackend};
use crate::keyboard_input::KeyboardInputHandler;
use crate::landmark::POSE_LANDMARK_COUNT;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

/// Wires configuration, camera, pose engine and loop controller into one application
pub struct FormcheckApp {
    pub(super) config: FormcheckConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) backend: Arc<dyn PoseBackend>,
    pub(super) controller: Arc<LoopController>,
    pub(super) display: Arc<OverlayRenderer>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
}

impl FormcheckApp {
    /// Create the application with the camera and pose backends named in `config`
    pub fn new(config: FormcheckConfig) -> Result<Self> {
        let device: Arc<dyn CaptureDevice> = Arc::new(CameraInterface::new(config.camera.clone()));
        let backend: Arc<dyn PoseBackend> = match config.model.backend {
            ModelBackend::Onnx => Arc::new(OnnxBackend::new(
                config.model.input_size,
                POSE_LANDMARK_COUNT,
            )),
            ModelBackend::Replay => Arc::new(ReplayBackend::new()),
        };

        Self::with_components(config, device, backend)
    }

    /// Create the application around an explicit capture device and pose backend
    pub fn with_components(
        config: FormcheckConfig,
        device: Arc<dyn CaptureDevice>,
        backend: Arc<dyn PoseBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let display = Arc::new(OverlayRenderer::new());
        let device_name = device.name();
        let acquisition = FrameAcquisition::from_config(device, &config.camera);

        let controller = LoopController::builder()
            .config(&config)
            .acquisition(acquisition)
            .display(display.clone())
            .event_bus(Arc::clone(&event_bus))
            .build()?;

        info!(
            "Formcheck application created ({} camera, {} pose backend)",
            device_name,
            backend.name()
        );

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let keyboard_handler = Some(KeyboardInputHandler::new(Arc::clone(&event_bus)));

        Ok(Self {
            config,
            event_bus,
            backend,
            controller: Arc::new(controller),
            display,
            keyboard_handler,
            keyboard_enabled: false,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
        })
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn config(&self) -> &FormcheckConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn controller(&self) -> Arc<LoopController> {
        Arc::clone(&self.controller)
    }

    /// Latest composed camera image with the skeleton overlay
    pub fn display(&self) -> Arc<OverlayRenderer> {
        Arc::clone(&self.display)
    }
}
