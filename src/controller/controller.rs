use super::cycle::{run_session, Engine, SessionContext, Shared};
use super::state::{ControllerState, LoopStats};
use crate::camera::{FrameAcquisition, StreamHandle};
use crate::classifier::{FeedbackState, PostureClassifier};
use crate::config::{ClassifierConfig, ControllerConfig, Delegate, FormcheckConfig};
use crate::display::{DisplaySink, NullDisplay};
use crate::error::{AcquisitionError, FormcheckError, ModelLoadError, Result};
use crate::events::{EventBus, FeedbackConsumer, FormcheckEvent, SessionStatus};
use crate::inference::{InferenceAdapter, PoseBackend};
use crate::landmark::{LandmarkSet, POSE_LANDMARK_COUNT};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

enum ModelSlot {
    Unloaded,
    Loading,
    Loaded(Arc<Mutex<Engine>>),
    Failed(ModelLoadError),
}

struct RunningSession {
    id: Uuid,
    generation: u64,
    stream: Arc<StreamHandle>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives acquisition, inference, classification and publishing, one cycle at a time.
///
/// At most one session runs at any moment. `start` and `stop` are serialized,
/// and results of a stopped session are never published.
pub struct LoopController {
    acquisition: FrameAcquisition,
    classifier: PostureClassifier,
    config: ControllerConfig,
    landmark_count: usize,
    consumer: Arc<dyn FeedbackConsumer>,
    display: Arc<dyn DisplaySink>,
    event_bus: Arc<EventBus>,
    model: RwLock<ModelSlot>,
    lifecycle: tokio::sync::Mutex<Option<RunningSession>>,
    generation: AtomicU64,
    shared: Arc<Shared>,
}

impl LoopController {
    pub fn builder() -> LoopControllerBuilder {
        LoopControllerBuilder::new()
    }

    /// Load the pose engine. `start` is refused until this succeeds.
    ///
    /// A running session is stopped first and any previous engine disposed.
    pub async fn load_model(
        &self,
        backend: &dyn PoseBackend,
        asset: &str,
        delegate: Delegate,
    ) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if let Some(running) = lifecycle.take() {
                info!("Stopping session {} to reload the pose model", running.id);
                let _ = self.teardown(running).await;
            }

            let previous = std::mem::replace(&mut *self.model.write(), ModelSlot::Loading);
            if let ModelSlot::Loaded(engine) = previous {
                dispose_engine(engine).await;
            }
        }

        self.event_bus
            .publish_lossy(FormcheckEvent::status(SessionStatus::ModelLoading));

        match InferenceAdapter::load(backend, asset, delegate, self.landmark_count).await {
            Ok(adapter) => {
                *self.model.write() = ModelSlot::Loaded(Arc::new(Mutex::new(Engine::new(adapter))));
                self.event_bus
                    .publish_lossy(FormcheckEvent::status(SessionStatus::Ready));
                Ok(())
            }
            Err(e) => {
                error!("Failed to load pose model '{}': {}", asset, e);
                *self.model.write() = ModelSlot::Failed(e.clone());
                self.event_bus
                    .publish_lossy(FormcheckEvent::status(SessionStatus::ModelLoadFailed));
                Err(e.into())
            }
        }
    }

    /// Acquire the camera and start cycling.
    ///
    /// Starting while a session runs replaces it with a fresh one.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        let engine = self.engine_for_start().map_err(|e| {
            warn!("Start rejected: {}", e);
            e
        })?;

        if let Some(running) = lifecycle.take() {
            info!("Session {} already running, resetting it", running.id);
            let _ = self.teardown(running).await;
        }

        let stream = match self.acquisition.acquire().await {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                error!("Could not acquire {} camera: {}", self.acquisition.device_name(), e);
                self.event_bus
                    .publish_lossy(FormcheckEvent::status(SessionStatus::AcquisitionFailed));
                return Err(e.into());
            }
        };

        let id = Uuid::new_v4();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        self.shared.reset_latest();
        self.shared.open_gate(generation);
        self.shared.set_state(ControllerState::Running);
        self.shared.record_session();

        let context = SessionContext {
            id,
            generation,
            max_fps: self.config.max_fps,
            stream: Arc::clone(&stream),
            engine,
            classifier: self.classifier.clone(),
            consumer: Arc::clone(&self.consumer),
            display: Arc::clone(&self.display),
            event_bus: Arc::clone(&self.event_bus),
            shared: Arc::clone(&self.shared),
        };
        self.event_bus
            .publish_lossy(FormcheckEvent::status(SessionStatus::Started));
        let task = tokio::spawn(run_session(context, cancel.clone()));

        *lifecycle = Some(RunningSession {
            id,
            generation,
            stream,
            cancel,
            task,
        });

        info!("Session {} started", id);
        Ok(())
    }

    /// Stop the running session, if any. Safe to call at any time.
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match lifecycle.take() {
            Some(running) => self.teardown(running).await.map_err(Into::into),
            None => {
                debug!("Stop requested with no running session");
                Ok(())
            }
        }
    }

    /// Stop and dispose the pose engine
    pub async fn shutdown(&self) -> Result<()> {
        let stopped = self.stop().await;

        let previous = std::mem::replace(&mut *self.model.write(), ModelSlot::Unloaded);
        if let ModelSlot::Loaded(engine) = previous {
            dispose_engine(engine).await;
        }

        info!("Loop controller shut down");
        stopped
    }

    pub fn state(&self) -> ControllerState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ControllerState::Running
    }

    pub fn is_model_ready(&self) -> bool {
        matches!(*self.model.read(), ModelSlot::Loaded(_))
    }

    /// Most recently published feedback of the current session
    pub fn latest_feedback(&self) -> Option<FeedbackState> {
        self.shared.latest_feedback()
    }

    /// Most recently published landmarks of the current session
    pub fn latest_landmarks(&self) -> LandmarkSet {
        self.shared.latest_landmarks()
    }

    pub fn stats(&self) -> LoopStats {
        self.shared.stats()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    fn engine_for_start(&self) -> Result<Arc<Mutex<Engine>>> {
        match &*self.model.read() {
            ModelSlot::Loaded(engine) => Ok(Arc::clone(engine)),
            ModelSlot::Failed(e) => Err(FormcheckError::ModelLoad(e.clone())),
            ModelSlot::Loading => Err(FormcheckError::not_ready("pose model is still loading")),
            ModelSlot::Unloaded => Err(FormcheckError::not_ready("pose model has not been loaded")),
        }
    }

    async fn teardown(&self, running: RunningSession) -> std::result::Result<(), AcquisitionError> {
        info!("Stopping session {}", running.id);

        running.cancel.cancel();
        // False when the loop already ended the session after losing its stream
        let live = self.shared.close_gate_for(running.generation);

        let released = running.stream.release().await;
        if let Err(e) = &released {
            warn!("Failed to release stream {}: {}", running.stream.id(), e);
        }
        self.display.clear();

        let stop_timeout = Duration::from_millis(self.config.stop_timeout_ms);
        match tokio::time::timeout(stop_timeout, running.task).await {
            Ok(Ok(())) => debug!("Session {} loop finished", running.id),
            Ok(Err(e)) => error!("Session {} loop task failed: {}", running.id, e),
            Err(_) => warn!(
                "Session {} loop did not finish within {:?}; detaching it",
                running.id, stop_timeout
            ),
        }

        if live {
            self.shared.reset_latest();
            self.shared.set_state(ControllerState::Idle);
            self.event_bus
                .publish_lossy(FormcheckEvent::status(SessionStatus::Stopped));
        } else {
            debug!("Session {} had already ended with its stream", running.id);
        }

        released
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut().take() {
            warn!(
                "Loop controller dropped while session {} was running",
                running.id
            );
            running.cancel.cancel();
            self.shared.close_gate();
        }
    }
}

async fn dispose_engine(engine: Arc<Mutex<Engine>>) {
    // A detached inference call may still hold the engine
    let disposal = tokio::task::spawn_blocking(move || engine.lock().adapter.dispose());
    if let Err(e) = disposal.await {
        error!("Failed to dispose pose engine: {}", e);
    }
}

/// Builder for [`LoopController`]
pub struct LoopControllerBuilder {
    acquisition: Option<FrameAcquisition>,
    classifier: ClassifierConfig,
    config: ControllerConfig,
    landmark_count: usize,
    consumer: Option<Arc<dyn FeedbackConsumer>>,
    display: Option<Arc<dyn DisplaySink>>,
    event_bus: Option<Arc<EventBus>>,
}

impl LoopControllerBuilder {
    pub fn new() -> Self {
        Self {
            acquisition: None,
            classifier: ClassifierConfig::default(),
            config: ControllerConfig::default(),
            landmark_count: POSE_LANDMARK_COUNT,
            consumer: None,
            display: None,
            event_bus: None,
        }
    }

    /// Take classifier, controller and topology settings from `config`
    pub fn config(mut self, config: &FormcheckConfig) -> Self {
        self.classifier = config.classifier.clone();
        self.config = config.controller.clone();
        self.landmark_count = config.model.landmark_count;
        self
    }

    pub fn acquisition(mut self, acquisition: FrameAcquisition) -> Self {
        self.acquisition = Some(acquisition);
        self
    }

    pub fn classifier_config(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn controller_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn landmark_count(mut self, landmark_count: usize) -> Self {
        self.landmark_count = landmark_count;
        self
    }

    /// Defaults to the event bus
    pub fn feedback_consumer(mut self, consumer: Arc<dyn FeedbackConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Defaults to [`NullDisplay`]
    pub fn display(mut self, display: Arc<dyn DisplaySink>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<LoopController> {
        let acquisition = self
            .acquisition
            .ok_or_else(|| FormcheckError::system("Frame acquisition must be specified"))?;

        if self.config.max_fps == 0 {
            return Err(FormcheckError::system("controller.max_fps must be positive"));
        }
        self.classifier.validate()?;

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new(100)));
        let consumer = self
            .consumer
            .unwrap_or_else(|| Arc::clone(&event_bus) as Arc<dyn FeedbackConsumer>);
        let display = self
            .display
            .unwrap_or_else(|| Arc::new(NullDisplay) as Arc<dyn DisplaySink>);

        Ok(LoopController {
            acquisition,
            classifier: PostureClassifier::new(self.classifier),
            config: self.config,
            landmark_count: self.landmark_count,
            consumer,
            display,
            event_bus,
            model: RwLock::new(ModelSlot::Unloaded),
            lifecycle: tokio::sync::Mutex::new(None),
            generation: AtomicU64::new(0),
            shared: Arc::new(Shared::new()),
        })
    }
}

impl Default for LoopControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
