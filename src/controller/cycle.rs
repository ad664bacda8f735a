use super::scheduler::{FrameTicker, TimestampClock};
use super::state::{ControllerState, LoopStats};
use crate::camera::StreamHandle;
use crate::classifier::{FeedbackState, PostureClassifier};
use crate::display::DisplaySink;
use crate::error::{AcquisitionError, InferenceError};
use crate::events::{EventBus, FeedbackConsumer, FormcheckEvent, SessionStatus};
use crate::frame::FrameData;
use crate::inference::InferenceAdapter;
use crate::landmark::LandmarkSet;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// A loaded pose engine and the timestamps issued to it
pub(super) struct Engine {
    pub(super) adapter: InferenceAdapter,
    pub(super) clock: TimestampClock,
}

impl Engine {
    pub(super) fn new(adapter: InferenceAdapter) -> Self {
        Self {
            adapter,
            clock: TimestampClock::new(),
        }
    }

    fn detect(&mut self, frame: &FrameData) -> Result<LandmarkSet, InferenceError> {
        let timestamp_ms = self.clock.next();
        self.adapter.run(frame, timestamp_ms)
    }
}

/// Controller state visible outside the loop task
pub(super) struct Shared {
    /// Generation allowed to publish; `None` while no session is live
    gate: Mutex<Option<u64>>,
    state: RwLock<ControllerState>,
    latest: RwLock<(Option<FeedbackState>, LandmarkSet)>,
    stats: Mutex<LoopStats>,
}

impl Shared {
    pub(super) fn new() -> Self {
        Self {
            gate: Mutex::new(None),
            state: RwLock::new(ControllerState::Idle),
            latest: RwLock::new((None, LandmarkSet::empty())),
            stats: Mutex::new(LoopStats::default()),
        }
    }

    pub(super) fn open_gate(&self, generation: u64) {
        *self.gate.lock() = Some(generation);
    }

    /// Close the gate. Waits for a publish already holding it to finish.
    pub(super) fn close_gate(&self) {
        *self.gate.lock() = None;
    }

    /// Close the gate only if `generation` still holds it
    pub(super) fn close_gate_for(&self, generation: u64) -> bool {
        let mut gate = self.gate.lock();
        if *gate == Some(generation) {
            *gate = None;
            true
        } else {
            false
        }
    }

    pub(super) fn state(&self) -> ControllerState {
        *self.state.read()
    }

    pub(super) fn set_state(&self, state: ControllerState) {
        *self.state.write() = state;
    }

    pub(super) fn latest_feedback(&self) -> Option<FeedbackState> {
        self.latest.read().0
    }

    pub(super) fn latest_landmarks(&self) -> LandmarkSet {
        self.latest.read().1.clone()
    }

    pub(super) fn reset_latest(&self) {
        *self.latest.write() = (None, LandmarkSet::empty());
    }

    pub(super) fn stats(&self) -> LoopStats {
        self.stats.lock().clone()
    }

    pub(super) fn record_session(&self) {
        self.stats.lock().record_session();
    }
}

/// Per-session loop state, owned by the loop task
struct Session {
    id: Uuid,
    generation: u64,
    latest_feedback: Option<FeedbackState>,
    latest_landmarks: LandmarkSet,
}

/// Everything a session's loop task needs
pub(super) struct SessionContext {
    pub(super) id: Uuid,
    pub(super) generation: u64,
    pub(super) max_fps: u32,
    pub(super) stream: Arc<StreamHandle>,
    pub(super) engine: Arc<Mutex<Engine>>,
    pub(super) classifier: PostureClassifier,
    pub(super) consumer: Arc<dyn FeedbackConsumer>,
    pub(super) display: Arc<dyn DisplaySink>,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) shared: Arc<Shared>,
}

enum CycleOutcome {
    Published,
    Skipped,
    Cancelled,
    Fatal(AcquisitionError),
}

/// Run cycles until cancelled or the stream fails
pub(super) async fn run_session(context: SessionContext, cancel: CancellationToken) {
    let mut session = Session {
        id: context.id,
        generation: context.generation,
        latest_feedback: None,
        latest_landmarks: LandmarkSet::empty(),
    };
    let mut ticker = FrameTicker::new(context.max_fps);

    info!(
        "Session {} (generation {}) running at up to {}fps",
        session.id, session.generation, context.max_fps
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match run_cycle(&context, &mut session, &cancel).await {
            CycleOutcome::Published | CycleOutcome::Skipped => {}
            CycleOutcome::Cancelled => break,
            CycleOutcome::Fatal(e) => {
                end_failed_session(&context, &session, e).await;
                return;
            }
        }
    }

    debug!(
        "Session {} loop exited with feedback {:?} and {} landmarks",
        session.id,
        session.latest_feedback,
        session.latest_landmarks.len()
    );
}

async fn run_cycle(
    context: &SessionContext,
    session: &mut Session,
    cancel: &CancellationToken,
) -> CycleOutcome {
    let (frame, fresh) = match context.stream.current_frame() {
        Ok(current) => current,
        Err(e) => return CycleOutcome::Fatal(e),
    };
    context.shared.stats.lock().record_cycle(fresh);

    // The engine is blocking; an in-flight call is never aborted, only ignored
    let engine = Arc::clone(&context.engine);
    let input = frame.clone();
    let inference = tokio::task::spawn_blocking(move || engine.lock().detect(&input));

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            context.shared.stats.lock().record_discarded();
            return CycleOutcome::Cancelled;
        }
        joined = inference => joined,
    };

    let landmarks = match result {
        Ok(Ok(landmarks)) => landmarks,
        Ok(Err(e)) => {
            warn!("Inference failed on frame {}: {}", frame.id, e);
            context.shared.stats.lock().record_inference_error();
            return CycleOutcome::Skipped;
        }
        Err(e) => {
            error!("Inference task failed on frame {}: {}", frame.id, e);
            context.shared.stats.lock().record_inference_error();
            return CycleOutcome::Skipped;
        }
    };

    let feedback = match context.classifier.classify(&landmarks) {
        Ok(state) => Some(state),
        Err(e) => {
            debug!(
                "Keeping previous feedback {:?} for frame {}: {}",
                session.latest_feedback, frame.id, e
            );
            context.shared.stats.lock().record_computation_fallback();
            session.latest_feedback
        }
    };

    if feedback != session.latest_feedback {
        if let Some(state) = feedback {
            debug!("Feedback changed to {}", state.as_str());
        }
    }
    session.latest_feedback = feedback;
    session.latest_landmarks = landmarks;

    if publish(context, session, &frame) {
        CycleOutcome::Published
    } else {
        CycleOutcome::Cancelled
    }
}

/// Hand the cycle's result to the display and the consumer, unless the
/// session has been stopped meanwhile
fn publish(context: &SessionContext, session: &Session, frame: &FrameData) -> bool {
    let shared = &context.shared;
    let gate = shared.gate.lock();
    if *gate != Some(session.generation) {
        trace!(
            "Discarding result of stopped session {} for frame {}",
            session.id,
            frame.id
        );
        shared.stats.lock().record_discarded();
        return false;
    }

    context.display.present(frame, &session.latest_landmarks);
    *shared.latest.write() = (session.latest_feedback, session.latest_landmarks.clone());

    if let Some(state) = session.latest_feedback {
        context.consumer.on_feedback(state);
        shared.stats.lock().record_feedback();
    }

    drop(gate);
    true
}

/// Tear down after the stream failed underneath a running session
async fn end_failed_session(context: &SessionContext, session: &Session, cause: AcquisitionError) {
    error!("Session {} lost its camera stream: {}", session.id, cause);

    if !context.shared.close_gate_for(session.generation) {
        // Already stopped; the controller owns the teardown
        return;
    }
    if let Err(e) = context.stream.release().await {
        warn!("Failed to release stream {}: {}", context.stream.id(), e);
    }
    context.display.clear();
    context.shared.reset_latest();
    context.shared.set_state(ControllerState::Idle);
    context
        .event_bus
        .publish_lossy(FormcheckEvent::status(SessionStatus::AcquisitionFailed));
}
