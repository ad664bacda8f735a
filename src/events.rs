use crate::classifier::FeedbackState;
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Lifecycle status of the feedback session, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    ModelLoading,
    Ready,
    ModelLoadFailed,
    Started,
    AcquisitionFailed,
    Stopped,
}

impl SessionStatus {
    pub fn message(&self) -> &'static str {
        match self {
            SessionStatus::ModelLoading => "Loading exercise model...",
            SessionStatus::Ready => "Ready to start. Press the webcam icon!",
            SessionStatus::ModelLoadFailed => "Failed to load AI model. Please refresh.",
            SessionStatus::Started => "Webcam started. Get in position.",
            SessionStatus::AcquisitionFailed => {
                "Could not access webcam. Please check permissions."
            }
            SessionStatus::Stopped => "Webcam stopped. Press the icon to start again.",
        }
    }
}

/// Events published by the feedback core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FormcheckEvent {
    /// A cycle completed with this posture category
    Feedback {
        state: FeedbackState,
        timestamp: SystemTime,
    },
    /// Session lifecycle changed
    StatusChanged {
        status: SessionStatus,
        timestamp: SystemTime,
    },
    /// Shell asked to start the session if idle, stop it if running
    ToggleRequested { timestamp: SystemTime },
    /// Shell asked the application to exit
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl FormcheckEvent {
    pub fn feedback(state: FeedbackState) -> Self {
        FormcheckEvent::Feedback {
            state,
            timestamp: SystemTime::now(),
        }
    }

    pub fn status(status: SessionStatus) -> Self {
        FormcheckEvent::StatusChanged {
            status,
            timestamp: SystemTime::now(),
        }
    }

    pub fn toggle() -> Self {
        FormcheckEvent::ToggleRequested {
            timestamp: SystemTime::now(),
        }
    }

    pub fn shutdown<S: Into<String>>(reason: S) -> Self {
        FormcheckEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: reason.into(),
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            FormcheckEvent::Feedback { timestamp, .. } => *timestamp,
            FormcheckEvent::StatusChanged { timestamp, .. } => *timestamp,
            FormcheckEvent::ToggleRequested { timestamp } => *timestamp,
            FormcheckEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// User-facing text for the event
    pub fn description(&self) -> String {
        match self {
            FormcheckEvent::Feedback { state, .. } => state.message().to_string(),
            FormcheckEvent::StatusChanged { status, .. } => status.message().to_string(),
            FormcheckEvent::ToggleRequested { .. } => "Start/stop requested".to_string(),
            FormcheckEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            FormcheckEvent::Feedback { .. } => "feedback",
            FormcheckEvent::StatusChanged { .. } => "status_changed",
            FormcheckEvent::ToggleRequested { .. } => "toggle_requested",
            FormcheckEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Receives the feedback state of every completed cycle
pub trait FeedbackConsumer: Send + Sync {
    fn on_feedback(&self, state: FeedbackState);
}

impl<F> FeedbackConsumer for F
where
    F: Fn(FeedbackState) + Send + Sync,
{
    fn on_feedback(&self, state: FeedbackState) {
        self(state)
    }
}

/// Broadcast bus connecting the core to the shell
pub struct EventBus {
    sender: broadcast::Sender<FormcheckEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus that logs every event at debug level
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FormcheckEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: FormcheckEvent) -> Result<usize, EventBusError> {
        match &event {
            FormcheckEvent::StatusChanged { status, .. } => match status {
                SessionStatus::ModelLoadFailed | SessionStatus::AcquisitionFailed => {
                    warn!("Session status: {:?}", status);
                }
                _ => info!("Session status: {:?}", status),
            },
            FormcheckEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            FormcheckEvent::ToggleRequested { .. } => {
                debug!("Start/stop toggle requested");
            }
            FormcheckEvent::Feedback { .. } => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish, logging instead of failing when nobody listens
    pub fn publish_lossy(&self, event: FormcheckEvent) {
        if !self.has_subscribers() {
            return;
        }
        if let Err(e) = self.publish(event) {
            error!("Failed to publish event: {}", e);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

impl FeedbackConsumer for EventBus {
    fn on_feedback(&self, state: FeedbackState) {
        self.publish_lossy(FormcheckEvent::feedback(state));
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    Custom(fn(&FormcheckEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &FormcheckEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Filtered view over a bus subscription
pub struct EventReceiver {
    receiver: broadcast::Receiver<FormcheckEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<FormcheckEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Next event passing the filter; `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<FormcheckEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Receiver '{}' lagged, skipped {} events", self.name, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return None;
                }
            }
        }
    }
}
