use super::device::{CaptureConstraints, CaptureDevice, FrameSender};
use super::interface::synthetic_frame;
use crate::error::AcquisitionError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a [`MockCaptureDevice`] does once started
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Deliver frames until stopped
    Frames,
    /// Refuse to start
    Deny(AcquisitionError),
    /// Start but never deliver a frame
    Silent,
    /// Deliver this many frames, then end the stream
    EndAfter(u64),
}

/// In-memory capture device with scripted behavior and call counters
pub struct MockCaptureDevice {
    behavior: MockBehavior,
    frame_interval: Duration,
    starts: AtomicUsize,
    stops: AtomicUsize,
    capturing: Arc<AtomicBool>,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
}

impl MockCaptureDevice {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            frame_interval: Duration::from_millis(5),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            capturing: Arc::new(AtomicBool::new(false)),
            cancel: parking_lot::Mutex::new(None),
        }
    }

    pub fn frames() -> Self {
        Self::new(MockBehavior::Frames)
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureDevice for MockCaptureDevice {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn start(
        &self,
        constraints: CaptureConstraints,
        frames: FrameSender,
    ) -> Result<(), AcquisitionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);

        let limit = match &self.behavior {
            MockBehavior::Deny(error) => return Err(error.clone()),
            MockBehavior::Frames => None,
            MockBehavior::Silent => Some(0),
            MockBehavior::EndAfter(count) => Some(*count),
        };
        let ends = matches!(self.behavior, MockBehavior::EndAfter(_));

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());
        self.capturing.store(true, Ordering::SeqCst);

        let capturing = Arc::clone(&self.capturing);
        let interval = self.frame_interval;
        tokio::spawn(async move {
            let mut sent = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                if limit.map_or(true, |limit| sent < limit) {
                    frames.send_replace(Some(synthetic_frame(
                        sent,
                        constraints.width.min(16),
                        constraints.height.min(16),
                    )));
                    sent += 1;
                } else if ends {
                    break;
                }
            }
            capturing.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), AcquisitionError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}
