use super::device::{CaptureConstraints, CaptureDevice, FrameReceiver};
use crate::config::CameraConfig;
use crate::error::AcquisitionError;
use crate::frame::FrameData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Opens capture streams and waits until they actually deliver frames
pub struct FrameAcquisition {
    device: Arc<dyn CaptureDevice>,
    constraints: CaptureConstraints,
    ready_timeout: Duration,
}

impl FrameAcquisition {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        constraints: CaptureConstraints,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            device,
            constraints,
            ready_timeout,
        }
    }

    pub fn from_config(device: Arc<dyn CaptureDevice>, config: &CameraConfig) -> Self {
        Self::new(
            device,
            CaptureConstraints::from(config),
            Duration::from_millis(config.ready_timeout_ms),
        )
    }

    pub fn device_name(&self) -> &'static str {
        self.device.name()
    }

    /// Start the device and resolve once the first frame is available.
    ///
    /// The device is stopped again on every failure path, so a failed
    /// acquisition never leaves capture running.
    pub async fn acquire(&self) -> Result<StreamHandle, AcquisitionError> {
        info!(
            "Acquiring {} stream ({}x{} @ {}fps)",
            self.device.name(),
            self.constraints.width,
            self.constraints.height,
            self.constraints.fps
        );

        let (sender, mut frames) = watch::channel(None);
        self.device.start(self.constraints, sender).await?;

        debug!(
            "Waiting for first frame (timeout: {:?})",
            self.ready_timeout
        );
        let ready = timeout(self.ready_timeout, async {
            frames
                .wait_for(|frame| frame.is_some())
                .await
                .map(|frame| frame.as_ref().map(|f| (f.id, f.width, f.height)))
        })
        .await;

        let failure = match ready {
            Ok(Ok(Some((id, width, height)))) => {
                info!("First frame received: {} ({}x{})", id, width, height);
                return Ok(StreamHandle::new(Arc::clone(&self.device), frames));
            }
            Ok(Ok(None)) | Ok(Err(_)) => AcquisitionError::StreamEnded,
            Err(_) => AcquisitionError::NoFrames {
                timeout_ms: self.ready_timeout.as_millis() as u64,
            },
        };

        warn!("Stream acquisition failed: {}", failure);
        if let Err(e) = self.device.stop().await {
            error!("Failed to stop device after acquisition failure: {}", e);
        }
        Err(failure)
    }
}

/// A live capture stream. Must be released to stop the device.
pub struct StreamHandle {
    id: Uuid,
    device: Arc<dyn CaptureDevice>,
    frames: parking_lot::Mutex<FrameReceiver>,
    released: AtomicBool,
}

impl StreamHandle {
    fn new(device: Arc<dyn CaptureDevice>, frames: FrameReceiver) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            frames: parking_lot::Mutex::new(frames),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest frame and whether it arrived since the previous call
    pub fn current_frame(&self) -> Result<(FrameData, bool), AcquisitionError> {
        if self.is_released() {
            return Err(AcquisitionError::StreamEnded);
        }

        let mut frames = self.frames.lock();
        let fresh = frames
            .has_changed()
            .map_err(|_| AcquisitionError::StreamEnded)?;

        let frame = frames.borrow_and_update().clone();
        frame
            .map(|frame| (frame, fresh))
            .ok_or(AcquisitionError::StreamEnded)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Stop the underlying device. Only the first call has any effect.
    pub async fn release(&self) -> Result<(), AcquisitionError> {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!("Stream {} already released", self.id);
            return Ok(());
        }

        info!("Releasing {} stream {}", self.device.name(), self.id);
        self.device.stop().await
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if !self.is_released() {
            warn!(
                "Stream {} dropped without release; {} capture may still be running",
                self.id,
                self.device.name()
            );
        }
    }
}
