use crate::config::CameraConfig;
use crate::error::AcquisitionError;
use crate::frame::FrameData;
use async_trait::async_trait;
use tokio::sync::watch;

/// Requested capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureConstraints {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }
}

impl From<&CameraConfig> for CaptureConstraints {
    fn from(config: &CameraConfig) -> Self {
        Self::new(config.resolution.0, config.resolution.1, config.fps)
    }
}

/// Latest-frame channel a device publishes into. `None` until the first frame.
pub type FrameSender = watch::Sender<Option<FrameData>>;
pub type FrameReceiver = watch::Receiver<Option<FrameData>>;

/// A source of camera frames
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the device and start publishing frames into `frames`.
    ///
    /// Returns once the device is open; frames may not be flowing yet.
    /// Dropping `frames` signals that the stream has ended.
    async fn start(
        &self,
        constraints: CaptureConstraints,
        frames: FrameSender,
    ) -> Result<(), AcquisitionError>;

    /// Stop all capture. Stopping an idle device is a no-op.
    async fn stop(&self) -> Result<(), AcquisitionError>;

    fn is_capturing(&self) -> bool;
}
