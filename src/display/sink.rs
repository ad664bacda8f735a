use crate::frame::FrameData;
use crate::landmark::LandmarkSet;

/// Where composed frames go. Best effort: failures are handled inside the sink.
pub trait DisplaySink: Send + Sync {
    /// Draw the frame, then the landmark overlay on top of it
    fn present(&self, frame: &FrameData, overlay: &LandmarkSet);

    /// Remove whatever is currently shown
    fn clear(&self);
}

/// Sink that discards everything, for headless runs
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn present(&self, _frame: &FrameData, _overlay: &LandmarkSet) {}

    fn clear(&self) {}
}
