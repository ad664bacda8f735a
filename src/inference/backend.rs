use crate::config::Delegate;
use crate::error::{InferenceError, ModelLoadError};
use crate::frame::FrameData;
use crate::landmark::Landmark;
use async_trait::async_trait;

/// A pose-estimation engine that can produce loaded models
#[async_trait]
pub trait PoseBackend: Send + Sync {
    /// Backend identifier for logs and errors
    fn name(&self) -> &'static str;

    /// Fetch and initialise a model from `asset` on the requested delegate
    async fn load(
        &self,
        asset: &str,
        delegate: Delegate,
    ) -> Result<Box<dyn PoseModel>, ModelLoadError>;
}

/// A loaded model in streaming mode
///
/// Models may keep tracking state between calls, so callers must pass
/// strictly increasing timestamps.
pub trait PoseModel: Send {
    /// Detect poses in `frame`; each entry is one subject's landmarks
    fn detect(
        &mut self,
        frame: &FrameData,
        timestamp_ms: u64,
    ) -> Result<Vec<Vec<Landmark>>, InferenceError>;

    /// Release engine resources, including accelerator bindings
    fn close(&mut self);
}
