use super::backend::{PoseBackend, PoseModel};
use crate::config::Delegate;
use crate::error::{InferenceError, ModelLoadError};
use crate::frame::FrameData;
use crate::landmark::Landmark;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Script = dyn Fn(u64) -> Result<Vec<Vec<Landmark>>, InferenceError> + Send + Sync;

/// Pose backend driven by a closure, for exercising the loop without an engine
///
/// The script receives the zero-based call number and returns the poses for
/// that call. Load and detect delays simulate a slow engine.
#[derive(Clone)]
pub struct ScriptedBackend {
    script: Arc<Script>,
    load_error: Option<ModelLoadError>,
    load_delay: Duration,
    detect_delay: Duration,
    calls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(u64) -> Result<Vec<Vec<Landmark>>, InferenceError> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            load_error: None,
            load_delay: Duration::ZERO,
            detect_delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Backend that returns the same pose on every call
    pub fn constant(pose: Vec<Landmark>) -> Self {
        Self::new(move |_| Ok(vec![pose.clone()]))
    }

    /// Backend whose load always fails
    pub fn failing_load(error: ModelLoadError) -> Self {
        let mut backend = Self::new(|_| Ok(Vec::new()));
        backend.load_error = Some(error);
        backend
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Block each detect call for `delay`
    pub fn with_detect_delay(mut self, delay: Duration) -> Self {
        self.detect_delay = delay;
        self
    }

    /// Detect calls made across every model loaded from this backend
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Models closed so far
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoseBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn load(
        &self,
        asset: &str,
        delegate: Delegate,
    ) -> Result<Box<dyn PoseModel>, ModelLoadError> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if let Some(error) = &self.load_error {
            return Err(error.clone());
        }

        debug!("Scripted model '{}' loaded on {}", asset, delegate);
        Ok(Box::new(ScriptedModel {
            script: Arc::clone(&self.script),
            detect_delay: self.detect_delay,
            calls: Arc::clone(&self.calls),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct ScriptedModel {
    script: Arc<Script>,
    detect_delay: Duration,
    calls: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl PoseModel for ScriptedModel {
    fn detect(
        &mut self,
        _frame: &FrameData,
        _timestamp_ms: u64,
    ) -> Result<Vec<Vec<Landmark>>, InferenceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
        if !self.detect_delay.is_zero() {
            std::thread::sleep(self.detect_delay);
        }
        (self.script)(call)
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
