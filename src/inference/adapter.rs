use super::backend::{PoseBackend, PoseModel};
use crate::config::Delegate;
use crate::error::{InferenceError, ModelLoadError};
use crate::frame::FrameData;
use crate::landmark::LandmarkSet;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Loaded pose engine in single-pose streaming mode
///
/// Only obtainable through a successful [`InferenceAdapter::load`], so `run`
/// can never reach an engine that is still initialising.
pub struct InferenceAdapter {
    model: Option<Box<dyn PoseModel>>,
    backend: &'static str,
    asset: String,
    delegate: Delegate,
    landmark_count: usize,
    last_timestamp_ms: Option<u64>,
    runs: u64,
}

impl InferenceAdapter {
    /// Load a model through `backend`
    pub async fn load(
        backend: &dyn PoseBackend,
        asset: &str,
        delegate: Delegate,
        landmark_count: usize,
    ) -> Result<Self, ModelLoadError> {
        info!(
            "Loading pose model '{}' with {} backend on {}",
            asset,
            backend.name(),
            delegate
        );
        let started = Instant::now();

        let model = backend.load(asset, delegate).await?;

        info!(
            "Pose model loaded in {}ms",
            started.elapsed().as_millis()
        );

        Ok(Self {
            model: Some(model),
            backend: backend.name(),
            asset: asset.to_string(),
            delegate,
            landmark_count,
            last_timestamp_ms: None,
            runs: 0,
        })
    }

    /// Run the engine on one frame.
    ///
    /// `timestamp_ms` must be strictly greater than the previous call's.
    /// Returns the first detected subject, or an empty set.
    pub fn run(&mut self, frame: &FrameData, timestamp_ms: u64) -> Result<LandmarkSet, InferenceError> {
        let model = self.model.as_mut().ok_or(InferenceError::Disposed)?;

        if let Some(previous_ms) = self.last_timestamp_ms {
            if timestamp_ms <= previous_ms {
                return Err(InferenceError::NonMonotonicTimestamp {
                    timestamp_ms,
                    previous_ms,
                });
            }
        }
        self.last_timestamp_ms = Some(timestamp_ms);
        self.runs += 1;

        let poses = model.detect(frame, timestamp_ms)?;
        trace!(
            "Frame {} at {}ms: {} pose(s) detected",
            frame.id,
            timestamp_ms,
            poses.len()
        );

        match poses.into_iter().next() {
            Some(pose) => LandmarkSet::from_landmarks(pose, self.landmark_count),
            None => Ok(LandmarkSet::empty()),
        }
    }

    /// Release engine resources. Safe to call more than once.
    pub fn dispose(&mut self) {
        if let Some(mut model) = self.model.take() {
            model.close();
            info!(
                "Disposed pose model '{}' ({} backend) after {} runs",
                self.asset, self.backend, self.runs
            );
        } else {
            debug!("Pose model '{}' already disposed", self.asset);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.model.is_none()
    }

    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.last_timestamp_ms
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn delegate(&self) -> Delegate {
        self.delegate
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

impl Drop for InferenceAdapter {
    fn drop(&mut self) {
        if self.model.is_some() {
            warn!(
                "Pose model '{}' dropped without dispose(), releasing now",
                self.asset
            );
            self.dispose();
        }
    }
}
