use super::backend::{PoseBackend, PoseModel};
use crate::config::Delegate;
use crate::error::{InferenceError, ModelLoadError};
use crate::frame::FrameData;
use crate::landmark::Landmark;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, trace};

/// One line of a recorded landmark stream
#[derive(Debug, Deserialize)]
struct RecordedFrame {
    #[serde(default)]
    poses: Vec<Vec<Landmark>>,
}

/// Pose backend that replays landmarks recorded from a real engine
///
/// The asset is a JSON Lines file, one `{"poses": [[landmark, ...], ...]}`
/// object per frame. Playback loops once the recording is exhausted.
/// Runs on the CPU only.
#[derive(Debug, Default, Clone)]
pub struct ReplayBackend;

impl ReplayBackend {
    pub fn new() -> Self {
        Self
    }

    fn parse(asset: &str, contents: &str) -> Result<Vec<Vec<Vec<Landmark>>>, ModelLoadError> {
        let mut frames = Vec::new();

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let frame: RecordedFrame =
                serde_json::from_str(line).map_err(|e| ModelLoadError::Parse {
                    asset: asset.to_string(),
                    details: format!("line {}: {}", line_no + 1, e),
                })?;
            frames.push(frame.poses);
        }

        if frames.is_empty() {
            return Err(ModelLoadError::Parse {
                asset: asset.to_string(),
                details: "recording contains no frames".to_string(),
            });
        }

        Ok(frames)
    }
}

#[async_trait]
impl PoseBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn load(
        &self,
        asset: &str,
        delegate: Delegate,
    ) -> Result<Box<dyn PoseModel>, ModelLoadError> {
        if delegate != Delegate::Cpu {
            return Err(ModelLoadError::UnsupportedDelegate {
                backend: self.name().to_string(),
                delegate: delegate.to_string(),
            });
        }

        let contents = tokio::fs::read_to_string(asset)
            .await
            .map_err(|e| ModelLoadError::Fetch {
                asset: asset.to_string(),
                details: e.to_string(),
            })?;

        let frames = Self::parse(asset, &contents)?;
        info!("Replay recording '{}' holds {} frames", asset, frames.len());

        Ok(Box::new(ReplayModel { frames, cursor: 0 }))
    }
}

struct ReplayModel {
    frames: Vec<Vec<Vec<Landmark>>>,
    cursor: usize,
}

impl PoseModel for ReplayModel {
    fn detect(
        &mut self,
        frame: &FrameData,
        timestamp_ms: u64,
    ) -> Result<Vec<Vec<Landmark>>, InferenceError> {
        if self.frames.is_empty() {
            return Err(InferenceError::Engine {
                details: "replay model has been closed".to_string(),
            });
        }

        let poses = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;

        trace!(
            "Replayed recording frame {} for camera frame {} at {}ms",
            self.cursor, frame.id, timestamp_ms
        );
        Ok(poses)
    }

    fn close(&mut self) {
        self.frames.clear();
    }
}
