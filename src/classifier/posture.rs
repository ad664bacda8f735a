use super::feedback::FeedbackState;
use crate::config::ClassifierConfig;
use crate::error::ComputationError;
use crate::geometry;
use crate::landmark::{LandmarkSet, PoseLandmark};
use tracing::trace;

/// Three landmarks defining a joint angle, vertex in the middle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointTriplet {
    pub proximal: PoseLandmark,
    pub vertex: PoseLandmark,
    pub distal: PoseLandmark,
}

/// Left hip, knee and ankle
pub const LEFT_KNEE: JointTriplet = JointTriplet {
    proximal: PoseLandmark::LeftHip,
    vertex: PoseLandmark::LeftKnee,
    distal: PoseLandmark::LeftAnkle,
};

impl JointTriplet {
    pub fn landmarks(&self) -> [PoseLandmark; 3] {
        [self.proximal, self.vertex, self.distal]
    }
}

/// Maps one landmark set to a feedback state. Holds no memory of earlier frames.
#[derive(Debug, Clone)]
pub struct PostureClassifier {
    config: ClassifierConfig,
    joint: JointTriplet,
}

impl PostureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            joint: LEFT_KNEE,
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn joint(&self) -> JointTriplet {
        self.joint
    }

    /// Classify the current landmark set.
    ///
    /// Fails only when the tracked joint is geometrically degenerate; callers
    /// decide what to show instead.
    pub fn classify(&self, landmarks: &LandmarkSet) -> Result<FeedbackState, ComputationError> {
        if landmarks.is_empty() {
            return Ok(FeedbackState::NoSubject);
        }

        let mut points = [None; 3];
        for (slot, landmark) in points.iter_mut().zip(self.joint.landmarks()) {
            let point = landmarks
                .get(landmark)
                .ok_or(ComputationError::MissingLandmark {
                    index: landmark.index(),
                    len: landmarks.len(),
                })?;
            // NaN visibility counts as occluded
            if !(point.visibility > self.config.visibility_threshold) {
                trace!(
                    "{} visibility {:.2} at or below {:.2}",
                    landmark.name(),
                    point.visibility,
                    self.config.visibility_threshold
                );
                return Ok(FeedbackState::Occluded);
            }
            *slot = Some(point);
        }

        let [Some(proximal), Some(vertex), Some(distal)] = points else {
            return Ok(FeedbackState::Occluded);
        };

        let degrees = geometry::angle(proximal, vertex, distal)?;
        let state = self.band(degrees);
        trace!("Knee angle {:.1} -> {}", degrees, state);

        Ok(state)
    }

    /// Band lookup, highest band first
    pub fn band(&self, degrees: f64) -> FeedbackState {
        if degrees > self.config.stand_above {
            FeedbackState::StandReady
        } else if degrees > self.config.descend_above {
            FeedbackState::Descend
        } else if degrees > self.config.good_depth_above {
            FeedbackState::GoodDepth
        } else {
            FeedbackState::Complete
        }
    }
}

impl Default for PostureClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

/// Classify with the default thresholds
pub fn classify(landmarks: &LandmarkSet) -> Result<FeedbackState, ComputationError> {
    PostureClassifier::default().classify(landmarks)
}
