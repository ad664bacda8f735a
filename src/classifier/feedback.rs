use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete posture category surfaced to the user for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackState {
    /// No subject detected in the frame
    NoSubject,
    /// Tracked side not visible enough to measure
    Occluded,
    /// Standing upright, ready to begin
    StandReady,
    /// Partway down, not yet deep enough
    Descend,
    /// At target squat depth
    GoodDepth,
    /// Past target depth, time to stand back up
    Complete,
}

impl FeedbackState {
    /// User-facing message for the state
    pub fn message(&self) -> &'static str {
        match self {
            FeedbackState::NoSubject => "No person detected. Stand in full view.",
            FeedbackState::Occluded => "Make sure your left side is visible to the camera.",
            FeedbackState::StandReady => "Stand straight, then begin your squat.",
            FeedbackState::Descend => "Squat deeper... Lower your hips.",
            FeedbackState::GoodDepth => "Good depth! Hold or push up.",
            FeedbackState::Complete => "Great squat! Now stand back up.",
        }
    }

    /// Stable identifier for logs and filtering
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackState::NoSubject => "no_subject",
            FeedbackState::Occluded => "occluded",
            FeedbackState::StandReady => "stand_ready",
            FeedbackState::Descend => "descend",
            FeedbackState::GoodDepth => "good_depth",
            FeedbackState::Complete => "complete",
        }
    }

    /// Whether a joint angle was measured to reach this state
    pub fn is_measured(&self) -> bool {
        !matches!(self, FeedbackState::NoSubject | FeedbackState::Occluded)
    }
}

impl fmt::Display for FeedbackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
