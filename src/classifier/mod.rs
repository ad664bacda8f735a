mod feedback;
mod posture;

pub use feedback::FeedbackState;
pub use posture::{classify, JointTriplet, PostureClassifier, LEFT_KNEE};
