//! Synthetic poses shared by unit tests.

use crate::landmark::{Landmark, LandmarkSet, PoseLandmark, POSE_LANDMARK_COUNT};

const KNEE: (f32, f32) = (0.5, 0.6);
const SEGMENT: f32 = 0.2;

/// Full-topology pose whose left knee bends to `knee_degrees`
pub(crate) fn squat_landmarks(knee_degrees: f64, visibility: f32) -> Vec<Landmark> {
    let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0, visibility); POSE_LANDMARK_COUNT];

    let (sin, cos) = knee_degrees.to_radians().sin_cos();
    let hip = Landmark::new(KNEE.0, KNEE.1 - SEGMENT, 0.0, visibility);
    let knee = Landmark::new(KNEE.0, KNEE.1, 0.0, visibility);
    let ankle = Landmark::new(
        KNEE.0 + SEGMENT * sin as f32,
        KNEE.1 - SEGMENT * cos as f32,
        0.0,
        visibility,
    );

    landmarks[PoseLandmark::LeftHip.index()] = hip;
    landmarks[PoseLandmark::LeftKnee.index()] = knee;
    landmarks[PoseLandmark::LeftAnkle.index()] = ankle;
    landmarks
}

pub(crate) fn squat_pose(knee_degrees: f64, visibility: f32) -> LandmarkSet {
    LandmarkSet::from_landmarks(squat_landmarks(knee_degrees, visibility), POSE_LANDMARK_COUNT)
        .unwrap()
}

/// Pose whose left knee sits exactly on the hip
pub(crate) fn collapsed_pose() -> LandmarkSet {
    let mut landmarks = squat_landmarks(90.0, 1.0);
    landmarks[PoseLandmark::LeftKnee.index()] = landmarks[PoseLandmark::LeftHip.index()];
    LandmarkSet::from_landmarks(landmarks, POSE_LANDMARK_COUNT).unwrap()
}
