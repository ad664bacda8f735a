use crate::error::InferenceError;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Landmarks per pose in the BlazePose topology
pub const POSE_LANDMARK_COUNT: usize = 33;

/// A single detected body keypoint
///
/// `x`/`y` are normalized image coordinates, `z` is depth relative to the hips
/// (smaller is closer to the camera), `visibility` is the engine's confidence
/// that the point is localized and unoccluded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
        }
    }

    /// Planar point with full visibility
    pub fn visible(x: f32, y: f32) -> Self {
        Self::new(x, y, 0.0, 1.0)
    }

    /// Distance to another landmark in the image plane (depth ignored)
    pub fn planar_distance(&self, other: &Landmark) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// BlazePose landmark indices (33 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl PoseLandmark {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PoseLandmark::Nose => "nose",
            PoseLandmark::LeftEyeInner => "left_eye_inner",
            PoseLandmark::LeftEye => "left_eye",
            PoseLandmark::LeftEyeOuter => "left_eye_outer",
            PoseLandmark::RightEyeInner => "right_eye_inner",
            PoseLandmark::RightEye => "right_eye",
            PoseLandmark::RightEyeOuter => "right_eye_outer",
            PoseLandmark::LeftEar => "left_ear",
            PoseLandmark::RightEar => "right_ear",
            PoseLandmark::MouthLeft => "mouth_left",
            PoseLandmark::MouthRight => "mouth_right",
            PoseLandmark::LeftShoulder => "left_shoulder",
            PoseLandmark::RightShoulder => "right_shoulder",
            PoseLandmark::LeftElbow => "left_elbow",
            PoseLandmark::RightElbow => "right_elbow",
            PoseLandmark::LeftWrist => "left_wrist",
            PoseLandmark::RightWrist => "right_wrist",
            PoseLandmark::LeftPinky => "left_pinky",
            PoseLandmark::RightPinky => "right_pinky",
            PoseLandmark::LeftIndex => "left_index",
            PoseLandmark::RightIndex => "right_index",
            PoseLandmark::LeftThumb => "left_thumb",
            PoseLandmark::RightThumb => "right_thumb",
            PoseLandmark::LeftHip => "left_hip",
            PoseLandmark::RightHip => "right_hip",
            PoseLandmark::LeftKnee => "left_knee",
            PoseLandmark::RightKnee => "right_knee",
            PoseLandmark::LeftAnkle => "left_ankle",
            PoseLandmark::RightAnkle => "right_ankle",
            PoseLandmark::LeftHeel => "left_heel",
            PoseLandmark::RightHeel => "right_heel",
            PoseLandmark::LeftFootIndex => "left_foot_index",
            PoseLandmark::RightFootIndex => "right_foot_index",
        }
    }
}

/// Skeleton edges of the BlazePose topology, as index pairs
pub const POSE_CONNECTIONS: [(usize, usize); 35] = [
    // Face
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    // Arms and hands
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    // Torso
    (11, 23),
    (12, 24),
    (23, 24),
    // Legs and feet
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

/// All landmarks of one detected subject in one frame
///
/// Either empty (no subject) or exactly the topology's landmark count; the
/// constructor enforces this so downstream code can index without checks
/// beyond `is_empty`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LandmarkSet {
    landmarks: Vec<Landmark>,
}

impl LandmarkSet {
    /// Set with no detected subject
    pub fn empty() -> Self {
        Self {
            landmarks: Vec::new(),
        }
    }

    /// Validate a pose against the expected topology size
    pub fn from_landmarks(
        landmarks: Vec<Landmark>,
        expected: usize,
    ) -> Result<Self, InferenceError> {
        if !landmarks.is_empty() && landmarks.len() != expected {
            return Err(InferenceError::Topology {
                expected,
                actual: landmarks.len(),
            });
        }

        Ok(Self { landmarks })
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn get(&self, landmark: PoseLandmark) -> Option<&Landmark> {
        self.landmarks.get(landmark.index())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Landmark> {
        self.landmarks.iter()
    }

    pub fn as_slice(&self) -> &[Landmark] {
        &self.landmarks
    }
}

impl Index<PoseLandmark> for LandmarkSet {
    type Output = Landmark;

    fn index(&self, landmark: PoseLandmark) -> &Landmark {
        &self.landmarks[landmark.index()]
    }
}

impl<'a> IntoIterator for &'a LandmarkSet {
    type Item = &'a Landmark;
    type IntoIter = std::slice::Iter<'a, Landmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.landmarks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_indices() {
        assert_eq!(PoseLandmark::LeftHip.index(), 23);
        assert_eq!(PoseLandmark::LeftKnee.index(), 25);
        assert_eq!(PoseLandmark::LeftAnkle.index(), 27);
        assert_eq!(PoseLandmark::RightFootIndex.index(), POSE_LANDMARK_COUNT - 1);
    }

    #[test]
    fn test_connections_stay_inside_topology() {
        for (from, to) in POSE_CONNECTIONS {
            assert!(from < POSE_LANDMARK_COUNT && to < POSE_LANDMARK_COUNT);
            assert_ne!(from, to);
        }
    }

    #[test]
    fn test_landmark_set_length_validation() {
        let full = vec![Landmark::default(); POSE_LANDMARK_COUNT];
        let set = LandmarkSet::from_landmarks(full, POSE_LANDMARK_COUNT).unwrap();
        assert_eq!(set.len(), POSE_LANDMARK_COUNT);
        assert!(!set.is_empty());

        let empty = LandmarkSet::from_landmarks(Vec::new(), POSE_LANDMARK_COUNT).unwrap();
        assert!(empty.is_empty());
        assert!(empty.get(PoseLandmark::LeftKnee).is_none());

        let partial = LandmarkSet::from_landmarks(vec![Landmark::default(); 17], POSE_LANDMARK_COUNT);
        assert_eq!(
            partial,
            Err(InferenceError::Topology {
                expected: POSE_LANDMARK_COUNT,
                actual: 17
            })
        );
    }

    #[test]
    fn test_landmark_deserialize_defaults() {
        let landmark: Landmark = serde_json::from_str(r#"{"x":0.25,"y":0.5}"#).unwrap();
        assert_eq!(landmark, Landmark::new(0.25, 0.5, 0.0, 0.0));
    }

    #[test]
    fn test_planar_distance_ignores_depth() {
        let a = Landmark::new(0.0, 0.0, -5.0, 1.0);
        let b = Landmark::new(3.0, 4.0, 7.0, 0.2);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-9);
    }
}
