use super::backend::{PoseBackend, PoseModel};
use crate::config::Delegate;
use crate::error::ModelLoadError;
use async_trait::async_trait;

#[cfg(any(test, feature = "onnx"))]
use crate::error::InferenceError;
#[cfg(any(test, feature = "onnx"))]
use crate::landmark::Landmark;
#[cfg(any(test, feature = "onnx"))]
use image::{imageops::FilterType, RgbImage};

#[cfg(feature = "onnx")]
use crate::frame::FrameData;
#[cfg(feature = "onnx")]
use ndarray::Array4;
#[cfg(feature = "onnx")]
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
#[cfg(feature = "onnx")]
use ort::session::builder::GraphOptimizationLevel;
#[cfg(feature = "onnx")]
use ort::session::Session;
#[cfg(feature = "onnx")]
use ort::value::Tensor;
#[cfg(feature = "onnx")]
use tracing::{debug, info, trace};

/// Values per landmark in the BlazePose landmark output: x, y, z, visibility, presence
#[cfg(any(test, feature = "onnx"))]
const LANDMARK_STRIDE: usize = 5;

/// Pose score below which the frame holds no subject
#[cfg(any(test, feature = "onnx"))]
const PRESENCE_THRESHOLD: f32 = 0.5;

/// Pose backend running a BlazePose landmark model under ONNX Runtime
///
/// The model takes one `[1, size, size, 3]` RGB tensor scaled to `[0, 1]`.
/// Its first output holds the landmarks in input pixels and its optional second
/// output holds the pose presence logit. The CPU delegate uses the default
/// provider; the GPU delegate requires CUDA and fails the load without it.
#[derive(Debug, Clone)]
pub struct OnnxBackend {
    input_size: u32,
    landmark_count: usize,
}

impl OnnxBackend {
    pub fn new(input_size: u32, landmark_count: usize) -> Self {
        Self {
            input_size,
            landmark_count,
        }
    }
}

#[async_trait]
impl PoseBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    #[cfg(feature = "onnx")]
    async fn load(
        &self,
        asset: &str,
        delegate: Delegate,
    ) -> Result<Box<dyn PoseModel>, ModelLoadError> {
        tokio::fs::metadata(asset)
            .await
            .map_err(|e| ModelLoadError::Fetch {
                asset: asset.to_string(),
                details: e.to_string(),
            })?;

        let path = asset.to_string();
        let session = tokio::task::spawn_blocking(move || build_session(&path, delegate))
            .await
            .map_err(|e| ModelLoadError::Parse {
                asset: asset.to_string(),
                details: format!("session builder task failed: {}", e),
            })??;

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();
        let landmarks_output = output_names
            .first()
            .cloned()
            .ok_or_else(|| ModelLoadError::Parse {
                asset: asset.to_string(),
                details: "model declares no outputs".to_string(),
            })?;
        let presence_output = output_names.get(1).cloned();

        info!(
            "ONNX pose model '{}' ready on {} (outputs: {:?})",
            asset, delegate, output_names
        );

        Ok(Box::new(OnnxPoseModel {
            session: Some(session),
            input_size: self.input_size,
            landmark_count: self.landmark_count,
            landmarks_output,
            presence_output,
        }))
    }

    #[cfg(not(feature = "onnx"))]
    async fn load(
        &self,
        asset: &str,
        delegate: Delegate,
    ) -> Result<Box<dyn PoseModel>, ModelLoadError> {
        Err(ModelLoadError::BackendUnavailable {
            backend: self.name().to_string(),
            details: format!(
                "cannot load '{}' on {}: built without the 'onnx' feature",
                asset, delegate
            ),
        })
    }
}

#[cfg(feature = "onnx")]
fn build_session(asset: &str, delegate: Delegate) -> Result<Session, ModelLoadError> {
    let parse_error = |details: String| ModelLoadError::Parse {
        asset: asset.to_string(),
        details,
    };

    let builder = Session::builder()
        .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
        .map_err(|e| parse_error(format!("Failed to create session builder: {}", e)))?;

    let builder = match delegate {
        Delegate::Cpu => {
            builder.with_execution_providers([CPUExecutionProvider::default().build()])
        }
        Delegate::Gpu => builder.with_execution_providers([CUDAExecutionProvider::default()
            .build()
            .error_on_failure()]),
    }
    .map_err(|e| ModelLoadError::UnsupportedDelegate {
        backend: format!("onnx ({})", e),
        delegate: delegate.to_string(),
    })?;

    builder
        .commit_from_file(asset)
        .map_err(|e| parse_error(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(feature = "onnx")]
struct OnnxPoseModel {
    session: Option<Session>,
    input_size: u32,
    landmark_count: usize,
    landmarks_output: String,
    presence_output: Option<String>,
}

#[cfg(feature = "onnx")]
impl PoseModel for OnnxPoseModel {
    fn detect(
        &mut self,
        frame: &FrameData,
        timestamp_ms: u64,
    ) -> Result<Vec<Vec<Landmark>>, InferenceError> {
        let session = self.session.as_mut().ok_or(InferenceError::Disposed)?;
        let engine_error = |details: String| InferenceError::Engine { details };

        let image = frame
            .to_rgb_image()
            .map_err(|e| engine_error(e.to_string()))?;
        let size = self.input_size as usize;
        let input = Array4::from_shape_vec((1, size, size, 3), prepare_input(&image, self.input_size))
            .map_err(|e| engine_error(format!("Bad input shape: {}", e)))?;
        let input_tensor =
            Tensor::from_array(input).map_err(|e| engine_error(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| engine_error(format!("Inference failed: {}", e)))?;

        let raw: Vec<f32> = outputs[self.landmarks_output.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| engine_error(format!("Failed to extract landmarks: {}", e)))?
            .iter()
            .copied()
            .collect();

        let presence = match &self.presence_output {
            Some(name) => outputs[name.as_str()]
                .try_extract_array::<f32>()
                .map_err(|e| engine_error(format!("Failed to extract pose score: {}", e)))?
                .iter()
                .next()
                .copied(),
            None => None,
        };

        trace!(
            "Frame {} at {}ms: {} landmark values, presence logit {:?}",
            frame.id,
            timestamp_ms,
            raw.len(),
            presence
        );

        decode_landmarks(&raw, presence, self.landmark_count, self.input_size)
    }

    fn close(&mut self) {
        // Dropping the session releases the execution provider
        if self.session.take().is_some() {
            debug!("ONNX session released");
        }
    }
}

/// Resize to the model input and flatten to NHWC floats in `[0, 1]`
#[cfg(any(test, feature = "onnx"))]
fn prepare_input(image: &RgbImage, input_size: u32) -> Vec<f32> {
    let resized = image::imageops::resize(image, input_size, input_size, FilterType::Triangle);
    resized
        .into_raw()
        .into_iter()
        .map(|value| value as f32 / 255.0)
        .collect()
}

/// Turn raw landmark output into normalized landmarks of at most one subject
#[cfg(any(test, feature = "onnx"))]
fn decode_landmarks(
    raw: &[f32],
    presence_logit: Option<f32>,
    landmark_count: usize,
    input_size: u32,
) -> Result<Vec<Vec<Landmark>>, InferenceError> {
    if let Some(logit) = presence_logit {
        if !(sigmoid(logit) >= PRESENCE_THRESHOLD) {
            return Ok(Vec::new());
        }
    }

    if raw.len() < landmark_count * LANDMARK_STRIDE {
        return Err(InferenceError::Topology {
            expected: landmark_count,
            actual: raw.len() / LANDMARK_STRIDE,
        });
    }

    // Stretched input, so input pixels map straight back to normalized frame coordinates
    let scale = input_size as f32;
    let pose = raw
        .chunks_exact(LANDMARK_STRIDE)
        .take(landmark_count)
        .map(|values| {
            Landmark::new(
                values[0] / scale,
                values[1] / scale,
                values[2] / scale,
                sigmoid(values[3]),
            )
        })
        .collect();

    Ok(vec![pose])
}

#[cfg(any(test, feature = "onnx"))]
fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn raw_pose(count: usize, visibility_logit: f32) -> Vec<f32> {
        (0..count)
            .flat_map(|i| [i as f32 * 2.0, 128.0, -12.8, visibility_logit, 3.0])
            .collect()
    }

    #[test]
    fn test_input_is_resized_and_scaled() {
        let image = RgbImage::from_pixel(64, 48, Rgb([255, 0, 51]));
        let input = prepare_input(&image, 32);

        assert_eq!(input.len(), 32 * 32 * 3);
        assert!((input[0] - 1.0).abs() < 1e-6);
        assert!(input[1].abs() < 1e-6);
        assert!((input[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_landmarks_are_normalized() {
        let poses = decode_landmarks(&raw_pose(39, 10.0), Some(5.0), 33, 256).unwrap();

        assert_eq!(poses.len(), 1);
        let pose = &poses[0];
        assert_eq!(pose.len(), 33);
        assert!((pose[4].x - 8.0 / 256.0).abs() < 1e-6);
        assert!((pose[4].y - 0.5).abs() < 1e-6);
        assert!((pose[4].z + 0.05).abs() < 1e-6);
        assert!(pose[4].visibility > 0.99);
    }

    #[test]
    fn test_absent_subject_yields_no_pose() {
        assert!(decode_landmarks(&raw_pose(33, 10.0), Some(-4.0), 33, 256)
            .unwrap()
            .is_empty());
        assert!(decode_landmarks(&raw_pose(33, 10.0), Some(f32::NAN), 33, 256)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_short_output_is_a_topology_error() {
        assert_eq!(
            decode_landmarks(&raw_pose(17, 0.0), None, 33, 256),
            Err(InferenceError::Topology {
                expected: 33,
                actual: 17
            })
        );
    }

    #[test]
    fn test_visibility_logits_become_probabilities() {
        let poses = decode_landmarks(&raw_pose(33, -10.0), None, 33, 256).unwrap();
        assert!(poses[0].iter().all(|landmark| landmark.visibility < 0.01));
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }

    #[cfg(not(feature = "onnx"))]
    #[tokio::test]
    async fn test_load_without_feature_is_unavailable() {
        let backend = OnnxBackend::new(256, 33);
        let result = backend.load("models/pose_landmark_lite.onnx", Delegate::Cpu).await;

        assert!(matches!(
            result,
            Err(ModelLoadError::BackendUnavailable { .. })
        ));
    }

    #[cfg(feature = "onnx")]
    #[tokio::test]
    async fn test_missing_model_file_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let asset = dir.path().join("absent.onnx");
        let backend = OnnxBackend::new(256, 33);

        let result = backend
            .load(asset.to_str().unwrap(), Delegate::Gpu)
            .await;

        assert!(matches!(result, Err(ModelLoadError::Fetch { .. })));
    }
}
