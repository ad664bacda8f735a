use super::*;
use crate::config::Delegate;
use crate::error::{InferenceError, ModelLoadError};
use crate::fixtures::squat_landmarks;
use crate::frame::{FrameData, FrameFormat};
use crate::landmark::{Landmark, POSE_LANDMARK_COUNT};
use std::io::Write;
use std::time::SystemTime;

fn test_frame(id: u64) -> FrameData {
    FrameData::new(id, SystemTime::now(), vec![0u8; 4 * 4 * 3], 4, 4, FrameFormat::Rgb24)
}

async fn load_scripted(backend: &ScriptedBackend) -> InferenceAdapter {
    InferenceAdapter::load(backend, "scripted.task", Delegate::Gpu, POSE_LANDMARK_COUNT)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_single_pose_mode_keeps_first_subject() {
    let first = squat_landmarks(170.0, 0.9);
    let second = squat_landmarks(60.0, 0.9);
    let expected = first.clone();
    let backend = ScriptedBackend::new(move |_| Ok(vec![first.clone(), second.clone()]));
    let mut adapter = load_scripted(&backend).await;

    let set = adapter.run(&test_frame(1), 10).unwrap();
    assert_eq!(set.as_slice(), expected.as_slice());

    adapter.dispose();
}

#[tokio::test]
async fn test_no_detection_is_empty_set() {
    let backend = ScriptedBackend::new(|_| Ok(Vec::new()));
    let mut adapter = load_scripted(&backend).await;

    let set = adapter.run(&test_frame(1), 10).unwrap();
    assert!(set.is_empty());

    adapter.dispose();
}

#[tokio::test]
async fn test_topology_checked_at_boundary() {
    let backend = ScriptedBackend::constant(vec![Landmark::default(); 17]);
    let mut adapter = load_scripted(&backend).await;

    assert_eq!(
        adapter.run(&test_frame(1), 10),
        Err(InferenceError::Topology {
            expected: POSE_LANDMARK_COUNT,
            actual: 17
        })
    );

    adapter.dispose();
}

#[tokio::test]
async fn test_timestamps_must_increase() {
    let backend = ScriptedBackend::constant(squat_landmarks(120.0, 0.9));
    let mut adapter = load_scripted(&backend).await;

    assert!(adapter.run(&test_frame(1), 100).is_ok());
    assert_eq!(
        adapter.run(&test_frame(2), 100),
        Err(InferenceError::NonMonotonicTimestamp {
            timestamp_ms: 100,
            previous_ms: 100
        })
    );
    assert!(adapter.run(&test_frame(3), 50).is_err());
    assert!(adapter.run(&test_frame(4), 101).is_ok());

    // Rejected calls never reach the engine
    assert_eq!(backend.calls(), 2);
    assert_eq!(adapter.last_timestamp_ms(), Some(101));

    adapter.dispose();
}

#[tokio::test]
async fn test_engine_errors_pass_through() {
    let backend = ScriptedBackend::new(|call| {
        if call == 0 {
            Err(InferenceError::Engine {
                details: "context lost".to_string(),
            })
        } else {
            Ok(Vec::new())
        }
    });
    let mut adapter = load_scripted(&backend).await;

    assert!(matches!(
        adapter.run(&test_frame(1), 1),
        Err(InferenceError::Engine { .. })
    ));
    assert!(adapter.run(&test_frame(2), 2).is_ok());

    adapter.dispose();
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let backend = ScriptedBackend::new(|_| Ok(Vec::new()));
    let mut adapter = load_scripted(&backend).await;

    adapter.dispose();
    adapter.dispose();

    assert!(adapter.is_disposed());
    assert_eq!(backend.closes(), 1);
    assert_eq!(adapter.run(&test_frame(1), 1), Err(InferenceError::Disposed));
}

#[tokio::test]
async fn test_drop_releases_engine() {
    let backend = ScriptedBackend::new(|_| Ok(Vec::new()));
    {
        let _adapter = load_scripted(&backend).await;
    }
    assert_eq!(backend.closes(), 1);
}

#[tokio::test]
async fn test_load_failure_surfaces() {
    let backend = ScriptedBackend::failing_load(ModelLoadError::Fetch {
        asset: "missing.task".to_string(),
        details: "404".to_string(),
    });

    let result =
        InferenceAdapter::load(&backend, "missing.task", Delegate::Cpu, POSE_LANDMARK_COUNT).await;
    assert!(matches!(result, Err(ModelLoadError::Fetch { .. })));
}

fn write_recording(lines: &[String]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".jsonl")
        .tempfile()
        .unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

fn recorded_line(poses: &[Vec<Landmark>]) -> String {
    serde_json::json!({ "poses": poses }).to_string()
}

#[tokio::test]
async fn test_replay_backend_loops_recording() {
    let standing = squat_landmarks(170.0, 0.9);
    let file = write_recording(&[
        recorded_line(&[standing.clone()]),
        String::new(),
        recorded_line(&[]),
    ]);
    let asset = file.path().to_string_lossy().to_string();

    let mut adapter =
        InferenceAdapter::load(&ReplayBackend::new(), &asset, Delegate::Cpu, POSE_LANDMARK_COUNT)
            .await
            .unwrap();

    assert_eq!(adapter.run(&test_frame(1), 1).unwrap().as_slice(), standing.as_slice());
    assert!(adapter.run(&test_frame(2), 2).unwrap().is_empty());
    assert_eq!(adapter.run(&test_frame(3), 3).unwrap().as_slice(), standing.as_slice());
    assert_eq!(adapter.backend(), "replay");

    adapter.dispose();
}

#[tokio::test]
async fn test_replay_backend_rejects_gpu() {
    let file = write_recording(&[recorded_line(&[])]);
    let asset = file.path().to_string_lossy().to_string();

    let result = ReplayBackend::new().load(&asset, Delegate::Gpu).await;
    assert!(matches!(
        result,
        Err(ModelLoadError::UnsupportedDelegate { .. })
    ));
}

#[tokio::test]
async fn test_replay_backend_missing_and_malformed_assets() {
    let missing = ReplayBackend::new()
        .load("/nonexistent/formcheck/recording.jsonl", Delegate::Cpu)
        .await;
    assert!(matches!(missing, Err(ModelLoadError::Fetch { .. })));

    let file = write_recording(&[recorded_line(&[]), "{not json".to_string()]);
    let asset = file.path().to_string_lossy().to_string();
    match ReplayBackend::new().load(&asset, Delegate::Cpu).await {
        Err(ModelLoadError::Parse { details, .. }) => assert!(details.starts_with("line 2")),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("malformed recording loaded"),
    }

    let empty = write_recording(&[]);
    let asset = empty.path().to_string_lossy().to_string();
    assert!(matches!(
        ReplayBackend::new().load(&asset, Delegate::Cpu).await,
        Err(ModelLoadError::Parse { .. })
    ));
}
