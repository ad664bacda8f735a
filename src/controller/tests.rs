use super::*;
use crate::camera::{CaptureConstraints, FrameAcquisition, MockBehavior, MockCaptureDevice};
use crate::classifier::FeedbackState;
use crate::config::{ControllerConfig, Delegate};
use crate::display::OverlayRenderer;
use crate::error::{AcquisitionError, FormcheckError, InferenceError, ModelLoadError};
use crate::events::{EventBus, FeedbackConsumer, FormcheckEvent, SessionStatus};
use crate::fixtures::{collapsed_pose, squat_landmarks};
use crate::inference::ScriptedBackend;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

type Seen = Arc<Mutex<Vec<FeedbackState>>>;

fn recorder() -> (Seen, Arc<dyn FeedbackConsumer>) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let consumer = move |state: FeedbackState| sink.lock().push(state);
    (seen, Arc::new(consumer))
}

fn test_controller_config() -> ControllerConfig {
    ControllerConfig {
        max_fps: 100,
        stop_timeout_ms: 1000,
    }
}

fn build_controller(
    device: Arc<MockCaptureDevice>,
    consumer: Arc<dyn FeedbackConsumer>,
) -> (LoopController, Arc<EventBus>) {
    let event_bus = Arc::new(EventBus::new(256));
    let acquisition = FrameAcquisition::new(
        device,
        CaptureConstraints::new(32, 24, 60),
        Duration::from_millis(500),
    );

    let controller = LoopController::builder()
        .acquisition(acquisition)
        .controller_config(test_controller_config())
        .feedback_consumer(consumer)
        .event_bus(Arc::clone(&event_bus))
        .build()
        .unwrap();

    (controller, event_bus)
}

async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn drain_statuses(receiver: &mut broadcast::Receiver<FormcheckEvent>) -> Vec<SessionStatus> {
    let mut statuses = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let FormcheckEvent::StatusChanged { status, .. } = event {
            statuses.push(status);
        }
    }
    statuses
}

#[tokio::test]
async fn test_start_before_load_is_not_ready() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (_, consumer) = recorder();
    let (controller, _) = build_controller(device.clone(), consumer);

    let result = controller.start().await;

    assert!(matches!(result, Err(FormcheckError::NotReady { .. })));
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(device.starts(), 0);
}

#[tokio::test]
async fn test_start_while_loading_fails_fast() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (_, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);
    let controller = Arc::new(controller);

    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0))
        .with_load_delay(Duration::from_millis(200));
    let loader = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            controller
                .load_model(&backend, "scripted", Delegate::Cpu)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    let early = tokio::time::timeout(Duration::from_millis(100), controller.start())
        .await
        .expect("start must not wait for the model");
    assert!(matches!(early, Err(FormcheckError::NotReady { .. })));

    loader.await.unwrap().unwrap();
    assert!(controller.is_model_ready());
    controller.start().await.unwrap();
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_load_blocks_start_until_reloaded() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (_, consumer) = recorder();
    let (controller, bus) = build_controller(device.clone(), consumer);
    let mut statuses = bus.subscribe();

    let broken = ScriptedBackend::failing_load(ModelLoadError::Fetch {
        asset: "missing.task".to_string(),
        details: "404".to_string(),
    });
    assert!(controller
        .load_model(&broken, "missing.task", Delegate::Gpu)
        .await
        .is_err());

    for _ in 0..2 {
        assert!(matches!(
            controller.start().await,
            Err(FormcheckError::ModelLoad(ModelLoadError::Fetch { .. }))
        ));
    }
    assert_eq!(device.starts(), 0);

    let working = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));
    controller
        .load_model(&working, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();
    controller.stop().await.unwrap();

    assert_eq!(
        drain_statuses(&mut statuses),
        vec![
            SessionStatus::ModelLoading,
            SessionStatus::ModelLoadFailed,
            SessionStatus::ModelLoading,
            SessionStatus::Ready,
            SessionStatus::Started,
            SessionStatus::Stopped,
        ]
    );
}

#[tokio::test]
async fn test_feedback_flows_each_cycle() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (seen, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(90.0, 1.0));

    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();
    assert_eq!(controller.state(), ControllerState::Running);

    assert!(wait_until(|| seen.lock().len() >= 3).await);
    assert!(seen.lock().iter().all(|state| *state == FeedbackState::GoodDepth));
    assert_eq!(controller.latest_feedback(), Some(FeedbackState::GoodDepth));
    assert_eq!(controller.latest_landmarks().len(), 33);

    controller.stop().await.unwrap();
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(controller.latest_feedback(), None);
    assert!(controller.latest_landmarks().is_empty());

    let stats = controller.stats();
    assert_eq!(stats.sessions, 1);
    assert!(stats.feedback_published >= 3);
    assert_eq!(stats.inference_errors, 0);
}

#[tokio::test]
async fn test_no_subject_and_occluded_are_published() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (seen, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);

    let backend = ScriptedBackend::new(|call| {
        if call % 2 == 0 {
            Ok(Vec::new())
        } else {
            Ok(vec![squat_landmarks(170.0, 0.5)])
        }
    });
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    assert!(
        wait_until(|| {
            let seen = seen.lock();
            seen.contains(&FeedbackState::NoSubject) && seen.contains(&FeedbackState::Occluded)
        })
        .await
    );
    controller.stop().await.unwrap();

    assert!(!seen.lock().contains(&FeedbackState::StandReady));
}

#[tokio::test]
async fn test_stop_twice_is_a_noop() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (_, consumer) = recorder();
    let (controller, _) = build_controller(device.clone(), consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));

    // Stopping before anything ran is fine too
    controller.stop().await.unwrap();
    assert_eq!(device.stops(), 0);

    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    controller.stop().await.unwrap();
    controller.stop().await.unwrap();

    assert_eq!(device.starts(), 1);
    assert_eq!(device.stops(), 1);
    assert_eq!(controller.state(), ControllerState::Idle);
}

#[tokio::test]
async fn test_no_feedback_after_stop_with_inference_in_flight() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (seen, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);

    let backend = ScriptedBackend::constant(squat_landmarks(130.0, 1.0))
        .with_detect_delay(Duration::from_millis(150));
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    assert!(wait_until(|| backend.calls() >= 1).await);
    controller.stop().await.unwrap();
    let published = seen.lock().len();

    // Let the in-flight call resolve
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(seen.lock().len(), published);
    assert_eq!(controller.latest_feedback(), None);
    assert!(controller.stats().discarded_results >= 1);
}

#[tokio::test]
async fn test_start_while_running_resets_to_a_single_loop() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (_, consumer) = recorder();
    let (controller, _) = build_controller(device.clone(), consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));

    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();

    controller.start().await.unwrap();
    let (first, second) = tokio::join!(controller.start(), controller.start());
    first.unwrap();
    second.unwrap();

    // Every replaced session released its stream exactly once
    assert_eq!(device.starts(), 3);
    assert_eq!(device.stops(), 2);
    assert_eq!(controller.state(), ControllerState::Running);

    // One loop at 100fps manages at most ~31 cycles in 300ms
    let before = backend.calls();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let cycles = backend.calls() - before;
    assert!(cycles <= 40, "{} cycles suggests more than one loop", cycles);

    controller.stop().await.unwrap();
    assert_eq!(device.stops(), 3);
    assert_eq!(controller.stats().sessions, 3);
}

#[tokio::test]
async fn test_acquisition_failure_leaves_controller_idle() {
    let device = Arc::new(MockCaptureDevice::new(MockBehavior::Deny(
        AcquisitionError::PermissionDenied,
    )));
    let (seen, consumer) = recorder();
    let (controller, bus) = build_controller(device, consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    let mut statuses = bus.subscribe();

    let result = controller.start().await;

    assert!(matches!(
        result,
        Err(FormcheckError::Acquisition(AcquisitionError::PermissionDenied))
    ));
    assert!(result.unwrap_err().is_fatal_to_session());
    assert_eq!(controller.state(), ControllerState::Idle);
    assert!(seen.lock().is_empty());
    assert_eq!(
        drain_statuses(&mut statuses),
        vec![SessionStatus::AcquisitionFailed]
    );
}

#[tokio::test]
async fn test_stream_end_returns_controller_to_idle() {
    let device = Arc::new(MockCaptureDevice::new(MockBehavior::EndAfter(5)));
    let (_, consumer) = recorder();
    let (controller, bus) = build_controller(device.clone(), consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    let mut statuses = bus.subscribe();

    controller.start().await.unwrap();
    assert!(wait_until(|| controller.state() == ControllerState::Idle).await);

    assert_eq!(device.stops(), 1);
    assert_eq!(
        drain_statuses(&mut statuses),
        vec![SessionStatus::Started, SessionStatus::AcquisitionFailed]
    );

    // The user restarts explicitly; the ended stream is not released twice
    controller.stop().await.unwrap();
    assert_eq!(device.stops(), 1);
}

#[tokio::test]
async fn test_lost_stream_is_not_reported_as_stopped() {
    let device = Arc::new(MockCaptureDevice::new(MockBehavior::EndAfter(3)));
    let (_, consumer) = recorder();
    let (controller, bus) = build_controller(device.clone(), consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    let mut statuses = bus.subscribe();

    controller.start().await.unwrap();
    assert!(wait_until(|| controller.state() == ControllerState::Idle).await);
    assert_eq!(
        drain_statuses(&mut statuses),
        vec![SessionStatus::Started, SessionStatus::AcquisitionFailed]
    );

    // Stopping the ended session publishes nothing further
    controller.stop().await.unwrap();
    assert!(drain_statuses(&mut statuses).is_empty());

    // Restarting does not tear the ended session down a second time
    controller.start().await.unwrap();
    let restarted = drain_statuses(&mut statuses);
    assert_eq!(restarted.first(), Some(&SessionStatus::Started));
    assert!(!restarted.contains(&SessionStatus::Stopped));
    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_inference_errors_keep_the_loop_running() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (seen, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);

    let pose = squat_landmarks(130.0, 1.0);
    let backend = ScriptedBackend::new(move |call| {
        if call % 2 == 0 {
            Err(InferenceError::Engine {
                details: "glitch".to_string(),
            })
        } else {
            Ok(vec![pose.clone()])
        }
    });
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    assert!(wait_until(|| seen.lock().len() >= 3).await);
    assert_eq!(controller.state(), ControllerState::Running);
    assert!(seen.lock().iter().all(|state| *state == FeedbackState::Descend));

    let stats = controller.stats();
    assert!(stats.inference_errors >= 2);
    assert!(stats.inference_success_rate() < 1.0);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_degenerate_pose_keeps_previous_feedback() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (seen, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);

    let standing = squat_landmarks(170.0, 1.0);
    let collapsed = collapsed_pose().as_slice().to_vec();
    let backend = ScriptedBackend::new(move |call| {
        if call == 0 {
            Ok(vec![standing.clone()])
        } else {
            Ok(vec![collapsed.clone()])
        }
    });
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    assert!(wait_until(|| seen.lock().len() >= 4).await);
    controller.stop().await.unwrap();

    assert!(seen.lock().iter().all(|state| *state == FeedbackState::StandReady));
    assert!(controller.stats().computation_fallbacks >= 3);
}

#[tokio::test]
async fn test_degenerate_first_pose_publishes_nothing() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (seen, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);
    let backend = ScriptedBackend::constant(collapsed_pose().as_slice().to_vec());

    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    assert!(wait_until(|| controller.stats().computation_fallbacks >= 3).await);
    controller.stop().await.unwrap();

    assert!(seen.lock().is_empty());
    assert_eq!(controller.stats().feedback_published, 0);
}

#[tokio::test]
async fn test_display_receives_frames_and_is_cleared_on_stop() {
    let device = Arc::new(MockCaptureDevice::frames());
    let display = Arc::new(OverlayRenderer::new());
    let acquisition = FrameAcquisition::new(
        device,
        CaptureConstraints::new(16, 16, 60),
        Duration::from_millis(500),
    );
    let controller = LoopController::builder()
        .acquisition(acquisition)
        .controller_config(test_controller_config())
        .display(display.clone())
        .build()
        .unwrap();
    let backend = ScriptedBackend::constant(squat_landmarks(90.0, 1.0));

    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    assert!(wait_until(|| display.stats().overlays_drawn >= 2).await);
    assert!(display.latest_image().is_some());

    controller.stop().await.unwrap();
    assert!(display.latest_image().is_none());
    assert_eq!(display.stats().clears, 1);
}

#[tokio::test]
async fn test_timestamps_stay_monotonic_across_sessions() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (seen, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();

    for round in 1..=2 {
        controller.start().await.unwrap();
        assert!(wait_until(|| seen.lock().len() >= round * 3).await);
        controller.stop().await.unwrap();
    }

    assert_eq!(controller.stats().inference_errors, 0);
}

#[tokio::test]
async fn test_shutdown_disposes_engine() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (_, consumer) = recorder();
    let (controller, _) = build_controller(device.clone(), consumer);
    let backend = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));
    controller
        .load_model(&backend, "scripted", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();

    controller.shutdown().await.unwrap();

    assert_eq!(backend.closes(), 1);
    assert_eq!(device.stops(), 1);
    assert!(!controller.is_model_ready());
    assert!(matches!(
        controller.start().await,
        Err(FormcheckError::NotReady { .. })
    ));
}

#[tokio::test]
async fn test_reload_disposes_previous_engine() {
    let device = Arc::new(MockCaptureDevice::frames());
    let (_, consumer) = recorder();
    let (controller, _) = build_controller(device, consumer);
    let first = ScriptedBackend::constant(squat_landmarks(170.0, 1.0));
    let second = ScriptedBackend::constant(squat_landmarks(90.0, 1.0));

    controller
        .load_model(&first, "first", Delegate::Cpu)
        .await
        .unwrap();
    controller.start().await.unwrap();
    controller
        .load_model(&second, "second", Delegate::Cpu)
        .await
        .unwrap();

    // Reloading ends the running session
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(first.closes(), 1);
    assert_eq!(second.closes(), 0);
}

#[test]
fn test_builder_requires_acquisition() {
    let result = LoopController::builder().build();

    match result {
        Err(FormcheckError::System { message }) => {
            assert!(message.contains("Frame acquisition must be specified"))
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("builder should reject a missing acquisition"),
    }
}
