use super::device::{CaptureConstraints, CaptureDevice, FrameSender};
use crate::config::{CameraBackend, CameraConfig};
use crate::error::AcquisitionError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::prelude::*;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer::Pipeline;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer_app::AppSink;
#[cfg(all(feature = "camera", target_os = "linux"))]
use gstreamer_video::VideoInfo;

/// Camera frame source backed by GStreamer or a synthetic generator
pub struct CameraInterface {
    config: CameraConfig,
    frame_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
    capture_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl CameraInterface {
    pub fn new(config: CameraConfig) -> Self {
        info!(
            "Initializing {:?} camera interface for device {} ({}x{} @ {}fps)",
            config.backend, config.index, config.resolution.0, config.resolution.1, config.fps
        );

        Self {
            config,
            frame_counter: Arc::new(AtomicU64::new(0)),
            is_running: Arc::new(AtomicBool::new(false)),
            cancel: parking_lot::Mutex::new(None),
            capture_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Get camera configuration
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Frames produced since creation
    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    fn spawn_synthetic_loop(
        &self,
        constraints: CaptureConstraints,
        frames: FrameSender,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let frame_counter = Arc::clone(&self.frame_counter);
        let is_running = Arc::clone(&self.is_running);

        tokio::spawn(async move {
            let fps = constraints.fps.max(1) as u64;
            let mut interval_timer = tokio::time::interval(Duration::from_millis(1000 / fps));

            info!("Synthetic capture loop started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval_timer.tick() => {}
                }

                if frames.is_closed() {
                    debug!("All frame receivers dropped, ending synthetic capture");
                    break;
                }

                let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
                let frame = synthetic_frame(frame_id, constraints.width, constraints.height);

                trace!(
                    "Generated synthetic frame {} ({}x{}, {} bytes)",
                    frame_id,
                    frame.width,
                    frame.height,
                    frame.data.len()
                );
                frames.send_replace(Some(frame));
            }

            is_running.store(false, Ordering::Relaxed);
            info!("Synthetic capture loop stopped");
        })
    }

    #[cfg(all(feature = "camera", target_os = "linux"))]
    async fn start_gstreamer(
        &self,
        constraints: CaptureConstraints,
        frames: FrameSender,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, AcquisitionError> {
        let device_path = format!("/dev/video{}", self.config.index);

        // Surface missing devices and permission problems before GStreamer
        // turns them into a generic state change failure
        if let Err(e) = tokio::fs::File::open(&device_path).await {
            return Err(match e.kind() {
                std::io::ErrorKind::PermissionDenied => AcquisitionError::PermissionDenied,
                _ => AcquisitionError::DeviceUnavailable {
                    details: format!("{}: {}", device_path, e),
                },
            });
        }

        gstreamer::init().map_err(|e| AcquisitionError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = build_pipeline_string(&device_path, constraints);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| AcquisitionError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| AcquisitionError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| AcquisitionError::Configuration {
                details: "Pipeline has no appsink named 'sink'".to_string(),
            })?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let _ = tx.send(sample);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(AcquisitionError::DeviceUnavailable {
                details: format!("Failed to start GStreamer pipeline: {}", e),
            });
        }

        info!("GStreamer pipeline started successfully");

        let frame_counter = Arc::clone(&self.frame_counter);
        let is_running = Arc::clone(&self.is_running);

        Ok(tokio::spawn(async move {
            let bus = pipeline.bus();
            let mut bus_interval = tokio::time::interval(Duration::from_millis(250));

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sample = rx.recv() => {
                        let Some(sample) = sample else { break };
                        match process_gst_sample(sample, &frame_counter) {
                            Ok(frame) => {
                                frames.send_replace(Some(frame));
                            }
                            Err(e) => error!("Error processing GStreamer sample: {}", e),
                        }
                    }
                    _ = bus_interval.tick() => {
                        let Some(bus) = &bus else { continue };
                        if let Some(message) = bus.timed_pop_filtered(
                            gstreamer::ClockTime::ZERO,
                            &[gstreamer::MessageType::Error, gstreamer::MessageType::Eos],
                        ) {
                            match message.view() {
                                gstreamer::MessageView::Error(err) => {
                                    error!("GStreamer pipeline error: {}", err.error());
                                }
                                _ => warn!("GStreamer pipeline reached end of stream"),
                            }
                            break;
                        }
                    }
                }
            }

            let _ = pipeline.set_state(gstreamer::State::Null);
            is_running.store(false, Ordering::Relaxed);
            info!("GStreamer capture loop stopped");
        }))
    }
}

#[async_trait]
impl CaptureDevice for CameraInterface {
    fn name(&self) -> &'static str {
        match self.config.backend {
            CameraBackend::Synthetic => "synthetic",
            CameraBackend::Gstreamer => "gstreamer",
        }
    }

    async fn start(
        &self,
        constraints: CaptureConstraints,
        frames: FrameSender,
    ) -> Result<(), AcquisitionError> {
        if self.is_running.load(Ordering::Relaxed) {
            return Err(AcquisitionError::Configuration {
                details: "Camera capture is already running".to_string(),
            });
        }

        info!(
            "Starting {} camera capture ({}x{} @ {}fps)",
            self.name(),
            constraints.width,
            constraints.height,
            constraints.fps
        );

        let cancel = CancellationToken::new();
        let task = match self.config.backend {
            CameraBackend::Synthetic => {
                self.spawn_synthetic_loop(constraints, frames, cancel.clone())
            }
            #[cfg(all(feature = "camera", target_os = "linux"))]
            CameraBackend::Gstreamer => {
                self.start_gstreamer(constraints, frames, cancel.clone())
                    .await?
            }
            #[cfg(not(all(feature = "camera", target_os = "linux")))]
            CameraBackend::Gstreamer => {
                drop(frames);
                return Err(AcquisitionError::DeviceUnavailable {
                    details: "GStreamer capture requires the 'camera' feature on Linux"
                        .to_string(),
                });
            }
        };

        self.is_running.store(true, Ordering::Relaxed);
        *self.cancel.lock() = Some(cancel);
        *self.capture_task.lock().await = Some(task);

        Ok(())
    }

    async fn stop(&self) -> Result<(), AcquisitionError> {
        let cancel = self.cancel.lock().take();
        let Some(cancel) = cancel else {
            debug!("Camera capture is not running");
            return Ok(());
        };

        info!("Stopping {} camera capture", self.name());
        cancel.cancel();

        if let Some(task) = self.capture_task.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(3), task).await {
                Ok(Ok(())) => debug!("Capture task completed"),
                Ok(Err(e)) => error!("Error waiting for capture task: {}", e),
                Err(_) => warn!("Capture task did not complete within timeout"),
            }
        }

        self.is_running.store(false, Ordering::Relaxed);
        info!("Camera capture stopped");
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}

/// Build GStreamer pipeline string producing packed RGB frames
#[cfg(all(feature = "camera", target_os = "linux"))]
fn build_pipeline_string(device_path: &str, constraints: CaptureConstraints) -> String {
    format!(
        "v4l2src device={} io-mode=mmap do-timestamp=true ! \
         videoconvert ! videoscale ! videorate ! \
         video/x-raw,format=RGB,width={},height={},framerate={}/1 ! \
         appsink name=sink sync=false max-buffers=2 drop=true qos=false enable-last-sample=false emit-signals=false",
        device_path, constraints.width, constraints.height, constraints.fps
    )
}

/// Copy a GStreamer sample into a tightly packed RGB24 frame
#[cfg(all(feature = "camera", target_os = "linux"))]
fn process_gst_sample(
    sample: gstreamer::Sample,
    frame_counter: &AtomicU64,
) -> Result<FrameData, AcquisitionError> {
    let stream_error = |details: String| AcquisitionError::Configuration { details };

    let buffer = sample
        .buffer()
        .ok_or_else(|| stream_error("No buffer in sample".to_string()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| stream_error("No caps in sample".to_string()))?;
    let video_info = VideoInfo::from_caps(caps)
        .map_err(|e| stream_error(format!("Failed to get video info: {}", e)))?;

    let width = video_info.width();
    let height = video_info.height();
    let stride = video_info.stride()[0] as usize;
    let row_bytes = width as usize * FrameFormat::Rgb24.bytes_per_pixel();

    let map = buffer
        .map_readable()
        .map_err(|e| stream_error(format!("Failed to map buffer: {}", e)))?;
    let source = map.as_slice();

    let data = if stride == row_bytes {
        source[..row_bytes * height as usize].to_vec()
    } else {
        let mut packed = Vec::with_capacity(row_bytes * height as usize);
        for row in source.chunks(stride).take(height as usize) {
            packed.extend_from_slice(&row[..row_bytes]);
        }
        packed
    };

    let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
    trace!("Captured RGB frame {} ({}x{})", frame_id, width, height);

    Ok(FrameData::new(
        frame_id,
        SystemTime::now(),
        data,
        width,
        height,
        FrameFormat::Rgb24,
    ))
}

/// Moving vertical bar over a dark gradient
pub(crate) fn synthetic_frame(frame_id: u64, width: u32, height: u32) -> FrameData {
    let width = width.max(1);
    let height = height.max(1);
    let bar = (frame_id * 8 % width as u64) as u32;
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);

    for y in 0..height {
        let shade = (y * 96 / height) as u8;
        for x in 0..width {
            if x.abs_diff(bar) < 4 {
                data.extend_from_slice(&[0xE0, 0xE0, 0xE0]);
            } else {
                data.extend_from_slice(&[shade, shade, shade.saturating_add(32)]);
            }
        }
    }

    FrameData::new(
        frame_id,
        SystemTime::now(),
        data,
        width,
        height,
        FrameFormat::Rgb24,
    )
}
