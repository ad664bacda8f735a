use super::sink::DisplaySink;
use super::stats::DisplayStats;
use crate::error::{FormcheckError, Result};
use crate::frame::FrameData;
use crate::landmark::{Landmark, LandmarkSet, POSE_CONNECTIONS};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

const LANDMARK_COLOR: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);
const CONNECTOR_COLOR: Rgb<u8> = Rgb([0x0E, 0xA5, 0xE9]);
const CONNECTOR_WIDTH: i32 = 3;

/// Depth range mapped onto landmark radius; closer points are drawn larger
const DEPTH_NEAR: f32 = -0.15;
const DEPTH_FAR: f32 = 0.1;
const RADIUS_NEAR: f32 = 5.0;
const RADIUS_FAR: f32 = 1.0;

/// Composes frames with a skeleton overlay and keeps the latest result
pub struct OverlayRenderer {
    latest: RwLock<Option<RgbImage>>,
    stats: Mutex<DisplayStats>,
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self {
            latest: RwLock::new(None),
            stats: Mutex::new(DisplayStats::default()),
        }
    }

    /// Decode `frame` and draw `landmarks` over it
    pub fn compose(frame: &FrameData, landmarks: &LandmarkSet) -> Result<RgbImage> {
        let mut image = frame
            .to_rgb_image()
            .map_err(|e| FormcheckError::component("display", e.to_string().as_str()))?;

        if !landmarks.is_empty() {
            draw_landmarks(&mut image, landmarks);
            draw_connectors(&mut image, landmarks);
        }

        Ok(image)
    }

    /// Most recently composed image, if any
    pub fn latest_image(&self) -> Option<RgbImage> {
        self.latest.read().clone()
    }

    pub fn stats(&self) -> DisplayStats {
        self.stats.lock().clone()
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for OverlayRenderer {
    fn present(&self, frame: &FrameData, overlay: &LandmarkSet) {
        match Self::compose(frame, overlay) {
            Ok(image) => {
                trace!(
                    "Composed frame {} with {} landmarks",
                    frame.id,
                    overlay.len()
                );
                *self.latest.write() = Some(image);
                self.stats.lock().record_frame_render(!overlay.is_empty());
            }
            Err(e) => {
                warn!("Failed to render frame {}: {}", frame.id, e);
                self.stats.lock().record_render_error();
            }
        }
    }

    fn clear(&self) {
        debug!("Clearing overlay display");
        *self.latest.write() = None;
        self.stats.lock().record_clear();
    }
}

/// Linear map of `value` from `[from_start, from_end]` onto `[to_start, to_end]`, clamped
fn lerp(value: f32, from_start: f32, from_end: f32, to_start: f32, to_end: f32) -> f32 {
    let t = ((value - from_start) / (from_end - from_start)).clamp(0.0, 1.0);
    to_start + (to_end - to_start) * t
}

pub(crate) fn landmark_radius(landmark: &Landmark) -> i32 {
    lerp(landmark.z, DEPTH_NEAR, DEPTH_FAR, RADIUS_NEAR, RADIUS_FAR).round() as i32
}

fn to_pixel(image: &RgbImage, landmark: &Landmark) -> (f32, f32) {
    (
        landmark.x * image.width() as f32,
        landmark.y * image.height() as f32,
    )
}

fn draw_landmarks(image: &mut RgbImage, landmarks: &LandmarkSet) {
    for landmark in landmarks {
        let (x, y) = to_pixel(image, landmark);
        draw_filled_circle_mut(
            image,
            (x.round() as i32, y.round() as i32),
            landmark_radius(landmark),
            LANDMARK_COLOR,
        );
    }
}

fn draw_connectors(image: &mut RgbImage, landmarks: &LandmarkSet) {
    let points = landmarks.as_slice();

    for (from, to) in POSE_CONNECTIONS {
        let (Some(start), Some(end)) = (points.get(from), points.get(to)) else {
            continue;
        };
        let start = to_pixel(image, start);
        let end = to_pixel(image, end);

        let (dx, dy) = (end.0 - start.0, end.1 - start.1);
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            continue;
        }

        // Offset copies of the segment along its normal to get the line width
        let (nx, ny) = (-dy / length, dx / length);
        for offset in -(CONNECTOR_WIDTH / 2)..=(CONNECTOR_WIDTH / 2) {
            let shift = offset as f32;
            draw_line_segment_mut(
                image,
                (start.0 + nx * shift, start.1 + ny * shift),
                (end.0 + nx * shift, end.1 + ny * shift),
                CONNECTOR_COLOR,
            );
        }
    }
}
