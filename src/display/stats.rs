use std::time::SystemTime;

/// Overlay rendering statistics
#[derive(Debug, Clone, Default)]
pub struct DisplayStats {
    pub frames_rendered: u64,
    pub render_errors: u64,
    pub overlays_drawn: u64,
    pub clears: u64,
    pub last_frame_time: Option<SystemTime>,
}

impl DisplayStats {
    pub fn record_frame_render(&mut self, with_overlay: bool) {
        self.frames_rendered += 1;
        if with_overlay {
            self.overlays_drawn += 1;
        }
        self.last_frame_time = Some(SystemTime::now());
    }

    pub fn record_render_error(&mut self) {
        self.render_errors += 1;
        self.last_frame_time = Some(SystemTime::now());
    }

    pub fn record_clear(&mut self) {
        self.clears += 1;
    }

    pub fn render_success_rate(&self) -> f64 {
        let attempts = self.frames_rendered + self.render_errors;
        if attempts == 0 {
            0.0
        } else {
            self.frames_rendered as f64 / attempts as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
