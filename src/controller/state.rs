use serde::Serialize;
use std::fmt;

/// Loop controller state. `Idle` is both initial and terminal between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Idle,
    Running,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Running => write!(f, "running"),
        }
    }
}

/// Cumulative loop statistics across all sessions
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    pub sessions: u64,
    pub cycles: u64,
    /// Cycles that found no new camera image since the previous one
    pub stale_frames: u64,
    pub inference_errors: u64,
    /// Cycles that reused the previous feedback after a geometry failure
    pub computation_fallbacks: u64,
    pub feedback_published: u64,
    /// Results that arrived after their session was stopped
    pub discarded_results: u64,
}

impl LoopStats {
    pub fn record_session(&mut self) {
        self.sessions += 1;
    }

    pub fn record_cycle(&mut self, fresh_frame: bool) {
        self.cycles += 1;
        if !fresh_frame {
            self.stale_frames += 1;
        }
    }

    pub fn record_inference_error(&mut self) {
        self.inference_errors += 1;
    }

    pub fn record_computation_fallback(&mut self) {
        self.computation_fallbacks += 1;
    }

    pub fn record_feedback(&mut self) {
        self.feedback_published += 1;
    }

    pub fn record_discarded(&mut self) {
        self.discarded_results += 1;
    }

    /// Fraction of cycles that produced a result
    pub fn inference_success_rate(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            (self.cycles - self.inference_errors) as f64 / self.cycles as f64
        }
    }
}
