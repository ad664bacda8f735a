use std::time::Duration;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Paces loop cycles at no more than `max_fps`.
///
/// Ticks missed while a cycle overruns are skipped rather than replayed, so a
/// slow engine drops frames instead of building a backlog.
pub struct FrameTicker {
    interval: Interval,
    period: Duration,
}

impl FrameTicker {
    pub fn new(max_fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / max_fps.max(1) as f64);
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self { interval, period }
    }

    /// Wait for the next cycle slot. The first tick completes immediately.
    pub async fn tick(&mut self) -> Instant {
        self.interval.tick().await
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Millisecond timestamps for the pose engine, strictly increasing per engine
#[derive(Debug)]
pub(crate) struct TimestampClock {
    origin: std::time::Instant,
    last_ms: Option<u64>,
}

impl TimestampClock {
    pub(crate) fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
            last_ms: None,
        }
    }

    pub(crate) fn next(&mut self) -> u64 {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        let next = match self.last_ms {
            Some(last) => elapsed.max(last + 1),
            None => elapsed,
        };
        self.last_ms = Some(next);
        next
    }
}
