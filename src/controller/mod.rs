//! The frame-processing loop: one session at a time, one cycle at a time.

mod controller;
mod cycle;
mod scheduler;
mod state;
#[cfg(test)]
mod tests;

pub use controller::{LoopController, LoopControllerBuilder};
pub use scheduler::FrameTicker;
pub use state::{ControllerState, LoopStats};
