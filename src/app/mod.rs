mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::FormcheckApp;
pub use types::{ComponentState, ShutdownReason};
