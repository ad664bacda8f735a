mod adapter;
mod backend;
#[cfg(any(test, feature = "testing"))]
mod mock;
mod onnx;
mod replay;
#[cfg(test)]
mod tests;

pub use adapter::InferenceAdapter;
pub use backend::{PoseBackend, PoseModel};
#[cfg(any(test, feature = "testing"))]
pub use mock::ScriptedBackend;
pub use onnx::OnnxBackend;
pub use replay::ReplayBackend;
