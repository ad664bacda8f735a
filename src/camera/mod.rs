//! Frame acquisition: capture devices and the streams opened on them.

mod acquisition;
mod device;
mod interface;
#[cfg(any(test, feature = "testing"))]
mod mock;

pub use acquisition::{FrameAcquisition, StreamHandle};
pub use device::{CaptureConstraints, CaptureDevice, FrameReceiver, FrameSender};
pub use interface::CameraInterface;
#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBehavior, MockCaptureDevice};
