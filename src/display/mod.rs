mod overlay;
mod sink;
mod stats;

pub use overlay::OverlayRenderer;
pub use sink::{DisplaySink, NullDisplay};
pub use stats::DisplayStats;
