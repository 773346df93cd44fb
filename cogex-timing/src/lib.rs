pub mod frames;
pub mod queue;
pub mod timer;

pub use frames::{PacingStats, FrameTimes};
pub use queue::{TimeoutId, TimeoutQueue};
pub use timer::{HighPrecisionTimer, ManualTimer, Timer};
