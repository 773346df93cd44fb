pub mod layout;
pub mod render;

pub use layout::{ApproxMeasure, Bounds, LayoutTree, TextMeasure};
pub use render::{render_text_pixmap, FrameStats, SkiaRenderer};
