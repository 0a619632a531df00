//! Display sinks.
//!
//! A sink receives every annotated frame the loop produces. Three are
//! provided:
//! - `WindowSink`: a native OpenCV window (feature: display-highgui)
//! - `WidgetSink`: hands frames to an embedding GUI through a `FrameSlot`
//! - `HeadlessSink`: logs counters and optionally writes JPEG snapshots

pub mod headless;
pub mod widget;
#[cfg(feature = "display-highgui")]
pub mod window;

use anyhow::Result;

use crate::annotate::Annotated;

pub use headless::{HeadlessConfig, HeadlessSink};
#[cfg(feature = "gui-egui")]
pub use widget::EguiConverter;
pub use widget::{FrameSlot, ImageConverter, RgbConverter, WidgetSink};
#[cfg(feature = "display-highgui")]
pub use window::WindowSink;

pub trait DisplaySink: Send {
    /// Show one annotated frame. Takes ownership; the frame is not reused.
    fn present(&mut self, annotated: Annotated) -> Result<()>;

    /// True when the user asked to quit from the display itself.
    fn poll_for_exit(&mut self) -> bool;

    /// Release or blank whatever the sink is showing.
    fn clear(&mut self);
}
