use anyhow::Result;

use crate::detect::result::{Detection, Thresholds};
use crate::frame::Frame;

/// A loaded inference model.
///
/// Implementations are treated as pure functions of (frame, thresholds): the
/// same inputs against the same loaded model yield the same detections.
/// Malformed model output for one frame must be reported as
/// `PipelineError::Inference` so the caller can skip just that cycle.
///
/// There is no timeout around `infer`. A model that hangs blocks the calling
/// cycle until it returns.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run one forward pass and return detections at or above
    /// `thresholds.confidence`, with overlapping duplicates suppressed.
    fn infer(&mut self, frame: &Frame, thresholds: Thresholds) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, called once before the first cycle.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
