use anyhow::Result;
use std::collections::{HashMap, HashSet};

use crate::detect::backend::Detector;
use crate::detect::postprocess::{filter_by_confidence, non_max_suppression};
use crate::detect::result::{Detection, Thresholds};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Scripted backend for tests and model-less demo runs.
///
/// Returns the same detections for every frame unless a frame sequence number
/// has its own script. Frames listed with `failing_on` produce an inference
/// error instead.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    default: Vec<Detection>,
    per_frame: HashMap<u64, Vec<Detection>>,
    failing: HashSet<u64>,
    unfiltered: bool,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `detections` on every frame.
    pub fn repeating(detections: Vec<Detection>) -> Self {
        Self {
            default: detections,
            ..Self::default()
        }
    }

    /// Emit `detections` on frame `seq` only.
    pub fn with_frame(mut self, seq: u64, detections: Vec<Detection>) -> Self {
        self.per_frame.insert(seq, detections);
        self
    }

    /// Report an inference error on frame `seq`.
    pub fn failing_on(mut self, seq: u64) -> Self {
        self.failing.insert(seq);
        self
    }

    /// Skip threshold handling and hand back the scripted detections as-is.
    pub fn unfiltered(mut self) -> Self {
        self.unfiltered = true;
        self
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, frame: &Frame, thresholds: Thresholds) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.failing.contains(&frame.seq) {
            return Err(PipelineError::inference(format!(
                "scripted failure on frame {}",
                frame.seq
            ))
            .into());
        }

        let detections = self
            .per_frame
            .get(&frame.seq)
            .unwrap_or(&self.default)
            .clone();
        if self.unfiltered {
            return Ok(detections);
        }
        let detections = filter_by_confidence(detections, thresholds.confidence);
        Ok(non_max_suppression(detections, thresholds.overlap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;
    use image::RgbImage;

    fn person(confidence: f32) -> Detection {
        Detection::new(
            BoundingBox::new(10.0, 10.0, 50.0, 90.0).unwrap(),
            0,
            confidence,
        )
        .unwrap()
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(RgbImage::new(64, 64), seq)
    }

    #[test]
    fn per_frame_script_overrides_default() -> Result<()> {
        let mut backend = StubBackend::repeating(vec![person(0.9)]).with_frame(2, vec![]);
        let thresholds = Thresholds::default();

        assert_eq!(backend.infer(&frame(1), thresholds)?.len(), 1);
        assert!(backend.infer(&frame(2), thresholds)?.is_empty());
        assert_eq!(backend.infer(&frame(3), thresholds)?.len(), 1);
        assert_eq!(backend.calls(), 3);
        Ok(())
    }

    #[test]
    fn applies_thresholds_unless_unfiltered() -> Result<()> {
        let script = vec![person(0.2), person(0.8)];
        let thresholds = Thresholds::new(0.5, 0.9)?;

        let mut filtered = StubBackend::repeating(script.clone());
        assert_eq!(filtered.infer(&frame(1), thresholds)?.len(), 1);

        let mut raw = StubBackend::repeating(script).unfiltered();
        assert_eq!(raw.infer(&frame(1), thresholds)?.len(), 2);
        Ok(())
    }

    #[test]
    fn scripted_failure_is_an_inference_error() {
        let mut backend = StubBackend::new().failing_on(4);
        let err = backend
            .infer(&frame(4), Thresholds::default())
            .unwrap_err();
        assert!(matches!(
            crate::error::pipeline_error(&err),
            Some(PipelineError::Inference(_))
        ));
    }
}
