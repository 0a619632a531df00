//! Turning raw model output into detections.
//!
//! These functions are backend-independent so they can be exercised without a
//! model on disk.

use anyhow::Result;

use crate::detect::result::{BoundingBox, Detection, Thresholds};
use crate::error::PipelineError;

/// Box coordinates come first in every YOLO anchor row: cx, cy, w, h.
const CXCYWH: usize = 4;

/// Keep only detections with `confidence >= threshold`, preserving order.
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|det| det.confidence >= threshold)
        .collect()
}

/// Greedy per-class non-max suppression.
///
/// Output is ordered by descending confidence. A box is dropped when its IoU
/// with an already kept box of the same class exceeds `iou_threshold`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let duplicate = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// Geometry needed to map model-space boxes back onto the frame.
#[derive(Clone, Copy, Debug)]
pub struct InputGeometry {
    pub input_width: u32,
    pub input_height: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Class count the model was trained on. Used to recognise the transposed
    /// head layout; `None` always assumes `[1, 4 + nc, N]`.
    pub num_classes: Option<usize>,
}

impl InputGeometry {
    fn scale(&self) -> (f32, f32) {
        (
            self.frame_width as f32 / self.input_width as f32,
            self.frame_height as f32 / self.input_height as f32,
        )
    }
}

/// Decode a YOLOv8 / YOLO11 detection head.
///
/// Accepts `[1, 4 + nc, N]` (the exported default) and the transposed
/// `[1, N, 4 + nc]`; the leading batch axis may be omitted. The head is read
/// as `[4 + nc, N]` unless only the last axis matches `4 + nc` for the known
/// class count. Any other shape, or a data length that does not match the
/// shape, is an inference error.
pub fn decode_yolo_output(
    data: &[f32],
    shape: &[usize],
    geometry: InputGeometry,
    thresholds: Thresholds,
) -> Result<Vec<Detection>> {
    let (rows, cols) = match shape {
        [1, rows, cols] | [rows, cols] => (*rows, *cols),
        _ => {
            return Err(
                PipelineError::inference(format!("unexpected output shape {:?}", shape)).into(),
            )
        }
    };
    let channels_first = match geometry.num_classes {
        Some(classes) => rows == CXCYWH + classes || cols != CXCYWH + classes,
        None => true,
    };
    let (channels, anchors) = if channels_first {
        (rows, cols)
    } else {
        (cols, rows)
    };
    if channels <= CXCYWH {
        return Err(PipelineError::inference(format!(
            "output has {} channels, need at least {}",
            channels,
            CXCYWH + 1
        ))
        .into());
    }
    if data.len() != rows * cols {
        return Err(PipelineError::inference(format!(
            "output holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            rows * cols
        ))
        .into());
    }

    let at = |channel: usize, anchor: usize| -> f32 {
        if channels_first {
            data[channel * anchors + anchor]
        } else {
            data[anchor * channels + channel]
        }
    };

    let (sx, sy) = geometry.scale();
    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (CXCYWH..channels)
            .map(|channel| (channel - CXCYWH, at(channel, anchor)))
            .fold((0usize, f32::NEG_INFINITY), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });
        if !score.is_finite() || score < thresholds.confidence {
            continue;
        }

        let Ok(model_box) = BoundingBox::from_center(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        ) else {
            continue;
        };
        let Some(bbox) =
            model_box.scaled_clamped(sx, sy, geometry.frame_width, geometry.frame_height)
        else {
            continue;
        };
        detections.push(Detection::new(bbox, class_id as u32, score.clamp(0.0, 1.0))?);
    }

    Ok(non_max_suppression(detections, thresholds.overlap))
}
