use anyhow::{anyhow, Result};

/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Build a box from corners. Rejects empty, inverted and non-finite boxes.
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Result<Self> {
        let finite = [x_min, y_min, x_max, y_max].iter().all(|v| v.is_finite());
        if !finite || x_min >= x_max || y_min >= y_max {
            return Err(anyhow!(
                "degenerate box ({}, {}) - ({}, {})",
                x_min,
                y_min,
                x_max,
                y_max
            ));
        }
        Ok(Self {
            x_min,
            y_min,
            x_max,
            y_max,
        })
    }

    /// Build a box from centre and size, as YOLO heads emit them.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Result<Self> {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let w = (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0.0);
        let h = (self.y_max.min(other.y_max) - self.y_min.max(other.y_min)).max(0.0);
        w * h
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Scale by independent factors and clamp into a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of the box is left inside the frame.
    pub fn scaled_clamped(&self, sx: f32, sy: f32, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            (self.x_min * sx).clamp(0.0, w),
            (self.y_min * sy).clamp(0.0, h),
            (self.x_max * sx).clamp(0.0, w),
            (self.y_max * sy).clamp(0.0, h),
        )
        .ok()
    }
}

/// One candidate object in one frame. No identity is carried across frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: u32, confidence: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!("confidence {} outside [0, 1]", confidence));
        }
        Ok(Self {
            bbox,
            class_id,
            confidence,
        })
    }
}

/// Confidence and overlap cutoffs. Fixed for a whole run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    pub confidence: f32,
    /// IoU above which the weaker of two boxes is suppressed.
    pub overlap: f32,
}

impl Thresholds {
    pub fn new(confidence: f32, overlap: f32) -> Result<Self> {
        for (name, value) in [("confidence", confidence), ("overlap", overlap)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} threshold {} outside [0, 1]", name, value));
            }
        }
        Ok(Self {
            confidence,
            overlap,
        })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            overlap: 0.55,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_boxes() {
        assert!(BoundingBox::new(10.0, 10.0, 10.0, 20.0).is_err());
        assert!(BoundingBox::new(10.0, 20.0, 30.0, 5.0).is_err());
        assert!(BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn iou_of_half_overlap() -> Result<()> {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0)?;
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0)?;
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&BoundingBox::new(20.0, 20.0, 30.0, 30.0)?), 0.0);
        Ok(())
    }

    #[test]
    fn scaled_clamped_drops_boxes_outside_frame() -> Result<()> {
        let b = BoundingBox::new(700.0, 10.0, 800.0, 50.0)?;
        assert!(b.scaled_clamped(1.0, 1.0, 640, 480).is_none());

        let inside = BoundingBox::new(-10.0, 10.0, 100.0, 50.0)?
            .scaled_clamped(0.5, 2.0, 640, 480)
            .expect("box inside frame");
        assert_eq!(inside, BoundingBox::new(0.0, 20.0, 50.0, 100.0)?);
        Ok(())
    }

    #[test]
    fn thresholds_validate_range() {
        assert!(Thresholds::new(0.5, 0.45).is_ok());
        assert!(Thresholds::new(1.5, 0.45).is_err());
        assert!(Thresholds::new(0.5, -0.1).is_err());
    }
}
