//! Frame annotation.
//!
//! The annotator consumes a frame, draws one labelled box per detection plus
//! the `Total`/`Persons`/`FPS` overlay, and returns the frame together with a
//! record of everything it drew.

use ab_glyph::{FontArc, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{ClassCatalog, PERSON_CLASS_ID};
use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 16.0;
const OVERLAY_SCALE: f32 = 22.0;
const OVERLAY_ORIGIN: (i32, i32) = (10, 10);
const TEXT_PADDING: u32 = 3;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// DejaVu Sans, used when no font file is configured.
static BUILTIN_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

/// A box as it was drawn on the frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawnBox {
    pub label: String,
    pub color: Rgb<u8>,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl DrawnBox {
    /// Caption shown above the box, e.g. `person 87%`.
    pub fn caption(&self) -> String {
        format!("{} {:.0}%", self.label, self.confidence * 100.0)
    }
}

/// Summary counters drawn in the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Overlay {
    pub total: usize,
    pub persons: usize,
    /// Frames per second derived from the inference step alone.
    pub fps: Option<f32>,
}

impl Overlay {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Total: {}", self.total),
            format!("Persons: {}", self.persons),
        ];
        if let Some(fps) = self.fps {
            lines.push(format!("FPS: {:.1}", fps));
        }
        lines
    }
}

/// An annotated frame and the record of what was drawn on it.
pub struct Annotated {
    pub frame: Frame,
    pub boxes: Vec<DrawnBox>,
    pub overlay: Overlay,
}

pub struct Annotator {
    catalog: Arc<ClassCatalog>,
    font: Option<FontArc>,
    person_class: u32,
    show_fps: bool,
}

impl Annotator {
    pub fn new(catalog: Arc<ClassCatalog>) -> Self {
        Self {
            catalog,
            font: builtin_font(),
            person_class: PERSON_CLASS_ID,
            show_fps: true,
        }
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_person_class(mut self, class_id: u32) -> Self {
        self.person_class = class_id;
        self
    }

    pub fn with_fps(mut self, show_fps: bool) -> Self {
        self.show_fps = show_fps;
        self
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    pub fn annotate(
        &self,
        mut frame: Frame,
        detections: &[Detection],
        inference_time: Option<Duration>,
    ) -> Annotated {
        let boxes: Vec<DrawnBox> = detections
            .iter()
            .map(|detection| DrawnBox {
                label: self.catalog.label(detection.class_id).to_string(),
                color: self.catalog.color(detection.class_id),
                bbox: detection.bbox,
                confidence: detection.confidence,
            })
            .collect();

        let overlay = Overlay {
            total: detections.len(),
            persons: detections
                .iter()
                .filter(|detection| detection.class_id == self.person_class)
                .count(),
            fps: inference_time
                .filter(|elapsed| self.show_fps && !elapsed.is_zero())
                .map(|elapsed| 1.0 / elapsed.as_secs_f32()),
        };

        let image = frame.image_mut();
        for drawn in &boxes {
            self.draw_box(image, drawn);
        }
        self.draw_overlay(image, &overlay);

        Annotated {
            frame,
            boxes,
            overlay,
        }
    }

    fn draw_box(&self, image: &mut RgbImage, drawn: &DrawnBox) {
        let x = drawn.bbox.x_min.round() as i32;
        let y = drawn.bbox.y_min.round() as i32;
        let width = drawn.bbox.width().round().max(1.0) as u32;
        let height = drawn.bbox.height().round().max(1.0) as u32;

        for inset in 0..BOX_THICKNESS {
            let inner_w = width.saturating_sub(2 * inset as u32);
            let inner_h = height.saturating_sub(2 * inset as u32);
            if inner_w == 0 || inner_h == 0 {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(x + inset, y + inset).of_size(inner_w, inner_h),
                drawn.color,
            );
        }

        let caption = drawn.caption();
        let (text_w, text_h) = self.measure(&caption, LABEL_SCALE);
        let label_h = text_h + 2 * TEXT_PADDING;
        // Above the box when there is room, otherwise just inside its top edge.
        let label_y = if y >= label_h as i32 {
            y - label_h as i32
        } else {
            y
        };
        draw_filled_rect_mut(
            image,
            Rect::at(x, label_y).of_size(text_w + 2 * TEXT_PADDING, label_h),
            drawn.color,
        );
        self.draw_text(
            image,
            &caption,
            x + TEXT_PADDING as i32,
            label_y + TEXT_PADDING as i32,
            LABEL_SCALE,
            TEXT_COLOR,
        );
    }

    fn draw_overlay(&self, image: &mut RgbImage, overlay: &Overlay) {
        let (x, mut y) = OVERLAY_ORIGIN;
        for line in overlay.lines() {
            self.draw_text(image, &line, x, y, OVERLAY_SCALE, OVERLAY_COLOR);
            y += OVERLAY_SCALE as i32 + TEXT_PADDING as i32;
        }
    }

    fn measure(&self, text: &str, scale: f32) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(scale), font, text),
            None => (
                (text.chars().count() as f32 * scale * 0.55).ceil() as u32,
                scale.ceil() as u32,
            ),
        }
    }

    fn draw_text(&self, image: &mut RgbImage, text: &str, x: i32, y: i32, scale: f32, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            draw_text_mut(image, color, x, y, PxScale::from(scale), font, text);
        }
    }
}

fn builtin_font() -> Option<FontArc> {
    match FontArc::try_from_slice(BUILTIN_FONT) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("built-in font unusable, drawing without text: {}", err);
            None
        }
    }
}

/// Load a TrueType/OpenType font for label rendering.
pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("read font file {}", path.display()))?;
    FontArc::try_from_vec(bytes)
        .map_err(|err| anyhow!("invalid font file {}: {}", path.display(), err))
}
