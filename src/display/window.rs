//! Native window sink backed by OpenCV highgui.

use anyhow::{Context, Result};
use opencv::core::Mat;
use opencv::highgui;
use opencv::prelude::*;

use super::DisplaySink;
use crate::annotate::Annotated;

const QUIT_KEYS: [i32; 2] = ['q' as i32, 'Q' as i32];

pub struct WindowSink {
    title: String,
    window_open: bool,
    quit_requested: bool,
}

impl WindowSink {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            window_open: false,
            quit_requested: false,
        }
    }

    fn ensure_window(&mut self) -> Result<()> {
        if !self.window_open {
            highgui::named_window(&self.title, highgui::WINDOW_AUTOSIZE)
                .with_context(|| format!("open window '{}'", self.title))?;
            self.window_open = true;
        }
        Ok(())
    }
}

/// OpenCV expects interleaved BGR rows.
fn to_bgr_mat(annotated: &Annotated) -> Result<Mat> {
    let image = annotated.frame.image();
    let mut bgr = image.as_raw().clone();
    for pixel in bgr.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }
    let flat = Mat::from_slice(&bgr).context("wrap frame buffer")?;
    let mat = flat
        .reshape(3, image.height() as i32)
        .context("reshape frame to BGR image")?
        .try_clone()
        .context("copy frame into Mat")?;
    Ok(mat)
}

impl DisplaySink for WindowSink {
    fn present(&mut self, annotated: Annotated) -> Result<()> {
        self.ensure_window()?;
        let mat = to_bgr_mat(&annotated)?;
        highgui::imshow(&self.title, &mat).context("show frame")?;
        let key = highgui::wait_key(1).context("poll window keys")?;
        if QUIT_KEYS.contains(&key) {
            log::info!("WindowSink: quit key pressed");
            self.quit_requested = true;
        }
        Ok(())
    }

    fn poll_for_exit(&mut self) -> bool {
        self.quit_requested
    }

    fn clear(&mut self) {
        if self.window_open {
            if let Err(err) = highgui::destroy_window(&self.title) {
                log::warn!("WindowSink: failed to close '{}': {}", self.title, err);
            }
            self.window_open = false;
        }
        self.quit_requested = false;
    }
}
