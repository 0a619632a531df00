//! Widget-embedded display.
//!
//! The loop thread converts each annotated frame into whatever image type the
//! GUI toolkit wants and drops it into a shared `FrameSlot`; the GUI reads the
//! slot on repaint. Only the newest frame is kept.

use anyhow::Result;
use image::RgbImage;
use std::sync::{Arc, Mutex, MutexGuard};

use super::DisplaySink;
use crate::annotate::{Annotated, Overlay};

/// Toolkit adapter turning an RGB frame into a displayable image.
pub trait ImageConverter: Send {
    type Output: Send;

    fn convert(&self, image: &RgbImage) -> Self::Output;
}

/// Hands the RGB frame through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct RgbConverter;

impl ImageConverter for RgbConverter {
    type Output = RgbImage;

    fn convert(&self, image: &RgbImage) -> RgbImage {
        image.clone()
    }
}

#[cfg(feature = "gui-egui")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EguiConverter;

#[cfg(feature = "gui-egui")]
impl ImageConverter for EguiConverter {
    type Output = eframe::egui::ColorImage;

    fn convert(&self, image: &RgbImage) -> Self::Output {
        eframe::egui::ColorImage::from_rgb(
            [image.width() as usize, image.height() as usize],
            image.as_raw(),
        )
    }
}

/// The most recent frame published to a GUI.
#[derive(Clone, Debug)]
pub struct SlotFrame<T> {
    pub image: T,
    pub overlay: Overlay,
    pub seq: u64,
}

/// Single-frame mailbox shared between the loop thread and the GUI thread.
pub struct FrameSlot<T> {
    inner: Arc<Mutex<Option<SlotFrame<T>>>>,
}

impl<T> Clone for FrameSlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    // A panic while holding the lock cannot leave a half-written frame, so a
    // poisoned slot is still usable.
    fn lock(&self) -> MutexGuard<'_, Option<SlotFrame<T>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, frame: SlotFrame<T>) {
        *self.lock() = Some(frame);
    }

    pub fn take(&self) -> Option<SlotFrame<T>> {
        self.lock().take()
    }

    /// Inspect the current frame without removing it.
    pub fn with_latest<R>(&self, f: impl FnOnce(&SlotFrame<T>) -> R) -> Option<R> {
        self.lock().as_ref().map(f)
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

pub struct WidgetSink<C: ImageConverter> {
    converter: C,
    slot: FrameSlot<C::Output>,
    notify: Option<Box<dyn Fn() + Send>>,
}

impl<C: ImageConverter> WidgetSink<C> {
    pub fn new(converter: C, slot: FrameSlot<C::Output>) -> Self {
        Self {
            converter,
            slot,
            notify: None,
        }
    }

    /// Called after every published frame, e.g. to request a GUI repaint.
    pub fn with_notify(mut self, notify: impl Fn() + Send + 'static) -> Self {
        self.notify = Some(Box::new(notify));
        self
    }

    fn notify(&self) {
        if let Some(notify) = &self.notify {
            notify();
        }
    }
}

impl<C: ImageConverter> DisplaySink for WidgetSink<C> {
    fn present(&mut self, annotated: Annotated) -> Result<()> {
        let image = self.converter.convert(annotated.frame.image());
        self.slot.put(SlotFrame {
            image,
            overlay: annotated.overlay,
            seq: annotated.frame.seq,
        });
        self.notify();
        Ok(())
    }

    // Embedded widgets exit through the controller's stop().
    fn poll_for_exit(&mut self) -> bool {
        false
    }

    fn clear(&mut self) {
        self.slot.clear();
        self.notify();
    }
}
