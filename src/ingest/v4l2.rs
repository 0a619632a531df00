//! V4L2 camera source.
//!
//! `V4l2Source` captures frames from a local video device (`/dev/videoN`).
//! The device is requested in RGB24 at the configured size; if the driver
//! insists on YUYV or NV12 the buffer is converted to RGB in memory. Drivers
//! may also override the requested size, in which case the active size wins.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{not_open, CaptureSettings, FrameSource, SourceStats};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    pub capture: CaptureSettings,
}

impl V4l2Config {
    pub fn for_index(index: u32, capture: CaptureSettings) -> Self {
        Self {
            device: format!("/dev/video{}", index),
            capture,
        }
    }
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self::for_index(0, CaptureSettings::default())
    }
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct ActiveFormat {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

/// V4L2 frame source.
pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    active: Option<ActiveFormat>,
    frame_count: u64,
    stats: SourceStats,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            config,
            state: None,
            active: None,
            frame_count: 0,
            stats: SourceStats::default(),
        }
    }

    fn unavailable(&self, err: anyhow::Error) -> anyhow::Error {
        PipelineError::source_unavailable(self.config.device.clone(), format!("{:#}", err)).into()
    }

    fn open_device(&self) -> Result<(DeviceState, ActiveFormat)> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let capture = self.config.capture;
        let device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = capture.width;
        format.height = capture.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported capture format {} (need RGB3, YUYV or NV12)",
                format.fourcc
            )
        })?;

        if capture.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(capture.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        Ok((
            state,
            ActiveFormat {
                width: format.width,
                height: format.height,
                pixel_format,
            },
        ))
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn open(&mut self) -> Result<()> {
        let (state, active) = self.open_device().map_err(|err| self.unavailable(err))?;
        log::info!(
            "V4l2Source: opened {} ({}x{}, {:?})",
            self.config.device,
            active.width,
            active.height,
            active.pixel_format
        );
        self.state = Some(state);
        self.active = Some(active);
        self.frame_count = 0;
        self.stats.opens += 1;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let Some(active) = self.active.as_ref() else {
            return Err(not_open(&self.config.device));
        };
        let (width, height, pixel_format) = (active.width, active.height, active.pixel_format);
        let Some(state) = self.state.as_mut() else {
            return Err(not_open(&self.config.device));
        };
        let pixels = state.with_stream_mut(|stream| -> Result<Vec<u8>> {
            let (buf, _meta) = stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, width, height, pixel_format)
        })?;

        self.frame_count += 1;
        self.stats.frames_read += 1;
        Frame::from_rgb(pixels, width, height, self.frame_count)
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.config.device);
        }
        self.active = None;
    }

    fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::pipeline_error;

    #[test]
    fn index_maps_to_device_node() {
        let config = V4l2Config::for_index(2, CaptureSettings::default());
        assert_eq!(config.device, "/dev/video2");
    }

    #[test]
    fn missing_device_is_unavailable() {
        let mut source = V4l2Source::new(V4l2Config::for_index(
            250,
            CaptureSettings::default(),
        ));
        let err = source.open().unwrap_err();
        assert!(matches!(
            pipeline_error(&err),
            Some(PipelineError::SourceUnavailable { .. })
        ));
        assert!(!source.is_open());
        assert!(source.read().is_err());
    }
}
