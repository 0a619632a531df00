//! Frame sources.
//!
//! This module provides the sources a detection loop can read from:
//! - Camera devices by index (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Directories of still images
//! - Synthetic `stub://` streams (testing and demos)
//!
//! Every source follows the same lifecycle: `open`, any number of `read`s,
//! `close`. Reading from a source that is not open fails with
//! `PipelineError::InvalidState`; a finite source that runs out of frames
//! fails with `PipelineError::EndOfStream`.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod images;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::frame::Frame;

pub use file::FileSource;
pub use images::ImageDirSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// A producer of frames with an explicit open/close lifecycle.
pub trait FrameSource: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Acquire the underlying device or file. May block until hardware is ready.
    fn open(&mut self) -> Result<()>;

    /// Read the next frame.
    fn read(&mut self) -> Result<Frame>;

    /// Release the underlying handle. Safe to call more than once.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub opens: u64,
}

/// Preferred capture parameters. Devices may override them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 640,
            target_fps: 30,
        }
    }
}

/// Where frames come from, parsed from a single string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Camera by index: `0`, `1`, ...
    Device { index: u32 },
    /// `stub://name?frames=N&width=W&height=H`
    Synthetic(SyntheticConfig),
    /// Directory of still images, read in file name order.
    ImageDir { path: PathBuf },
    /// Video file decoded with FFmpeg.
    File { path: PathBuf },
}

impl SourceSpec {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if value.chars().all(|c| c.is_ascii_digit()) {
            let index = value
                .parse()
                .map_err(|_| anyhow!("device index '{}' is out of range", value))?;
            return Ok(Self::Device { index });
        }
        if value.starts_with("stub://") {
            return Ok(Self::Synthetic(SyntheticConfig::from_url(value)?));
        }
        if value.contains("://") {
            return Err(anyhow!(
                "source '{}' is not supported; only local paths, device indexes and stub:// are",
                value
            ));
        }
        let path = PathBuf::from(value);
        if path.is_dir() {
            Ok(Self::ImageDir { path })
        } else {
            Ok(Self::File { path })
        }
    }

    /// Build an unopened source.
    pub fn build(&self, capture: CaptureSettings) -> Result<Box<dyn FrameSource>> {
        match self {
            Self::Device { index } => build_device(*index, capture),
            Self::Synthetic(config) => Ok(Box::new(SyntheticSource::new(config.clone()))),
            Self::ImageDir { path } => Ok(Box::new(ImageDirSource::new(path.clone()))),
            Self::File { path } => Ok(Box::new(FileSource::new(path.clone())?)),
        }
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device { index } => write!(f, "device {}", index),
            Self::Synthetic(config) => write!(f, "stub://{}", config.name),
            Self::ImageDir { path } => write!(f, "images {}", path.display()),
            Self::File { path } => write!(f, "file {}", path.display()),
        }
    }
}

#[cfg(feature = "ingest-v4l2")]
fn build_device(index: u32, capture: CaptureSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(V4l2Config::for_index(
        index, capture,
    ))))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn build_device(index: u32, _capture: CaptureSettings) -> Result<Box<dyn FrameSource>> {
    Err(PipelineError::source_unavailable(
        format!("device {}", index),
        "camera capture requires the ingest-v4l2 feature",
    )
    .into())
}

pub(crate) fn not_open(description: &str) -> anyhow::Error {
    PipelineError::invalid_state(format!("read from {} while it is not open", description)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_index() {
        assert_eq!(
            SourceSpec::parse("1").unwrap(),
            SourceSpec::Device { index: 1 }
        );
    }

    #[test]
    fn parses_stub_url() {
        let spec = SourceSpec::parse("stub://lobby?frames=10&width=32&height=24").unwrap();
        let SourceSpec::Synthetic(config) = spec else {
            panic!("expected synthetic source");
        };
        assert_eq!(config.name, "lobby");
        assert_eq!(config.frames, Some(10));
        assert_eq!((config.width, config.height), (32, 24));
    }

    #[test]
    fn parses_paths() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            SourceSpec::parse(dir.path().to_str().unwrap()).unwrap(),
            SourceSpec::ImageDir {
                path: dir.path().to_path_buf()
            }
        );
        assert_eq!(
            SourceSpec::parse("videos/entrance.mp4").unwrap(),
            SourceSpec::File {
                path: PathBuf::from("videos/entrance.mp4")
            }
        );
    }

    #[test]
    fn rejects_remote_urls() {
        assert!(SourceSpec::parse("rtsp://camera-1/stream").is_err());
        assert!(SourceSpec::parse("  ").is_err());
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_without_capture_feature_is_unavailable() {
        let err = SourceSpec::Device { index: 0 }
            .build(CaptureSettings::default())
            .err()
            .expect("device source should be unavailable");
        assert!(matches!(
            crate::error::pipeline_error(&err),
            Some(PipelineError::SourceUnavailable { .. })
        ));
    }
}
