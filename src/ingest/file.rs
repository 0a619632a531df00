//! Local video file frame source.
//!
//! `FileSource` decodes frames from a local video file. Decoding is done by
//! FFmpeg when the `ingest-file-ffmpeg` feature is enabled; without it every
//! file source fails at construction with `SOURCE_UNAVAILABLE`.
//!
//! The file source MUST NOT fetch remote URLs.

use anyhow::Result;
use std::path::{Path, PathBuf};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegDecoder;
use super::{not_open, FrameSource, SourceStats};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Local file frame source.
pub struct FileSource {
    path: PathBuf,
    #[cfg(feature = "ingest-file-ffmpeg")]
    decoder: Option<FfmpegDecoder>,
    #[cfg(feature = "ingest-file-ffmpeg")]
    frame_count: u64,
    stats: SourceStats,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Result<Self> {
        if path.as_os_str().is_empty() || path.to_string_lossy().contains("://") {
            return Err(PipelineError::source_unavailable(
                path.display().to_string(),
                "file ingestion only supports local paths",
            )
            .into());
        }
        ensure_decoder_available(&path)?;
        Ok(Self {
            path,
            #[cfg(feature = "ingest-file-ffmpeg")]
            decoder: None,
            #[cfg(feature = "ingest-file-ffmpeg")]
            frame_count: 0,
            stats: SourceStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn ensure_decoder_available(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn ensure_decoder_available(path: &Path) -> Result<()> {
    Err(PipelineError::source_unavailable(
        path.display().to_string(),
        "video file decoding requires the ingest-file-ffmpeg feature",
    )
    .into())
}

#[cfg(feature = "ingest-file-ffmpeg")]
impl FrameSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn open(&mut self) -> Result<()> {
        let decoder = FfmpegDecoder::open(&self.path).map_err(|err| {
            PipelineError::source_unavailable(self.path.display().to_string(), format!("{:#}", err))
        })?;
        log::info!(
            "FileSource: opened {} ({}x{})",
            self.path.display(),
            decoder.width(),
            decoder.height()
        );
        self.decoder = Some(decoder);
        self.frame_count = 0;
        self.stats.opens += 1;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        let description = self.describe();
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| not_open(&description))?;
        let Some((pixels, width, height)) = decoder.next_rgb()? else {
            return Err(PipelineError::EndOfStream.into());
        };
        self.frame_count += 1;
        self.stats.frames_read += 1;
        Frame::from_rgb(pixels, width, height, self.frame_count)
    }

    fn close(&mut self) {
        if self.decoder.take().is_some() {
            log::info!("FileSource: closed {}", self.path.display());
        }
    }

    fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

// Without a decoder `new` never succeeds, so this impl only keeps the type usable
// behind `dyn FrameSource`.
#[cfg(not(feature = "ingest-file-ffmpeg"))]
impl FrameSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn open(&mut self) -> Result<()> {
        ensure_decoder_available(&self.path)
    }

    fn read(&mut self) -> Result<Frame> {
        Err(not_open(&self.describe()))
    }

    fn close(&mut self) {}

    fn is_open(&self) -> bool {
        false
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
    fn rejects_url_schemes() {
        let err = FileSource::new(PathBuf::from("http://example.com/a.mp4"))
            .err()
            .expect("remote path must be rejected");
        assert!(matches!(
            pipeline_error(&err),
            Some(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn unavailable_without_decoder() {
        assert!(FileSource::new(PathBuf::from("clip.mp4")).is_err());
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    #[test]
    fn missing_file_fails_on_open() {
        let mut source = FileSource::new(PathBuf::from("/nonexistent/clip.mp4")).unwrap();
        assert!(source.read().is_err());
        let err = source.open().unwrap_err();
        assert!(matches!(
            pipeline_error(&err),
            Some(PipelineError::SourceUnavailable { .. })
        ));
        assert!(!source.is_open());
    }
}
