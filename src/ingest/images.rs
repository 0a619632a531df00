//! Still-image directory source.
//!
//! Treats a directory of JPEG/PNG files as a finite video: files are read in
//! file name order and the source ends once every file has been returned.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{not_open, FrameSource, SourceStats};
use crate::error::PipelineError;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Option<Vec<PathBuf>>,
    next: usize,
    stats: SourceStats,
}

impl ImageDirSource {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: None,
            next: 0,
            stats: SourceStats::default(),
        }
    }

    fn list_images(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        format!("images {}", self.dir.display())
    }

    fn open(&mut self) -> Result<()> {
        let files = self.list_images().map_err(|err| {
            PipelineError::source_unavailable(self.dir.display().to_string(), format!("{:#}", err))
        })?;
        if files.is_empty() {
            return Err(PipelineError::source_unavailable(
                self.dir.display().to_string(),
                "directory contains no .jpg, .jpeg or .png files",
            )
            .into());
        }
        log::info!(
            "ImageDirSource: opened {} ({} images)",
            self.dir.display(),
            files.len()
        );
        self.files = Some(files);
        self.next = 0;
        self.stats.opens += 1;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        let description = self.describe();
        let files = self.files.as_ref().ok_or_else(|| not_open(&description))?;
        let Some(path) = files.get(self.next) else {
            return Err(PipelineError::EndOfStream.into());
        };
        // Advance first so an unreadable file is skipped on the next read.
        self.next += 1;
        let seq = self.next as u64;
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();

        self.stats.frames_read += 1;
        Ok(Frame::new(image, seq))
    }

    fn close(&mut self) {
        if self.files.take().is_some() {
            log::info!("ImageDirSource: closed {}", self.dir.display());
        }
    }

    fn is_open(&self) -> bool {
        self.files.is_some()
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{is_end_of_stream, pipeline_error};
    use image::{Rgb, RgbImage};

    #[test]
    fn reads_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 2, Rgb([0, 0, 255])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = ImageDirSource::new(dir.path().to_path_buf());
        source.open()?;
        let first = source.read()?;
        assert_eq!((first.seq, first.width()), (1, 2));
        assert_eq!(first.image().get_pixel(0, 0), &Rgb([255, 0, 0]));
        let second = source.read()?;
        assert_eq!((second.seq, second.width()), (2, 4));
        assert!(is_end_of_stream(&source.read().unwrap_err()));
        Ok(())
    }

    #[test]
    fn corrupt_image_costs_only_its_own_read() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("a.png"), b"not a png")?;
        RgbImage::from_pixel(3, 3, Rgb([0, 255, 0])).save(dir.path().join("b.png"))?;

        let mut source = ImageDirSource::new(dir.path().to_path_buf());
        source.open()?;
        let err = source.read().unwrap_err();
        assert!(!is_end_of_stream(&err));
        let frame = source.read()?;
        assert_eq!(frame.seq, 2);
        assert_eq!(frame.image().get_pixel(1, 1), &Rgb([0, 255, 0]));
        assert!(is_end_of_stream(&source.read().unwrap_err()));
        assert_eq!(source.stats().frames_read, 1);
        Ok(())
    }

    #[test]
    fn empty_directory_is_unavailable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = ImageDirSource::new(dir.path().to_path_buf());
        let err = source.open().unwrap_err();
        assert!(matches!(
            pipeline_error(&err),
            Some(PipelineError::SourceUnavailable { .. })
        ));
        assert!(!source.is_open());
        Ok(())
    }
}
