//! Synthetic frame source.
//!
//! `stub://` sources generate deterministic frames in memory. They stand in
//! for cameras and video files in tests and model-less demo runs.

use anyhow::{anyhow, Result};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{not_open, FrameSource, SourceStats};
use crate::error::PipelineError;
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

/// Configuration for a synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    /// Frames before end of stream. `None` streams forever, like a camera.
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl SyntheticConfig {
    /// Finite synthetic video of `frames` frames.
    pub fn video(name: &str, frames: u64, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            frames: Some(frames),
            width,
            height,
        }
    }

    /// Parse `stub://name?frames=N&width=W&height=H`. All query keys are optional.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source must start with stub://"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut config = Self {
            name: if name.is_empty() { "stub" } else { name }.to_string(),
            frames: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        };

        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed query parameter '{}' in {}", pair, url))?;
            match key {
                "frames" => config.frames = Some(parse_param(key, value, url)?),
                "width" => config.width = parse_param(key, value, url)?,
                "height" => config.height = parse_param(key, value, url)?,
                other => return Err(anyhow!("unknown stub:// parameter '{}'", other)),
            }
        }

        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic frame size must be non-zero"));
        }
        Ok(config)
    }
}

fn parse_param<T: FromStr>(key: &str, value: &str, url: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("{} is not a valid value for {} in {}", value, key, url))
}

/// In-memory generated frames.
pub struct SyntheticSource {
    config: SyntheticConfig,
    open: bool,
    frame_count: u64,
    stats: SourceStats,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            open: false,
            frame_count: 0,
            stats: SourceStats::default(),
        }
    }

    /// Moving gradient with a little seeded noise, so consecutive frames differ
    /// but a given frame number always renders the same.
    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut rng = StdRng::seed_from_u64(self.frame_count);
        let mut pixels = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                let base = (x + y + self.frame_count as usize * 4) % 256;
                let noise: u8 = rng.gen_range(0..8);
                pixels.push((base as u8).wrapping_add(noise));
                pixels.push(((y * 255) / height.max(1)) as u8);
                pixels.push(((x * 255) / width.max(1)) as u8);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.config.name)
    }

    fn open(&mut self) -> Result<()> {
        self.open = true;
        self.frame_count = 0;
        self.stats.opens += 1;
        log::info!(
            "SyntheticSource: opened {} ({}x{}, {})",
            self.describe(),
            self.config.width,
            self.config.height,
            match self.config.frames {
                Some(frames) => format!("{} frames", frames),
                None => "endless".to_string(),
            }
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(not_open(&self.describe()));
        }
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Err(PipelineError::EndOfStream.into());
        }

        self.frame_count += 1;
        self.stats.frames_read += 1;
        Frame::from_rgb(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    fn close(&mut self) {
        if self.open {
            log::info!("SyntheticSource: closed {}", self.describe());
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
