//! Headless sink for servers and CI: logs counters and optionally writes
//! annotated JPEG snapshots.

use anyhow::{Context, Result};
use std::path::PathBuf;

use super::DisplaySink;
use crate::annotate::Annotated;

#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    /// Log the counters every N frames. 0 logs only at debug level.
    pub log_every: u64,
    pub snapshot_dir: Option<PathBuf>,
    /// Write every Nth frame into `snapshot_dir`. 0 disables snapshots.
    pub snapshot_every: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            log_every: 30,
            snapshot_dir: None,
            snapshot_every: 30,
        }
    }
}

pub struct HeadlessSink {
    config: HeadlessConfig,
    presented: u64,
    snapshots: u64,
    dir_ready: bool,
}

impl HeadlessSink {
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            config,
            presented: 0,
            snapshots: 0,
            dir_ready: false,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn snapshots(&self) -> u64 {
        self.snapshots
    }

    fn snapshot(&mut self, annotated: &Annotated) -> Result<()> {
        let Some(dir) = &self.config.snapshot_dir else {
            return Ok(());
        };
        if self.config.snapshot_every == 0 || self.presented % self.config.snapshot_every != 0 {
            return Ok(());
        }
        if !self.dir_ready {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create snapshot directory {}", dir.display()))?;
            self.dir_ready = true;
        }
        let path = dir.join(format!("frame_{:06}.jpg", annotated.frame.seq));
        annotated
            .frame
            .image()
            .save(&path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        self.snapshots += 1;
        Ok(())
    }
}

impl DisplaySink for HeadlessSink {
    fn present(&mut self, annotated: Annotated) -> Result<()> {
        self.presented += 1;
        let line = annotated.overlay.lines().join("  ");
        if self.config.log_every > 0 && self.presented % self.config.log_every == 0 {
            log::info!("frame {}: {}", annotated.frame.seq, line);
        } else {
            log::debug!("frame {}: {}", annotated.frame.seq, line);
        }
        self.snapshot(&annotated)
    }

    fn poll_for_exit(&mut self) -> bool {
        false
    }

    fn clear(&mut self) {
        log::info!(
            "HeadlessSink: {} frames presented, {} snapshots written",
            self.presented,
            self.snapshots
        );
    }
}
