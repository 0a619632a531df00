//! headcount - live detection loop
//!
//! Reads frames from a camera, video file, image directory or `stub://`
//! stream, runs the detector on each one and either shows the annotated
//! frames in a window (press `q` to quit) or logs the counters headlessly.
//! Ctrl-C stops the loop cleanly in both modes.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use headcount::app::build_controller;
use headcount::config::AppConfig;
use headcount::display::{DisplaySink, HeadlessSink};
use headcount::{BackendKind, StopReason};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect and count people in live camera or video frames"
)]
struct Args {
    /// Config file (.toml or .json).
    #[arg(long, env = "HEADCOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Camera index, video file, image directory or stub:// URL.
    #[arg(long)]
    source: Option<String>,

    /// ONNX model path.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Detector backend: tract or stub.
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Minimum confidence to keep a detection.
    #[arg(long)]
    conf: Option<f32>,

    /// IoU above which overlapping boxes of one class are suppressed.
    #[arg(long)]
    iou: Option<f32>,

    /// Square model input size.
    #[arg(long)]
    imgsz: Option<u32>,

    /// Labels file, one class name per line.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// TrueType font used for labels and counters, replacing the built-in one.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Log counters instead of opening a window.
    #[arg(long)]
    headless: bool,

    /// Headless mode: write annotated JPEG snapshots here.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Headless mode: snapshot every N frames.
    #[arg(long)]
    snapshot_every: Option<u64>,
}

impl Args {
    fn apply(self, cfg: &mut AppConfig) -> Result<()> {
        if let Some(source) = self.source {
            cfg.source = source;
        }
        if let Some(model) = self.model {
            cfg.model.path = model;
        }
        if let Some(backend) = self.backend {
            cfg.model.backend = backend;
        }
        if let Some(conf) = self.conf {
            cfg.detection.confidence = conf;
        }
        if let Some(iou) = self.iou {
            cfg.detection.overlap = iou;
        }
        if let Some(size) = self.imgsz {
            cfg.model.input_width = size;
            cfg.model.input_height = size;
        }
        if self.labels.is_some() {
            cfg.display.labels = self.labels;
        }
        if self.font.is_some() {
            cfg.display.font = self.font;
        }
        if self.snapshot_dir.is_some() {
            cfg.display.headless.snapshot_dir = self.snapshot_dir;
        }
        if let Some(every) = self.snapshot_every {
            cfg.display.headless.snapshot_every = every;
        }
        cfg.validate()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let headless = args.headless;
    args.apply(&mut cfg)?;

    let sink = build_sink(&cfg, headless)?;
    let mut controller = build_controller(&cfg, sink)?;

    let stop = controller.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping detection loop...");
        stop.request_stop();
    })
    .context("error setting Ctrl-C handler")?;

    let summary = controller.run_blocking()?;
    log::info!(
        "processed {} frames ({} failed cycles)",
        summary.frames_presented,
        summary.failed_cycles
    );
    if summary.reason == StopReason::TooManyFailures {
        anyhow::bail!(
            "detection loop gave up after {} consecutive failures",
            cfg.detection.max_consecutive_failures
        );
    }
    Ok(())
}

fn build_sink(cfg: &AppConfig, headless: bool) -> Result<Box<dyn DisplaySink>> {
    if headless {
        return Ok(Box::new(HeadlessSink::new(cfg.display.headless.clone())));
    }
    window_sink(cfg)
}

#[cfg(feature = "display-highgui")]
fn window_sink(cfg: &AppConfig) -> Result<Box<dyn DisplaySink>> {
    Ok(Box::new(headcount::display::WindowSink::new(
        cfg.display.window_title.clone(),
    )))
}

#[cfg(not(feature = "display-highgui"))]
fn window_sink(cfg: &AppConfig) -> Result<Box<dyn DisplaySink>> {
    log::warn!(
        "built without display-highgui; running '{}' headless",
        cfg.display.window_title
    );
    Ok(Box::new(HeadlessSink::new(cfg.display.headless.clone())))
}
