//! headcount-gui - desktop front end
//!
//! A window with Start, Stop and Exit buttons above the live annotated
//! frame. The detection loop runs on its own worker thread and publishes
//! frames through a `FrameSlot`; the GUI thread only uploads the newest one
//! as a texture.

use anyhow::{anyhow, Result};
use clap::Parser;
use eframe::egui;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use headcount::app::build_controller;
use headcount::config::AppConfig;
use headcount::display::{EguiConverter, FrameSlot, WidgetSink};
use headcount::{LoopController, LoopState, Overlay};

#[derive(Parser, Debug)]
#[command(author, version, about = "Desktop front end for the headcount detection loop")]
struct Args {
    /// Config file (.toml or .json).
    #[arg(long, env = "HEADCOUNT_CONFIG")]
    config: Option<PathBuf>,

    /// Camera index, video file, image directory or stub:// URL.
    #[arg(long)]
    source: Option<String>,
}

struct HeadcountApp {
    controller: LoopController,
    slot: FrameSlot<egui::ColorImage>,
    texture: Option<egui::TextureHandle>,
    overlay: Overlay,
    status: String,
    /// Set while a run started from this window has not been torn down.
    active: bool,
}

/// Poll interval while a run is active, so a run that ends before its first
/// frame is still noticed.
const STATE_POLL: Duration = Duration::from_millis(200);

fn run_ended(active: bool, state: LoopState) -> bool {
    active && state != LoopState::Running
}

impl HeadcountApp {
    fn start(&mut self) {
        self.status = match self.controller.start() {
            Ok(true) => {
                self.active = true;
                "running".to_string()
            }
            Ok(false) => "already running".to_string(),
            Err(err) => {
                log::error!("start failed: {:#}", err);
                format!("start failed: {:#}", err)
            }
        };
    }

    fn stop(&mut self) {
        if let Err(err) = self.controller.stop() {
            log::error!("stop failed: {:#}", err);
        }
        self.active = false;
        self.texture = None;
        self.overlay = Overlay::default();
        self.status = match self.controller.last_summary() {
            Some(summary) => format!(
                "stopped ({:?}, {} frames)",
                summary.reason, summary.frames_presented
            ),
            None => "stopped".to_string(),
        };
    }

    fn upload_latest(&mut self, ctx: &egui::Context) {
        let Some(latest) = self.slot.take() else {
            return;
        };
        self.overlay = latest.overlay;
        match &mut self.texture {
            Some(texture) => texture.set(latest.image, egui::TextureOptions::default()),
            None => {
                self.texture = Some(ctx.load_texture(
                    "annotated-frame",
                    latest.image,
                    egui::TextureOptions::default(),
                ))
            }
        }
    }
}

impl eframe::App for HeadcountApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.upload_latest(ctx);
        // A run that ended by itself (end of stream, failure cutoff) leaves a
        // blank view, same as pressing Stop.
        if run_ended(self.active, self.controller.state()) {
            self.stop();
        }
        if self.active {
            ctx.request_repaint_after(STATE_POLL);
        }

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Start").clicked() {
                    self.start();
                }
                if ui.button("Stop").clicked() {
                    self.stop();
                }
                if ui.button("Exit").clicked() {
                    self.stop();
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                ui.separator();
                ui.label(&self.status);
                ui.separator();
                ui.label(self.overlay.lines().join("   "));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match &self.texture {
            Some(texture) => {
                ui.add(egui::Image::new(texture).shrink_to_fit());
            }
            None => {
                ui.centered_and_justified(|ui| {
                    ui.label("Press Start to begin detection");
                });
            }
        });
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(source) = args.source {
        cfg.source = source;
        cfg.validate()?;
    }

    let repaint: Arc<OnceLock<egui::Context>> = Arc::new(OnceLock::new());
    let notify = Arc::clone(&repaint);
    let slot = FrameSlot::new();
    let sink = WidgetSink::new(EguiConverter, slot.clone()).with_notify(move || {
        if let Some(ctx) = notify.get() {
            ctx.request_repaint();
        }
    });
    // The model is loaded before the window opens so a bad model path fails fast.
    let controller = build_controller(&cfg, Box::new(sink))?;

    let title = cfg.display.window_title.clone();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title.clone())
            .with_inner_size([900.0, 760.0]),
        ..Default::default()
    };
    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            let _ = repaint.set(cc.egui_ctx.clone());
            Ok(Box::new(HeadcountApp {
                controller,
                slot,
                texture: None,
                overlay: Overlay::default(),
                status: "idle".to_string(),
                active: false,
            }))
        }),
    )
    .map_err(|err| anyhow!("gui exited with error: {}", err))
}
