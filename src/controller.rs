//! Detection loop controller.
//!
//! Owns the pipeline (source, detector, annotator, sink) and runs one cycle at
//! a time: read, infer, filter, annotate, present, check for exit. The loop
//! runs either on a single background worker (`start`/`stop`) or on the
//! calling thread (`run_blocking`).
//!
//! Lifecycle:
//! - `Idle | Stopped --start()--> Running`
//! - `Running --stop() | end of stream | quit key | failure cutoff--> Stopped`
//!
//! The pipeline moves into the worker for the duration of a run and comes
//! back when the worker is joined, so two cycles can never touch the same
//! source at once. On the way out of every run the worker closes the source
//! and clears the sink exactly once.
//!
//! Inference has no timeout. A hung model blocks its cycle, and `stop()`
//! waits for that cycle to finish.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::annotate::Annotator;
use crate::detect::{filter_by_confidence, Detector, Thresholds};
use crate::display::DisplaySink;
use crate::error::{is_end_of_stream, PipelineError};
use crate::ingest::FrameSource;

pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` or a `StopHandle` cleared the running flag.
    Requested,
    EndOfStream,
    /// The display sink reported a quit request.
    QuitKey,
    TooManyFailures,
}

/// What happened during one run, from `start` to the worker exiting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub frames_presented: u64,
    pub failed_cycles: u64,
    pub reason: StopReason,
}

/// When to give up on a run whose cycles keep failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Stop after this many failed cycles in a row. 0 never stops.
    pub max_consecutive_failures: u32,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl FailurePolicy {
    fn exhausted(&self, consecutive: u32) -> bool {
        self.max_consecutive_failures != 0 && consecutive >= self.max_consecutive_failures
    }
}

/// Everything one cycle needs.
pub struct Pipeline {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn Detector>,
    pub annotator: Annotator,
    pub sink: Box<dyn DisplaySink>,
    pub thresholds: Thresholds,
    pub policy: FailurePolicy,
}

enum CycleOutcome {
    Presented,
    EndOfStream,
}

impl Pipeline {
    fn cycle(&mut self) -> Result<CycleOutcome> {
        let frame = match self.source.read() {
            Ok(frame) => frame,
            Err(err) if is_end_of_stream(&err) => return Ok(CycleOutcome::EndOfStream),
            Err(err) => return Err(err.context("read frame")),
        };

        let started = Instant::now();
        let detections = self
            .detector
            .infer(&frame, self.thresholds)
            .with_context(|| format!("run {} detector on frame {}", self.detector.name(), frame.seq))?;
        let inference_time = started.elapsed();
        let detections = filter_by_confidence(detections, self.thresholds.confidence);

        let annotated = self
            .annotator
            .annotate(frame, &detections, Some(inference_time));
        log::debug!(
            "frame {}: {} detections, {} persons, inference {:?}",
            annotated.frame.seq,
            annotated.overlay.total,
            annotated.overlay.persons,
            inference_time
        );
        self.sink.present(annotated).context("present frame")?;
        Ok(CycleOutcome::Presented)
    }

    fn run(&mut self, running: &AtomicBool) -> RunSummary {
        let mut cycles = 0;
        let mut frames_presented = 0;
        let mut failed_cycles = 0;
        let mut consecutive = 0u32;

        let reason = loop {
            if !running.load(Ordering::SeqCst) {
                break StopReason::Requested;
            }
            match self.cycle() {
                Ok(CycleOutcome::Presented) => {
                    cycles += 1;
                    frames_presented += 1;
                    consecutive = 0;
                }
                Ok(CycleOutcome::EndOfStream) => {
                    log::info!("{} reached end of stream", self.source.describe());
                    break StopReason::EndOfStream;
                }
                Err(err) => {
                    cycles += 1;
                    failed_cycles += 1;
                    consecutive += 1;
                    log::warn!("cycle failed ({} in a row): {:#}", consecutive, err);
                    if self.policy.exhausted(consecutive) {
                        log::error!(
                            "stopping after {} consecutive failed cycles",
                            consecutive
                        );
                        break StopReason::TooManyFailures;
                    }
                }
            }
            if self.sink.poll_for_exit() {
                log::info!("exit requested from display");
                break StopReason::QuitKey;
            }
        };

        RunSummary {
            cycles,
            frames_presented,
            failed_cycles,
            reason,
        }
    }

    fn release(&mut self) {
        self.source.close();
        self.sink.clear();
    }
}

struct Shared {
    running: AtomicBool,
    state: Mutex<LoopState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: LoopState) {
        *self.state() = state;
    }

    fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.set_state(LoopState::Stopped);
    }
}

/// Requests a stop without owning the controller, e.g. from a Ctrl-C handler.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Clear the running flag. The loop exits at its next cycle boundary.
    pub fn request_stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

type Worker = JoinHandle<(Pipeline, RunSummary)>;

pub struct LoopController {
    shared: Arc<Shared>,
    pipeline: Option<Pipeline>,
    worker: Option<Worker>,
    last_summary: Option<RunSummary>,
}

impl LoopController {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                state: Mutex::new(LoopState::Idle),
            }),
            pipeline: Some(pipeline),
            worker: None,
            last_summary: None,
        }
    }

    pub fn state(&self) -> LoopState {
        *self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Summary of the most recent run that has been joined.
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    /// Open the source and start the background worker.
    ///
    /// Returns `Ok(false)` without touching the source if a run is already in
    /// progress. If the source cannot be opened the state is left unchanged.
    pub fn start(&mut self) -> Result<bool> {
        if self.is_running() {
            log::debug!("start ignored: detection loop already running");
            return Ok(false);
        }
        self.join_worker()?;

        let mut pipeline = self.open_pipeline()?;
        let shared = Arc::clone(&self.shared);
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(LoopState::Running);
        log::info!("detection loop started on {}", pipeline.source.describe());

        let worker = std::thread::Builder::new()
            .name("headcount-loop".to_string())
            .spawn(move || {
                let summary = pipeline.run(&shared.running);
                pipeline.release();
                shared.finish();
                log::info!("detection loop stopped: {:?}", summary.reason);
                (pipeline, summary)
            });
        match worker {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(true)
            }
            Err(err) => {
                self.shared.finish();
                Err(anyhow::Error::new(err).context("spawn detection loop thread"))
            }
        }
    }

    /// Clear the running flag and wait for the worker to release the source.
    /// Safe to call in any state and more than once.
    pub fn stop(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        let joined = self.join_worker();
        self.shared.set_state(LoopState::Stopped);
        joined
    }

    /// Run the loop on the calling thread until it stops.
    pub fn run_blocking(&mut self) -> Result<RunSummary> {
        if self.is_running() {
            return Err(PipelineError::invalid_state("detection loop is already running").into());
        }
        self.join_worker()?;

        let mut pipeline = self.open_pipeline()?;
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.set_state(LoopState::Running);
        log::info!("detection loop running on {}", pipeline.source.describe());

        let summary = pipeline.run(&self.shared.running);
        pipeline.release();
        self.shared.finish();
        log::info!("detection loop stopped: {:?}", summary.reason);

        self.pipeline = Some(pipeline);
        self.last_summary = Some(summary.clone());
        Ok(summary)
    }

    fn open_pipeline(&mut self) -> Result<Pipeline> {
        let mut pipeline = self.pipeline.take().ok_or_else(|| {
            PipelineError::invalid_state("pipeline was lost when a previous run panicked")
        })?;
        if let Err(err) = pipeline.source.open() {
            self.pipeline = Some(pipeline);
            return Err(err);
        }
        Ok(pipeline)
    }

    fn join_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        match worker.join() {
            Ok((pipeline, summary)) => {
                self.pipeline = Some(pipeline);
                self.last_summary = Some(summary);
                Ok(())
            }
            Err(_) => {
                self.shared.finish();
                Err(anyhow!("detection loop thread panicked"))
            }
        }
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("detection loop did not shut down cleanly: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ClassCatalog;
    use crate::detect::StubBackend;
    use crate::display::{FrameSlot, RgbConverter, WidgetSink};
    use crate::ingest::{SyntheticConfig, SyntheticSource};

    fn pipeline(frames: u64, detector: StubBackend, max_failures: u32) -> Pipeline {
        Pipeline {
            source: Box::new(SyntheticSource::new(SyntheticConfig::video(
                "unit", frames, 16, 16,
            ))),
            detector: Box::new(detector),
            annotator: Annotator::new(Arc::new(ClassCatalog::coco())),
            sink: Box::new(WidgetSink::new(RgbConverter, FrameSlot::new())),
            thresholds: Thresholds::default(),
            policy: FailurePolicy {
                max_consecutive_failures: max_failures,
            },
        }
    }

    #[test]
    fn blocking_run_ends_at_end_of_stream() -> Result<()> {
        let mut controller = LoopController::new(pipeline(4, StubBackend::new(), 10));
        assert_eq!(controller.state(), LoopState::Idle);
        let summary = controller.run_blocking()?;
        assert_eq!(summary.frames_presented, 4);
        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(controller.state(), LoopState::Stopped);
        Ok(())
    }

    #[test]
    fn failure_cutoff_stops_the_run() -> Result<()> {
        let mut detector = StubBackend::new();
        for seq in 2..=20 {
            detector = detector.failing_on(seq);
        }
        let mut controller = LoopController::new(pipeline(20, detector, 3));
        let summary = controller.run_blocking()?;
        assert_eq!(summary.reason, StopReason::TooManyFailures);
        assert_eq!(summary.frames_presented, 1);
        assert_eq!(summary.failed_cycles, 3);
        Ok(())
    }

    #[test]
    fn zero_disables_failure_cutoff() -> Result<()> {
        let mut detector = StubBackend::new();
        for seq in 1..=12 {
            detector = detector.failing_on(seq);
        }
        let mut controller = LoopController::new(pipeline(12, detector, 0));
        let summary = controller.run_blocking()?;
        assert_eq!(summary.reason, StopReason::EndOfStream);
        assert_eq!(summary.failed_cycles, 12);
        Ok(())
    }

    #[test]
    fn can_restart_after_a_finished_run() -> Result<()> {
        let mut controller = LoopController::new(pipeline(2, StubBackend::new(), 10));
        controller.run_blocking()?;
        let summary = controller.run_blocking()?;
        assert_eq!(summary.frames_presented, 2);
        Ok(())
    }
}
