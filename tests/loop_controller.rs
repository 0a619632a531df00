use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;

use headcount::annotate::{Annotated, Annotator, Overlay};
use headcount::catalog::ClassCatalog;
use headcount::controller::{FailurePolicy, LoopController, LoopState, Pipeline, StopReason};
use headcount::detect::{BoundingBox, Detection, StubBackend, Thresholds};
use headcount::display::DisplaySink;
use headcount::error::{pipeline_error, PipelineError};
use headcount::frame::Frame;
use headcount::ingest::{FrameSource, SourceStats, SyntheticConfig, SyntheticSource};

#[derive(Default)]
struct Counters {
    opens: AtomicU64,
    closes: AtomicU64,
    clears: AtomicU64,
}

/// Synthetic source that records lifecycle calls and can be told to fail.
struct CountingSource {
    inner: SyntheticSource,
    counters: Arc<Counters>,
    fail_open: bool,
    fail_reads: bool,
}

impl FrameSource for CountingSource {
    fn describe(&self) -> String {
        format!("counting {}", self.inner.describe())
    }

    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(PipelineError::source_unavailable("counting", "camera unplugged").into());
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open()
    }

    fn read(&mut self) -> Result<Frame> {
        let frame = self.inner.read()?;
        if self.fail_reads {
            anyhow::bail!("corrupt frame {}", frame.seq);
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn stats(&self) -> SourceStats {
        self.inner.stats()
    }
}

#[derive(Clone, Debug)]
struct Presented {
    seq: u64,
    confidences: Vec<f32>,
    overlay: Overlay,
}

struct RecordingSink {
    frames: Arc<Mutex<Vec<Presented>>>,
    counters: Arc<Counters>,
}

impl DisplaySink for RecordingSink {
    fn present(&mut self, annotated: Annotated) -> Result<()> {
        self.frames.lock().unwrap().push(Presented {
            seq: annotated.frame.seq,
            confidences: annotated.boxes.iter().map(|b| b.confidence).collect(),
            overlay: annotated.overlay,
        });
        Ok(())
    }

    fn poll_for_exit(&mut self) -> bool {
        false
    }

    fn clear(&mut self) {
        self.counters.clears.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    controller: LoopController,
    frames: Arc<Mutex<Vec<Presented>>>,
    counters: Arc<Counters>,
}

struct Setup {
    frames: Option<u64>,
    detector: StubBackend,
    thresholds: Thresholds,
    max_failures: u32,
    fail_open: bool,
    fail_reads: bool,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            frames: Some(10),
            detector: StubBackend::new(),
            thresholds: Thresholds::default(),
            max_failures: 10,
            fail_open: false,
            fail_reads: false,
        }
    }
}

impl Setup {
    fn build(self) -> Harness {
        let counters = Arc::new(Counters::default());
        let frames = Arc::new(Mutex::new(Vec::new()));
        let source = CountingSource {
            inner: SyntheticSource::new(SyntheticConfig {
                name: "lobby".to_string(),
                frames: self.frames,
                width: 64,
                height: 64,
            }),
            counters: Arc::clone(&counters),
            fail_open: self.fail_open,
            fail_reads: self.fail_reads,
        };
        let sink = RecordingSink {
            frames: Arc::clone(&frames),
            counters: Arc::clone(&counters),
        };
        let pipeline = Pipeline {
            source: Box::new(source),
            detector: Box::new(self.detector),
            annotator: Annotator::new(Arc::new(ClassCatalog::coco())),
            sink: Box::new(sink),
            thresholds: self.thresholds,
            policy: FailurePolicy {
                max_consecutive_failures: self.max_failures,
            },
        };
        Harness {
            controller: LoopController::new(pipeline),
            frames,
            counters,
        }
    }
}

fn detection(class_id: u32, confidence: f32, x: f32) -> Detection {
    Detection::new(
        BoundingBox::new(x, 8.0, x + 16.0, 56.0).unwrap(),
        class_id,
        confidence,
    )
    .unwrap()
}

fn wait_until_stopped(controller: &LoopController) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while controller.state() == LoopState::Running {
        assert!(Instant::now() < deadline, "detection loop did not stop in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn ten_frame_video_presents_ten_frames_with_one_person_each() -> Result<()> {
    let mut harness = Setup {
        detector: StubBackend::repeating(vec![detection(0, 0.9, 8.0)]),
        ..Setup::default()
    }
    .build();

    assert!(harness.controller.start()?);
    wait_until_stopped(&harness.controller);
    harness.controller.stop()?;

    let frames = harness.frames.lock().unwrap();
    assert_eq!(frames.len(), 10);
    for (index, frame) in frames.iter().enumerate() {
        assert_eq!(frame.seq, index as u64 + 1);
        assert_eq!(frame.overlay.persons, 1);
        assert_eq!(frame.overlay.total, 1);
    }
    let summary = harness.controller.last_summary().unwrap();
    assert_eq!(summary.reason, StopReason::EndOfStream);
    assert_eq!(summary.frames_presented, 10);
    Ok(())
}

#[test]
fn empty_frame_in_the_middle_does_not_abort() -> Result<()> {
    let mut harness = Setup {
        detector: StubBackend::repeating(vec![detection(0, 0.9, 8.0)]).with_frame(5, Vec::new()),
        ..Setup::default()
    }
    .build();

    let summary = harness.controller.run_blocking()?;
    assert_eq!(summary.frames_presented, 10);
    assert_eq!(summary.failed_cycles, 0);

    let frames = harness.frames.lock().unwrap();
    let fifth = &frames[4];
    assert_eq!(fifth.seq, 5);
    assert!(fifth.confidences.is_empty());
    assert_eq!((fifth.overlay.total, fifth.overlay.persons), (0, 0));
    assert_eq!(frames[5].overlay.persons, 1);
    Ok(())
}

#[test]
fn confidence_filter_applies_to_every_backend() -> Result<()> {
    let mut harness = Setup {
        frames: Some(3),
        detector: StubBackend::repeating(vec![
            detection(0, 0.1, 0.0),
            detection(1, 0.6, 20.0),
            detection(2, 0.9, 40.0),
        ])
        .unfiltered(),
        thresholds: Thresholds::new(0.5, 0.55)?,
        ..Setup::default()
    }
    .build();

    harness.controller.run_blocking()?;
    let frames = harness.frames.lock().unwrap();
    assert_eq!(frames.len(), 3);
    for frame in frames.iter() {
        assert_eq!(frame.confidences, vec![0.6, 0.9]);
        assert_eq!(frame.overlay.persons, 0);
    }
    Ok(())
}

#[test]
fn stop_twice_leaves_controller_stopped() -> Result<()> {
    let mut harness = Setup {
        frames: None,
        ..Setup::default()
    }
    .build();

    harness.controller.start()?;
    harness.controller.stop()?;
    harness.controller.stop()?;
    assert_eq!(harness.controller.state(), LoopState::Stopped);
    assert_eq!(
        harness.controller.last_summary().map(|s| s.reason),
        Some(StopReason::Requested)
    );

    let mut idle = Setup::default().build();
    idle.controller.stop()?;
    idle.controller.stop()?;
    assert_eq!(idle.controller.state(), LoopState::Stopped);
    Ok(())
}

#[test]
fn start_while_running_opens_no_second_handle() -> Result<()> {
    let mut harness = Setup {
        frames: None,
        ..Setup::default()
    }
    .build();

    assert!(harness.controller.start()?);
    assert!(!harness.controller.start()?);
    assert!(!harness.controller.start()?);
    assert_eq!(harness.counters.opens.load(Ordering::SeqCst), 1);
    harness.controller.stop()?;

    assert_eq!(harness.counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.counters.clears.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn restart_after_stop_reopens_the_source() -> Result<()> {
    let mut harness = Setup {
        frames: None,
        ..Setup::default()
    }
    .build();

    harness.controller.start()?;
    harness.controller.stop()?;
    assert!(harness.controller.start()?);
    harness.controller.stop()?;

    assert_eq!(harness.counters.opens.load(Ordering::SeqCst), 2);
    assert_eq!(harness.counters.closes.load(Ordering::SeqCst), 2);
    assert_eq!(harness.counters.clears.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn stop_handle_ends_the_run_from_another_thread() -> Result<()> {
    let mut harness = Setup {
        frames: None,
        ..Setup::default()
    }
    .build();

    let handle = harness.controller.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        handle.request_stop();
    });

    let summary = harness.controller.run_blocking()?;
    stopper.join().unwrap();
    assert_eq!(summary.reason, StopReason::Requested);
    assert_eq!(harness.controller.state(), LoopState::Stopped);
    assert_eq!(harness.counters.closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn consecutive_read_failures_trip_the_cutoff() -> Result<()> {
    let mut harness = Setup {
        frames: None,
        fail_reads: true,
        max_failures: 4,
        ..Setup::default()
    }
    .build();

    let summary = harness.controller.run_blocking()?;
    assert_eq!(summary.reason, StopReason::TooManyFailures);
    assert_eq!(summary.failed_cycles, 4);
    assert_eq!(summary.frames_presented, 0);
    assert_eq!(harness.counters.closes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.counters.clears.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn inference_failures_reset_after_a_good_cycle() -> Result<()> {
    let detector = StubBackend::new()
        .failing_on(2)
        .failing_on(3)
        .failing_on(5)
        .failing_on(6);
    let mut harness = Setup {
        frames: Some(8),
        detector,
        max_failures: 3,
        ..Setup::default()
    }
    .build();

    let summary = harness.controller.run_blocking()?;
    assert_eq!(summary.reason, StopReason::EndOfStream);
    assert_eq!(summary.failed_cycles, 4);
    assert_eq!(summary.frames_presented, 4);
    Ok(())
}

#[test]
fn failed_open_leaves_state_unchanged() {
    let mut harness = Setup {
        fail_open: true,
        ..Setup::default()
    }
    .build();

    let err = harness.controller.start().unwrap_err();
    assert!(matches!(
        pipeline_error(&err),
        Some(PipelineError::SourceUnavailable { .. })
    ));
    assert_eq!(harness.controller.state(), LoopState::Idle);
    assert!(harness.controller.run_blocking().is_err());
    assert_eq!(harness.controller.state(), LoopState::Idle);
    assert_eq!(harness.counters.closes.load(Ordering::SeqCst), 0);
}
