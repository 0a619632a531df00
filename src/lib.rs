//! headcount: live object detection and people counting.
//!
//! Frames come from a camera, a video file, a directory of images or a
//! synthetic stream. Each frame goes through a YOLO model exported to ONNX, is
//! annotated with boxes, labels and `Total`/`Persons`/`FPS` counters, and is
//! shown in a native window, an embedded GUI widget or logged headlessly.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (camera, file, image directory, `stub://`)
//! - `detect`: Detector trait, YOLO output decoding, NMS, backends
//! - `annotate`: Drawing boxes, labels and counters onto frames
//! - `display`: Window, widget and headless sinks
//! - `controller`: The detection loop and its start/stop lifecycle
//! - `config`: File and environment configuration
//!
//! Optional hardware and model support is behind features: `ingest-v4l2`,
//! `ingest-file-ffmpeg`, `backend-tract`, `display-highgui`, `gui-egui`.

pub mod annotate;
pub mod app;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod detect;
pub mod display;
pub mod error;
pub mod frame;
pub mod ingest;

pub use annotate::{Annotated, Annotator, DrawnBox, Overlay};
pub use catalog::{ClassCatalog, PERSON_CLASS_ID, UNKNOWN_LABEL};
pub use config::AppConfig;
pub use controller::{
    FailurePolicy, LoopController, LoopState, Pipeline, RunSummary, StopHandle, StopReason,
};
pub use detect::{BackendKind, BoundingBox, Detection, Detector, StubBackend, Thresholds};
pub use display::{DisplaySink, FrameSlot, HeadlessConfig, HeadlessSink, WidgetSink};
pub use error::{is_end_of_stream, pipeline_error, PipelineError};
pub use frame::Frame;
pub use ingest::{
    CaptureSettings, FrameSource, ImageDirSource, SourceSpec, SourceStats, SyntheticConfig,
    SyntheticSource,
};
