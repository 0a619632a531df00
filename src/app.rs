//! Startup wiring shared by the binaries.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::annotate::{load_font, Annotator};
use crate::catalog::ClassCatalog;
use crate::config::AppConfig;
use crate::controller::{FailurePolicy, LoopController, Pipeline};
use crate::detect::load_detector;
use crate::display::DisplaySink;

pub fn load_catalog(config: &AppConfig) -> Result<ClassCatalog> {
    match &config.display.labels {
        Some(path) => ClassCatalog::from_labels_file(path),
        None => Ok(ClassCatalog::coco()),
    }
}

pub fn build_annotator(config: &AppConfig, catalog: Arc<ClassCatalog>) -> Result<Annotator> {
    let mut annotator = Annotator::new(catalog)
        .with_person_class(config.detection.person_class)
        .with_fps(config.display.show_fps);
    if let Some(path) = &config.display.font {
        annotator = annotator.with_font(load_font(path)?);
    }
    Ok(annotator)
}

/// Load the model and build the source, annotator and thresholds around the
/// given sink. Model load failure is fatal to the caller.
pub fn build_pipeline(config: &AppConfig, sink: Box<dyn DisplaySink>) -> Result<Pipeline> {
    let thresholds = config.thresholds()?;
    let catalog = Arc::new(load_catalog(config)?);
    let spec = config.source_spec()?;
    let source = spec
        .build(config.capture)
        .with_context(|| format!("build source for {}", spec))?;
    let detector = load_detector(
        config.model.backend,
        &config.model.path,
        config.model.input_width,
        config.model.input_height,
        Some(catalog.len()),
    )
    .with_context(|| format!("load model {}", config.model.path.display()))?;
    log::info!(
        "pipeline ready: source={} detector={} confidence={} overlap={}",
        spec,
        detector.name(),
        thresholds.confidence,
        thresholds.overlap
    );

    Ok(Pipeline {
        source,
        detector,
        annotator: build_annotator(config, catalog)?,
        sink,
        thresholds,
        policy: FailurePolicy {
            max_consecutive_failures: config.detection.max_consecutive_failures,
        },
    })
}

pub fn build_controller(config: &AppConfig, sink: Box<dyn DisplaySink>) -> Result<LoopController> {
    Ok(LoopController::new(build_pipeline(config, sink)?))
}
