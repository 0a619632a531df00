pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use anyhow::{anyhow, Result};
use std::path::Path;
use std::str::FromStr;

use crate::detect::backend::Detector;

/// Detector backends selectable from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Tract,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!("unknown detector backend '{}'", other)),
        }
    }
}

/// Load the configured detector. Failure here is fatal to the process.
pub fn load_detector(
    kind: BackendKind,
    model_path: &Path,
    input_width: u32,
    input_height: u32,
    num_classes: Option<usize>,
) -> Result<Box<dyn Detector>> {
    let mut detector: Box<dyn Detector> = match kind {
        BackendKind::Stub => {
            log::warn!("using stub detector; {} is not loaded", model_path.display());
            Box::new(StubBackend::new())
        }
        BackendKind::Tract => load_tract(model_path, input_width, input_height, num_classes)?,
    };
    detector.warm_up()?;
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn load_tract(
    model_path: &Path,
    input_width: u32,
    input_height: u32,
    num_classes: Option<usize>,
) -> Result<Box<dyn Detector>> {
    Ok(Box::new(TractBackend::new(
        model_path,
        input_width,
        input_height,
        num_classes,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(
    model_path: &Path,
    _input_width: u32,
    _input_height: u32,
    _num_classes: Option<usize>,
) -> Result<Box<dyn Detector>> {
    Err(anyhow!(
        "loading {} requires the backend-tract feature",
        model_path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("stub".parse::<BackendKind>().unwrap(), BackendKind::Stub);
        assert_eq!(" ONNX ".parse::<BackendKind>().unwrap(), BackendKind::Tract);
        assert!("tflite".parse::<BackendKind>().is_err());
    }

    #[test]
    fn stub_backend_loads_without_model() {
        let detector = load_detector(BackendKind::Stub, Path::new("missing.onnx"), 640, 640, None)
            .expect("stub detector");
        assert_eq!(detector.name(), "stub");
    }
}
