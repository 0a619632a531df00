mod backend;
mod backends;
mod postprocess;
mod result;

pub use backend::Detector;
pub use backends::{load_detector, BackendKind, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use postprocess::{
    decode_yolo_output, filter_by_confidence, non_max_suppression, InputGeometry,
};
pub use result::{BoundingBox, Detection, Thresholds};
