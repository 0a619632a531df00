//! Class catalog: class id to label and display colour.
//!
//! The catalog is built once at startup and shared read-only (`Arc`) between
//! the detector and the annotator.

use anyhow::{anyhow, Context, Result};
use image::Rgb;
use std::path::Path;

/// Label drawn for class ids the catalog does not know.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Class id counted as a person in the reference label set.
pub const PERSON_CLASS_ID: u32 = 0;

/// COCO detection labels, index = class id.
pub const COCO_LABELS: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Fixed drawing palette, cycled by class id.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

#[derive(Clone, Debug)]
pub struct ClassCatalog {
    labels: Vec<String>,
}

impl ClassCatalog {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// The 80-entry COCO label set.
    pub fn coco() -> Self {
        Self::new(COCO_LABELS.iter().map(|label| label.to_string()).collect())
    }

    /// Load labels from a text file, one label per line; line index is the class id.
    ///
    /// Blank lines keep their slot so ids stay aligned with the model head.
    pub fn from_labels_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        let labels: Vec<String> = raw
            .lines()
            .map(|line| line.trim().to_string())
            .collect();
        if labels.iter().all(|label| label.is_empty()) {
            return Err(anyhow!("labels file {} is empty", path.display()));
        }
        Ok(Self::new(labels))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, class_id: u32) -> Option<&str> {
        self.labels
            .get(class_id as usize)
            .map(String::as_str)
            .filter(|label| !label.is_empty())
    }

    /// Label for a class id, or `"Unknown"` when the id is absent.
    pub fn label(&self, class_id: u32) -> &str {
        self.get(class_id).unwrap_or(UNKNOWN_LABEL)
    }

    /// Display colour for a class id. Deterministic, also for unknown ids.
    pub fn color(&self, class_id: u32) -> Rgb<u8> {
        Rgb(PALETTE[class_id as usize % PALETTE.len()])
    }
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::coco()
    }
}
