use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use image::RgbImage;

use headcount::annotate::Annotator;
use headcount::catalog::{ClassCatalog, UNKNOWN_LABEL};
use headcount::detect::{BoundingBox, Detection};
use headcount::frame::Frame;

fn detection(class_id: u32, x: f32) -> Detection {
    Detection::new(
        BoundingBox::new(x, 30.0, x + 20.0, 70.0).unwrap(),
        class_id,
        0.8,
    )
    .unwrap()
}

#[test]
fn every_label_comes_from_the_catalog_or_is_unknown() -> Result<()> {
    let mut labels = tempfile::NamedTempFile::new()?;
    // Line index is the class id; the blank line leaves id 1 unnamed.
    labels.write_all(b"visitor\n\nstaff\n")?;
    let catalog = Arc::new(ClassCatalog::from_labels_file(labels.path())?);
    let annotator = Annotator::new(Arc::clone(&catalog));

    let detections: Vec<Detection> = (0..6).map(|id| detection(id, id as f32 * 25.0)).collect();
    let annotated = annotator.annotate(Frame::new(RgbImage::new(200, 100), 1), &detections, None);

    let labels: Vec<&str> = annotated.boxes.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "visitor",
            UNKNOWN_LABEL,
            "staff",
            UNKNOWN_LABEL,
            UNKNOWN_LABEL,
            UNKNOWN_LABEL
        ]
    );
    for (drawn, detection) in annotated.boxes.iter().zip(&detections) {
        match catalog.get(detection.class_id) {
            Some(label) => assert_eq!(drawn.label, label),
            None => assert_eq!(drawn.label, UNKNOWN_LABEL),
        }
        assert_eq!(drawn.color, catalog.color(detection.class_id));
    }
    assert_eq!(annotated.overlay.total, 6);
    assert_eq!(annotated.overlay.persons, 1);
    Ok(())
}

#[test]
fn boxes_at_the_top_edge_keep_the_frame_size() {
    let annotator = Annotator::new(Arc::new(ClassCatalog::coco()));
    let at_edge = Detection::new(BoundingBox::new(0.0, 0.0, 40.0, 40.0).unwrap(), 0, 0.95).unwrap();
    let annotated = annotator.annotate(Frame::new(RgbImage::new(64, 48), 7), &[at_edge], None);

    assert_eq!(annotated.frame.seq, 7);
    assert_eq!((annotated.frame.width(), annotated.frame.height()), (64, 48));
    assert_eq!(annotated.boxes[0].caption(), "person 95%");
}
