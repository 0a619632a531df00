#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::Detector;
use crate::detect::postprocess::{decode_yolo_output, InputGeometry};
use crate::detect::result::{Detection, Thresholds};
use crate::error::PipelineError;
use crate::frame::Frame;

/// Tract-based backend for YOLO detection models exported to ONNX.
///
/// Frames are stretch-resized to the square model input, fed as normalised
/// NCHW f32, and the detection head is decoded on the CPU.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    num_classes: Option<usize>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// `num_classes` is the size of the class catalog the model was trained
    /// with, if known.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_width: u32,
        input_height: u32,
        num_classes: Option<usize>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        if input_width == 0 || input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input)",
            model_path.display(),
            input_width,
            input_height
        );

        Ok(Self {
            model,
            input_width,
            input_height,
            num_classes,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let resized = frame.stretched(self.input_width, self.input_height);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &Frame, thresholds: Thresholds) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|err| PipelineError::inference(format!("ONNX inference failed: {}", err)))?;
        let output = outputs
            .first()
            .ok_or_else(|| PipelineError::inference("model produced no outputs"))?;
        let data = output
            .as_slice::<f32>()
            .map_err(|_| PipelineError::inference("model output tensor was not f32"))?;

        decode_yolo_output(
            data,
            output.shape(),
            InputGeometry {
                input_width: self.input_width,
                input_height: self.input_height,
                frame_width: frame.width(),
                frame_height: frame.height(),
                num_classes: self.num_classes,
            },
            thresholds,
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::new(
            image::RgbImage::new(self.input_width, self.input_height),
            0,
        );
        self.infer(&blank, Thresholds::default()).map(|_| ())
    }
}
