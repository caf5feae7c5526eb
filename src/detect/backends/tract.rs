use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::yolo;
use crate::frame::Frame;

/// Default square input edge for YOLO exports.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Tract-based backend for ONNX object detection models.
///
/// Frames are resized (not letterboxed) to the model input, and decoded boxes
/// are scaled back to frame pixels. The model is loaded once from a local
/// file; inference performs no I/O.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    class_names: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_width: u32,
        input_height: u32,
        class_names: Vec<String>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
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

        if class_names.is_empty() {
            log::warn!("TractBackend: no class names configured; labels will be class_<n>");
        }

        Ok(Self {
            model,
            input_width,
            input_height,
            class_names,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let resized = imageops::resize(
            frame.image(),
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let shape = scores.shape().to_vec();
        let (channels, anchors) = match shape.as_slice() {
            [1, channels, anchors] => (*channels, *anchors),
            [channels, anchors] => (*channels, *anchors),
            other => return Err(anyhow!("unexpected detection output shape {:?}", other)),
        };
        let data: Vec<f32> = scores.iter().copied().collect();

        let scale_x = frame.width() as f32 / self.input_width as f32;
        let scale_y = frame.height() as f32 / self.input_height as f32;
        yolo::decode_channel_major(&data, channels, anchors, &self.class_names, scale_x, scale_y)
    }
}
