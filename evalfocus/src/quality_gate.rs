//! Optional no-reference quality pre-check.
//!
//! A gate returns a distortion score for the whole frame; frames scoring above
//! the configured threshold are not worth a focus analysis.

use anyhow::Result;
use image::RgbImage;
use log::debug;
use ort::{session::Session, value::Value};
use std::path::Path;

use crate::color_utils::symbols;
use crate::onnx_session::{create_onnx_session, Device, ModelInfo};

/// Side of the square input the quality model expects.
pub const QUALITY_INPUT_SIZE: u32 = 224;

pub trait QualityGate {
    /// Distortion score of `frame`; higher means worse.
    fn quality_score(&mut self, frame: &RgbImage) -> Result<f64>;
}

pub struct OnnxQualityGate {
    session: Session,
    model_info: ModelInfo,
}

impl OnnxQualityGate {
    pub fn new(model_path: &Path, device: Device) -> Result<Self> {
        let (session, model_info) = create_onnx_session(model_path, device)?;
        debug!(
            "{} Loaded quality model {}",
            symbols::model_loaded(),
            model_info.model_path
        );
        Ok(Self {
            session,
            model_info,
        })
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }
}

impl QualityGate for OnnxQualityGate {
    fn quality_score(&mut self, frame: &RgbImage) -> Result<f64> {
        let input_array = preprocess_image_for_quality(frame);

        let input_name = self.session.inputs[0].name.clone();
        let output_name = self.session.outputs[0].name.clone();
        let input_value = Value::from_array(input_array)
            .map_err(|e| anyhow::anyhow!("Failed to create input value: {}", e))?;
        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => &input_value])
            .map_err(|e| anyhow::anyhow!("Failed to run inference: {}", e))?;

        let output_view = outputs[output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| anyhow::anyhow!("Failed to extract output array: {}", e))?;

        // the global score follows any per-patch scores
        let score = output_view
            .iter()
            .last()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Quality model returned an empty output"))?;
        Ok(score as f64)
    }
}

/// `[1, 3, 224, 224]` RGB tensor in `[0, 1]`.
pub fn preprocess_image_for_quality(frame: &RgbImage) -> ndarray::Array4<f32> {
    let resized = image::imageops::resize(
        frame,
        QUALITY_INPUT_SIZE,
        QUALITY_INPUT_SIZE,
        image::imageops::FilterType::Lanczos3,
    );
    let size = QUALITY_INPUT_SIZE as usize;
    let mut array = ndarray::Array4::<f32>::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            array[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    array
}
