//! YuNet face detector on ONNX Runtime.
//!
//! The model takes a fixed 640x640 BGR frame and produces, per stride (8, 16,
//! 32), class and objectness scores, box regressions and five landmarks for
//! every anchor cell.

use anyhow::Result;
use image::RgbImage;
use log::debug;
use ndarray::Array;
use ort::{session::Session, value::Value};
use std::path::Path;
use std::time::Instant;

use crate::color_utils::symbols;
use crate::face_detector::{nms, FaceDetection, FaceDetector};
use crate::focus_params::FocusParams;
use crate::onnx_session::{create_onnx_session, Device, ModelInfo};

/// Side of the square model input.
pub const INPUT_SIZE: u32 = 640;

const STRIDES: [u32; 3] = [8, 16, 32];

/// Raw per-stride model outputs, flattened in anchor order.
#[derive(Debug, Default, Clone)]
pub struct StrideOutput {
    pub stride: u32,
    pub cls: Vec<f32>,
    pub obj: Vec<f32>,
    /// 4 values per anchor: dx, dy, log w, log h
    pub bbox: Vec<f32>,
    /// 10 values per anchor: five (dx, dy) landmark offsets
    pub kps: Vec<f32>,
}

pub struct YuNetDetector {
    session: Session,
    model_info: ModelInfo,
    score_threshold: f32,
    nms_threshold: f32,
    top_k: usize,
}

impl YuNetDetector {
    pub fn new(model_path: &Path, device: Device, params: &FocusParams) -> Result<Self> {
        let (session, model_info) = create_onnx_session(model_path, device)?;
        debug!(
            "{} Loaded face model {}",
            symbols::model_loaded(),
            model_info.model_path
        );
        Ok(Self {
            session,
            model_info,
            score_threshold: params.score_threshold,
            nms_threshold: params.nms_threshold,
            top_k: params.top_k,
        })
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }
}

impl FaceDetector for YuNetDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceDetection>> {
        let input_tensor = preprocess_frame(frame)?;

        let inference_start = Instant::now();
        let input_name = self.session.inputs[0].name.clone();
        let input_value = Value::from_array(input_tensor)
            .map_err(|e| anyhow::anyhow!("Failed to create input value: {}", e))?;
        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => &input_value])
            .map_err(|e| anyhow::anyhow!("Failed to run inference: {}", e))?;

        let extract = |name: String| -> Result<Vec<f32>> {
            let view = outputs[name.as_str()]
                .try_extract_array::<f32>()
                .map_err(|e| anyhow::anyhow!("Failed to extract output {name}: {}", e))?;
            Ok(view.iter().copied().collect())
        };
        let mut strides = Vec::with_capacity(STRIDES.len());
        for stride in STRIDES {
            strides.push(StrideOutput {
                stride,
                cls: extract(format!("cls_{stride}"))?,
                obj: extract(format!("obj_{stride}"))?,
                bbox: extract(format!("bbox_{stride}"))?,
                kps: extract(format!("kps_{stride}"))?,
            });
        }
        debug!(
            "Face inference completed in {:.1} ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        let scale_x = frame.width() as f32 / INPUT_SIZE as f32;
        let scale_y = frame.height() as f32 / INPUT_SIZE as f32;
        let mut candidates = Vec::new();
        for output in &strides {
            candidates.extend(decode_stride(output, INPUT_SIZE, self.score_threshold)?);
        }
        for detection in &mut candidates {
            rescale(detection, scale_x, scale_y);
        }

        Ok(nms(candidates, self.nms_threshold, self.top_k))
    }
}

/// Resize to the model input and lay out as NCHW BGR in `[0, 255]`.
pub fn preprocess_frame(frame: &RgbImage) -> Result<Array<f32, ndarray::IxDyn>> {
    let resized = image::imageops::resize(
        frame,
        INPUT_SIZE,
        INPUT_SIZE,
        image::imageops::FilterType::Triangle,
    );

    let size = INPUT_SIZE as usize;
    let mut input_data = Vec::with_capacity(3 * size * size);
    for c in [2, 1, 0] {
        for pixel in resized.pixels() {
            input_data.push(pixel[c] as f32);
        }
    }

    let input = Array::from_shape_vec(ndarray::IxDyn(&[1, 3, size, size]), input_data)?;
    Ok(input)
}

/// Decode one stride's anchors into detections in model-input pixels.
pub fn decode_stride(
    output: &StrideOutput,
    input_size: u32,
    score_threshold: f32,
) -> Result<Vec<FaceDetection>> {
    let cols = (input_size / output.stride) as usize;
    let anchors = cols * cols;
    if output.cls.len() < anchors
        || output.obj.len() < anchors
        || output.bbox.len() < anchors * 4
        || output.kps.len() < anchors * 10
    {
        anyhow::bail!(
            "Unexpected output size for stride {}: expected {anchors} anchors",
            output.stride
        );
    }

    let stride = output.stride as f32;
    let mut detections = Vec::new();
    for i in 0..anchors {
        let cls = output.cls[i].clamp(0.0, 1.0);
        let obj = output.obj[i].clamp(0.0, 1.0);
        let score = (cls * obj).sqrt();
        if score < score_threshold {
            continue;
        }

        let col = (i % cols) as f32;
        let row = (i / cols) as f32;
        let b = &output.bbox[i * 4..i * 4 + 4];
        let cx = (col + b[0]) * stride;
        let cy = (row + b[1]) * stride;
        let width = b[2].exp() * stride;
        let height = b[3].exp() * stride;

        let k = &output.kps[i * 10..i * 10 + 10];
        let mut landmarks = [[0.0f32; 2]; 5];
        for (n, point) in landmarks.iter_mut().enumerate() {
            *point = [(k[2 * n] + col) * stride, (k[2 * n + 1] + row) * stride];
        }

        detections.push(FaceDetection {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
            landmarks,
            confidence: score,
        });
    }
    Ok(detections)
}

fn rescale(detection: &mut FaceDetection, scale_x: f32, scale_y: f32) {
    detection.x *= scale_x;
    detection.y *= scale_y;
    detection.width *= scale_x;
    detection.height *= scale_y;
    for point in &mut detection.landmarks {
        point[0] *= scale_x;
        point[1] *= scale_y;
    }
}
