use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

/// Landmark order used by [`FaceDetection::landmarks`].
pub const RIGHT_EYE: usize = 0;
pub const LEFT_EYE: usize = 1;
pub const NOSE: usize = 2;
pub const RIGHT_MOUTH: usize = 3;
pub const LEFT_MOUTH: usize = 4;

/// One raw face detection in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceDetection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// `[x, y]` for right eye, left eye, nose, right mouth corner, left mouth corner
    pub landmarks: [[f32; 2]; 5],
    pub confidence: f32,
}

impl FaceDetection {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn intersection_area(&self, other: &FaceDetection) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &FaceDetection) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Pluggable face detection backend.
///
/// Implementations receive the already-resized frame and return detections in
/// its coordinates. An empty result is not an error.
pub trait FaceDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<FaceDetection>>;
}

/// Greedy non-maximum suppression, highest confidence first, keeping at most `top_k`.
pub fn nms(
    mut detections: Vec<FaceDetection>,
    iou_threshold: f32,
    top_k: usize,
) -> Vec<FaceDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceDetection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        if keep.len() == top_k {
            break;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if !suppressed[j] && detections[i].iou(&detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}
