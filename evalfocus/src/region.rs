//! Candidate regions evaluated for sharpness.
//!
//! Detector output is normalized here into [`Region`] records so that the rest
//! of the pipeline never has to special-case "no faces": an empty detection
//! list becomes a single whole-frame pseudo-region.

use serde::Serialize;

use crate::face_detector::{FaceDetection, LEFT_EYE, LEFT_MOUTH, NOSE, RIGHT_EYE, RIGHT_MOUTH};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    fn new(raw: [f32; 2]) -> Self {
        Self {
            x: raw[0],
            y: raw[1],
        }
    }

    /// Eyes and mouth corners are reported undetected through a non-positive x.
    /// Coordinates are compared as whole pixels.
    fn unless_x_unset(raw: [f32; 2]) -> Option<Self> {
        (raw[0].trunc() > 0.0).then(|| Self::new(raw))
    }

    /// The nose is undetected only when both coordinates are non-positive.
    fn unless_xy_unset(raw: [f32; 2]) -> Option<Self> {
        (raw[0].trunc() > 0.0 || raw[1].trunc() > 0.0).then(|| Self::new(raw))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Landmarks {
    pub right_eye: Option<Point>,
    pub left_eye: Option<Point>,
    pub nose: Option<Point>,
    pub right_mouth: Option<Point>,
    pub left_mouth: Option<Point>,
}

impl Landmarks {
    pub fn from_raw(raw: &[[f32; 2]; 5]) -> Self {
        Self {
            right_eye: Point::unless_x_unset(raw[RIGHT_EYE]),
            left_eye: Point::unless_x_unset(raw[LEFT_EYE]),
            nose: Point::unless_xy_unset(raw[NOSE]),
            right_mouth: Point::unless_x_unset(raw[RIGHT_MOUTH]),
            left_mouth: Point::unless_x_unset(raw[LEFT_MOUTH]),
        }
    }

    pub fn eyes_missing(&self) -> bool {
        self.right_eye.is_none() && self.left_eye.is_none()
    }

    pub fn mouth_missing(&self) -> bool {
        self.right_mouth.is_none() && self.left_mouth.is_none()
    }

    pub fn nose_missing(&self) -> bool {
        self.nose.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionSource {
    Detected {
        confidence: f32,
        landmarks: Landmarks,
    },
    /// Synthetic region spanning the whole frame, used when nothing was detected
    WholeFrame,
}

/// Rectangular candidate area in resized-frame pixels. `width * height > 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub source: RegionSource,
}

impl Region {
    pub fn whole_frame(frame_width: u32, frame_height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: frame_width.max(1),
            height: frame_height.max(1),
            source: RegionSource::WholeFrame,
        }
    }

    pub fn from_detection(detection: &FaceDetection) -> Self {
        Self {
            x: detection.x.max(0.0) as u32,
            y: detection.y.max(0.0) as u32,
            width: (detection.width.max(0.0) as u32).max(1),
            height: (detection.height.max(0.0) as u32).max(1),
            source: RegionSource::Detected {
                confidence: detection.confidence,
                landmarks: Landmarks::from_raw(&detection.landmarks),
            },
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_whole_frame(&self) -> bool {
        matches!(self.source, RegionSource::WholeFrame)
    }

    /// Confidence used for attenuation; the pseudo-region counts as fully trusted.
    pub fn confidence(&self) -> f64 {
        match &self.source {
            RegionSource::Detected { confidence, .. } => *confidence as f64,
            RegionSource::WholeFrame => 1.0,
        }
    }

    pub fn landmarks(&self) -> Option<&Landmarks> {
        match &self.source {
            RegionSource::Detected { landmarks, .. } => Some(landmarks),
            RegionSource::WholeFrame => None,
        }
    }

    /// The part of the region that lies inside a `frame_width` x `frame_height` frame,
    /// as `(x, y, width, height)`. `None` when nothing overlaps.
    pub fn clip_to(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some((self.x, self.y, width, height))
    }
}

/// Turn detector output into a non-empty, ordered list of regions.
pub fn regions_from_detections(
    detections: &[FaceDetection],
    frame_width: u32,
    frame_height: u32,
) -> Vec<Region> {
    if detections.is_empty() {
        return vec![Region::whole_frame(frame_width, frame_height)];
    }
    detections.iter().map(Region::from_detection).collect()
}

/// Whether `region` covers at least `min_fraction` of the frame.
pub fn is_significant(
    region: &Region,
    frame_width: u32,
    frame_height: u32,
    min_fraction: f64,
) -> bool {
    let frame_area = frame_width as f64 * frame_height as f64;
    if frame_area <= 0.0 {
        return false;
    }
    region.area() as f64 / frame_area >= min_fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: f32, y: f32, w: f32, h: f32) -> FaceDetection {
        FaceDetection {
            x,
            y,
            width: w,
            height: h,
            landmarks: [
                [30.0, 40.0],
                [60.0, 40.0],
                [45.0, 55.0],
                [35.0, 70.0],
                [55.0, 70.0],
            ],
            confidence: 0.92,
        }
    }

    #[test]
    fn test_no_detections_yields_whole_frame() {
        let regions = regions_from_detections(&[], 1000, 800);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!((r.x, r.y, r.width, r.height), (0, 0, 1000, 800));
        assert!(r.is_whole_frame());
        assert_eq!(r.confidence(), 1.0);
        assert!(r.landmarks().is_none());
    }

    #[test]
    fn test_detections_map_in_order_with_clamped_origin() {
        let regions = regions_from_detections(
            &[detection(-5.5, 10.2, 100.7, 120.0), detection(300.0, 40.0, 80.0, 90.0)],
            1000,
            800,
        );
        assert_eq!(regions.len(), 2);
        assert_eq!(
            (regions[0].x, regions[0].y, regions[0].width, regions[0].height),
            (0, 10, 100, 120)
        );
        assert_eq!(regions[1].x, 300);
        assert!((regions[0].confidence() - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_box_keeps_positive_area() {
        let region = Region::from_detection(&detection(10.0, 10.0, 0.0, -3.0));
        assert_eq!((region.width, region.height), (1, 1));
        assert!(region.area() > 0);
    }

    #[test]
    fn test_landmark_absence() {
        let mut raw = detection(0.0, 0.0, 10.0, 10.0).landmarks;
        raw[RIGHT_MOUTH] = [-1.0, -1.0];
        raw[LEFT_MOUTH] = [0.0, 12.0];
        let landmarks = Landmarks::from_raw(&raw);
        assert!(landmarks.mouth_missing());
        assert!(!landmarks.eyes_missing());
        assert!(!landmarks.nose_missing());
        assert_eq!(landmarks.right_mouth, None);
    }

    #[test]
    fn test_landmarks_above_top_edge_are_present() {
        let landmarks = Landmarks::from_raw(&[
            [30.0, -2.0],
            [60.0, -2.0],
            [45.0, 0.0],
            [35.0, 70.0],
            [55.0, 70.0],
        ]);
        assert!(!landmarks.eyes_missing());
        assert!(!landmarks.nose_missing());
        assert!(!landmarks.mouth_missing());
        assert_eq!(landmarks.right_eye, Some(Point { x: 30.0, y: -2.0 }));
    }

    #[test]
    fn test_nose_needs_both_coordinates_unset() {
        let mut raw = [[10.0, 10.0]; 5];
        raw[NOSE] = [0.0, 25.0];
        assert!(!Landmarks::from_raw(&raw).nose_missing());
        raw[NOSE] = [0.0, 0.0];
        assert!(Landmarks::from_raw(&raw).nose_missing());
        // sub-pixel values count as unset
        raw[NOSE] = [0.6, -3.0];
        assert!(Landmarks::from_raw(&raw).nose_missing());
        raw[RIGHT_EYE] = [0.9, 40.0];
        raw[LEFT_EYE] = [-4.0, 40.0];
        assert!(Landmarks::from_raw(&raw).eyes_missing());
    }

    #[test]
    fn test_significance_threshold() {
        // 1000x800 frame, 0.075% is 600 px
        let small = Region::from_detection(&detection(0.0, 0.0, 20.0, 29.0));
        let enough = Region::from_detection(&detection(0.0, 0.0, 20.0, 30.0));
        assert!(!is_significant(&small, 1000, 800, 0.00075));
        assert!(is_significant(&enough, 1000, 800, 0.00075));
    }

    #[test]
    fn test_clip_to_frame() {
        let region = Region::from_detection(&detection(900.0, 700.0, 200.0, 200.0));
        assert_eq!(region.clip_to(1000, 800), Some((900, 700, 100, 100)));

        let outside = Region::from_detection(&detection(1200.0, 0.0, 50.0, 50.0));
        assert_eq!(outside.clip_to(1000, 800), None);
    }
}
