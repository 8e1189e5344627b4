//! Orchestration of one focus evaluation.
//!
//! The engine resizes the frame, optionally consults a quality gate and a face
//! detector, scores every significant region and lets the arbiter pick the
//! region whose edge evidence is strongest. The result carries enough
//! diagnostics to explain the score.

use anyhow::Result;
use image::RgbImage;
use log::{debug, trace};
use serde::Serialize;
use std::time::Instant;

use crate::arbitration::{Arbiter, ScoreCandidate};
use crate::deduction::deduction_factor;
use crate::edge_map::{produce_edge_map, EdgeMap, EdgeSettings};
use crate::face_detector::FaceDetector;
use crate::focus_params::FocusParams;
use crate::geometry::{resize_factor, resize_frame};
use crate::power_window::{measure, PowerWindow, WindowPower};
use crate::quality_gate::QualityGate;
use crate::region::{is_significant, regions_from_detections, Region};
use crate::score;

/// Full analysis of one scored region.
#[derive(Debug, Clone)]
pub struct RegionAnalysis {
    pub region: Region,
    pub edge_map: EdgeMap,
    pub power: WindowPower,
    /// Product of the applicable deduction factors
    pub deduction: f64,
    pub deducted_power: f64,
}

/// Diagnostics of the region that decided the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinnerReport {
    pub region_index: usize,
    pub region: Region,
    pub confidence: f64,
    pub histogram: Vec<u32>,
    pub window: PowerWindow,
    pub raw_power: f64,
    pub shaped_power: f64,
    pub deduction: f64,
    pub deducted_power: f64,
    pub crop_stddev: f64,
    pub normalized: bool,
    /// Score before clamping
    pub raw_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusReport {
    pub score: u32,
    /// Detections in the frame; 0 when nothing passed arbitration or the
    /// whole frame won
    pub face_count: usize,
    pub region_count: usize,
    /// Regions that survived filtering and were scored
    pub scored_regions: usize,
    pub resize_factor: f64,
    pub quality_score: Option<f64>,
    /// True when the quality gate decided the score
    pub quality_rejected: bool,
    pub winner: Option<WinnerReport>,
}

/// Report plus the data needed to render a visual log.
#[derive(Debug, Clone)]
pub struct FocusOutcome {
    pub report: FocusReport,
    /// The resized frame the regions refer to; `None` after a quality gate rejection
    pub frame: Option<RgbImage>,
    pub winner: Option<RegionAnalysis>,
}

pub struct FocusEngine {
    params: FocusParams,
    edge: EdgeSettings,
}

impl FocusEngine {
    pub fn new(params: FocusParams, edge: EdgeSettings) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, edge })
    }

    /// Score `frame`.
    ///
    /// Without a detector the frame is scored as a single whole-frame region.
    pub fn evaluate(
        &self,
        frame: &RgbImage,
        detector: Option<&mut dyn FaceDetector>,
        quality_gate: Option<&mut dyn QualityGate>,
    ) -> Result<FocusOutcome> {
        let start = Instant::now();

        let quality_score = match quality_gate {
            Some(gate) => Some(gate.quality_score(frame)?),
            None => None,
        };
        if let Some(q) = quality_score {
            debug!("quality score={q:.2}");
            if q > self.params.quality_gate_threshold {
                debug!(
                    "quality score above {}, skipping focus analysis",
                    self.params.quality_gate_threshold
                );
                return Ok(FocusOutcome {
                    report: FocusReport {
                        score: self.params.min_result,
                        face_count: 0,
                        region_count: 0,
                        scored_regions: 0,
                        resize_factor: 1.0,
                        quality_score,
                        quality_rejected: true,
                        winner: None,
                    },
                    frame: None,
                    winner: None,
                });
            }
        }

        let long_side = frame.width().max(frame.height());
        let factor = resize_factor(long_side, &self.params);
        let resized = resize_frame(frame, factor);
        let (width, height) = resized.dimensions();
        debug!(
            "size {}x{} -> {width}x{height} (factor {factor})",
            frame.width(),
            frame.height()
        );
        debug!("until resize: {:.3} sec", start.elapsed().as_secs_f64());

        let detections = match detector {
            Some(detector) => detector.detect(&resized)?,
            None => Vec::new(),
        };
        let face_found = !detections.is_empty();
        debug!("faces={}", detections.len());
        debug!("until detection: {:.3} sec", start.elapsed().as_secs_f64());

        let regions = regions_from_detections(&detections, width, height);
        let mut arbiter = Arbiter::new(self.params.window.end_gate);
        let mut scored_regions = 0;

        for (index, region) in regions.iter().enumerate() {
            if !is_significant(region, width, height, self.params.min_region_fraction) {
                debug!(
                    "region {index} ({}x{}) below {} of the frame, skipped",
                    region.width, region.height, self.params.min_region_fraction
                );
                continue;
            }
            let Some(analysis) = self.analyse_region(&resized, region, face_found) else {
                debug!("region {index} lies outside the frame, skipped");
                continue;
            };
            scored_regions += 1;

            trace!(
                "region {index}: window={:?} raw={:.1} shaped={:.1} deduction={:.3} power={:.1}",
                analysis.power.window,
                analysis.power.raw_power,
                analysis.power.shaped_power,
                analysis.deduction,
                analysis.deducted_power
            );

            let candidate = ScoreCandidate {
                region_index: index,
                power: analysis.deducted_power,
                window: analysis.power.window,
                payload: analysis,
            };
            if !arbiter.is_eligible(&candidate.window) {
                debug!(
                    "region {index} window ends at {} (gate {}), not eligible",
                    candidate.window.end, self.params.window.end_gate
                );
            }
            arbiter.offer(candidate);
        }

        let outcome = match arbiter.into_winner() {
            None => {
                debug!("no region passed the window gate");
                FocusOutcome {
                    report: FocusReport {
                        score: score::NO_USABLE_REGION,
                        face_count: 0,
                        region_count: regions.len(),
                        scored_regions,
                        resize_factor: factor,
                        quality_score,
                        quality_rejected: false,
                        winner: None,
                    },
                    frame: Some(resized),
                    winner: None,
                }
            }
            Some(winner) => {
                let analysis = winner.payload;
                let region = &analysis.region;
                let raw_score = score::raw_score(analysis.deducted_power, region, &self.params);
                let value =
                    score::clamp_score(raw_score, self.params.min_result, self.params.max_result);
                debug!(
                    "winner region {} ({}x{}), units={} raw score={raw_score:.2}",
                    winner.region_index,
                    region.width,
                    region.height,
                    score::pixel_units(region)
                );

                let face_count = if region.is_whole_frame() {
                    0
                } else {
                    detections.len()
                };
                let report = FocusReport {
                    score: value,
                    face_count,
                    region_count: regions.len(),
                    scored_regions,
                    resize_factor: factor,
                    quality_score,
                    quality_rejected: false,
                    winner: Some(WinnerReport {
                        region_index: winner.region_index,
                        region: region.clone(),
                        confidence: region.confidence(),
                        histogram: analysis.edge_map.histogram.counts().to_vec(),
                        window: analysis.power.window,
                        raw_power: analysis.power.raw_power,
                        shaped_power: analysis.power.shaped_power,
                        deduction: analysis.deduction,
                        deducted_power: analysis.deducted_power,
                        crop_stddev: analysis.edge_map.stddev,
                        normalized: analysis.edge_map.normalized,
                        raw_score,
                    }),
                };
                FocusOutcome {
                    report,
                    frame: Some(resized),
                    winner: Some(analysis),
                }
            }
        };

        debug!("total: {:.3} sec", start.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// Edge map, window power and deductions of one region.
    ///
    /// `None` when the region does not overlap `frame`.
    pub fn analyse_region(
        &self,
        frame: &RgbImage,
        region: &Region,
        face_found: bool,
    ) -> Option<RegionAnalysis> {
        let edge_map = produce_edge_map(
            frame,
            region,
            &self.edge,
            face_found,
            self.params.normalize_stddev_threshold,
            self.params.hist_bins,
        )?;
        trace!(
            "histogram={:?} ({} samples)",
            edge_map.histogram.counts(),
            edge_map.histogram.total()
        );

        let power = measure(&edge_map.histogram, &self.params.window, &self.params.tail);
        let deduction = deduction_factor(region, &self.params.deductions);
        let deducted_power = power.shaped_power * deduction;

        Some(RegionAnalysis {
            region: region.clone(),
            edge_map,
            power,
            deduction,
            deducted_power,
        })
    }
}
