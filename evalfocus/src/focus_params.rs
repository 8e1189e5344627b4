//! Tunable parameters for the focus scoring engine

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the power window start is located below its end bin
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WindowMode {
    /// `start = end - (range - 1)`
    #[default]
    FixedOffset,
    /// Start at the first sharp rise below `end`, falling back to the fixed offset
    RisingEdge,
}

/// Power window location parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowParams {
    pub mode: WindowMode,

    /// Maximum window width in bins (default: 6)
    pub range: usize,

    /// `count[i-1] / count[i]` ratio treated as a rise (default: 2.0)
    pub rise_ratio: f64,

    /// The top-down scan stops above this bin index (default: 20 for 32 bins)
    pub scan_floor: usize,

    /// A window must end above this bin to win arbitration (default: 12 for 32 bins)
    pub end_gate: usize,

    /// Windows ending in `(end_gate, descend_end)` are penalized (default: 24 for 32 bins)
    pub descend_end: usize,
}

impl WindowParams {
    /// Defaults derived from the histogram length
    pub fn for_bins(bins: usize) -> Self {
        Self {
            mode: WindowMode::FixedOffset,
            range: 6,
            rise_ratio: 2.0,
            scan_floor: (bins / 3) * 2,
            end_gate: (bins / 8) * 3,
            descend_end: (bins / 8) * 6,
        }
    }
}

impl Default for WindowParams {
    fn default() -> Self {
        Self::for_bins(DEFAULT_HIST_BINS)
    }
}

/// Multipliers applied by where the window ends
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailShape {
    /// Window ends in the last bin (default: 1.25)
    pub saturation_boost: f64,
    /// Window ends in the second-to-last bin (default: 1.1)
    pub near_saturation_boost: f64,
    /// Window ends in the descend band (default: 0.75)
    pub descend_penalty: f64,
}

impl Default for TailShape {
    fn default() -> Self {
        Self {
            saturation_boost: 1.25,
            near_saturation_boost: 1.1,
            descend_penalty: 0.75,
        }
    }
}

/// Multiplicative penalties for missing facial evidence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deductions {
    /// Both mouth corners missing (default: 0.8)
    pub mouth: f64,
    /// Both eyes missing (default: 0.75)
    pub eye: f64,
    /// Nose missing (default: 0.85)
    pub nose: f64,
    /// No face anywhere in the frame (default: 0.9)
    pub face_absence: f64,
}

impl Default for Deductions {
    fn default() -> Self {
        Self {
            mouth: 0.8,
            eye: 0.75,
            nose: 0.85,
            face_absence: 0.9,
        }
    }
}

/// Confidence attenuation curve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceCurve {
    /// Below this, power is scaled by `(confidence + slope)^2` (default: 0.9)
    pub cliff: f64,
    /// Default: 0.066
    pub slope: f64,
}

impl Default for ConfidenceCurve {
    fn default() -> Self {
        Self {
            cliff: 0.9,
            slope: 0.066,
        }
    }
}

pub const DEFAULT_HIST_BINS: usize = 32;

/// Every threshold the engine uses. Immutable once handed to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusParams {
    /// Long sides up to this are not downscaled (default: 2000)
    pub small_long_side: u32,
    /// Long sides above this are downscaled by 4 (default: 4000)
    pub big_long_side: u32,

    /// Detector score threshold (default: 0.75)
    pub score_threshold: f32,
    /// Detector NMS IoU threshold (default: 0.3)
    pub nms_threshold: f32,
    /// Maximum detections kept (default: 25)
    pub top_k: usize,

    /// Regions smaller than this fraction of the frame are ignored (default: 0.00075)
    pub min_region_fraction: f64,
    /// Auto-normalize crops whose stddev is below this (default: 50.0)
    pub normalize_stddev_threshold: f64,

    /// Edge histogram length (default: 32)
    pub hist_bins: usize,
    pub window: WindowParams,
    pub tail: TailShape,
    pub deductions: Deductions,
    pub confidence: ConfidenceCurve,

    /// Floor for a weak but real measurement (default: 5)
    pub min_result: u32,
    /// Ceiling of the score (default: 255)
    pub max_result: u32,

    /// Quality scores above this short-circuit to `min_result` (default: 80.0)
    pub quality_gate_threshold: f64,
}

impl Default for FocusParams {
    fn default() -> Self {
        Self {
            small_long_side: 2000,
            big_long_side: 4000,
            score_threshold: 0.75,
            nms_threshold: 0.3,
            top_k: 25,
            min_region_fraction: 0.075 / 100.0,
            normalize_stddev_threshold: 50.0,
            hist_bins: DEFAULT_HIST_BINS,
            window: WindowParams::default(),
            tail: TailShape::default(),
            deductions: Deductions::default(),
            confidence: ConfidenceCurve::default(),
            min_result: 5,
            max_result: 255,
            quality_gate_threshold: 80.0,
        }
    }
}

impl FocusParams {
    /// Load parameters from a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read params file: {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to load params file: {}", path.display()))
    }

    /// Parse and validate parameters from TOML text.
    ///
    /// Window thresholds that the text leaves out are derived from the final
    /// `hist_bins`, so changing the bin count alone rescales them.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table: toml::Table = text.parse().context("Invalid TOML")?;
        let window_keys = table
            .get("window")
            .and_then(|w| w.as_table())
            .map(|w| w.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        let mut params: FocusParams = toml::Value::Table(table)
            .try_into()
            .context("Invalid focus parameters")?;

        let derived = WindowParams::for_bins(params.hist_bins);
        let given = |key: &str| window_keys.iter().any(|k| k == key);
        if !given("scan_floor") {
            params.window.scan_floor = derived.scan_floor;
        }
        if !given("end_gate") {
            params.window.end_gate = derived.end_gate;
        }
        if !given("descend_end") {
            params.window.descend_end = derived.descend_end;
        }

        params.validate()?;
        Ok(params)
    }

    /// Reject parameter combinations the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.hist_bins < 2 {
            bail!("hist_bins must be at least 2, got {}", self.hist_bins);
        }
        if self.window.range == 0 {
            bail!("window.range must be at least 1");
        }
        if self.window.scan_floor >= self.hist_bins {
            bail!(
                "window.scan_floor ({}) must be below hist_bins ({})",
                self.window.scan_floor,
                self.hist_bins
            );
        }
        if self.window.end_gate >= self.hist_bins {
            bail!(
                "window.end_gate ({}) must be below hist_bins ({})",
                self.window.end_gate,
                self.hist_bins
            );
        }
        if self.window.descend_end > self.hist_bins {
            bail!(
                "window.descend_end ({}) must not exceed hist_bins ({})",
                self.window.descend_end,
                self.hist_bins
            );
        }
        if self.small_long_side > self.big_long_side {
            bail!(
                "small_long_side ({}) must not exceed big_long_side ({})",
                self.small_long_side,
                self.big_long_side
            );
        }
        if self.min_result > self.max_result {
            bail!(
                "min_result ({}) must not exceed max_result ({})",
                self.min_result,
                self.max_result
            );
        }
        let d = &self.deductions;
        for (name, factor) in [
            ("mouth", d.mouth),
            ("eye", d.eye),
            ("nose", d.nose),
            ("face_absence", d.face_absence),
        ] {
            if !(factor > 0.0 && factor <= 1.0) {
                bail!("deductions.{name} must be in (0, 1], got {factor}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_defaults_follow_bins() {
        let w = WindowParams::for_bins(32);
        assert_eq!(w.scan_floor, 20);
        assert_eq!(w.end_gate, 12);
        assert_eq!(w.descend_end, 24);

        let w = WindowParams::for_bins(64);
        assert_eq!(w.scan_floor, 42);
        assert_eq!(w.end_gate, 24);
        assert_eq!(w.descend_end, 48);
    }

    #[test]
    fn test_default_params_validate() {
        assert!(FocusParams::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_deduction() {
        let mut params = FocusParams::default();
        params.deductions.eye = 0.0;
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("deductions.eye"));

        params.deductions.eye = 1.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_scan_floor_outside_histogram() {
        let params = FocusParams {
            window: WindowParams {
                scan_floor: 32,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_bin_count_rescales_window_thresholds() {
        let params = FocusParams::from_toml_str("hist_bins = 64").unwrap();
        assert_eq!(params.window, WindowParams::for_bins(64));
        assert_eq!(params.window.end_gate, 24);
        assert_eq!(params.window.scan_floor, 42);
        assert_eq!(params.window.descend_end, 48);
    }

    #[test]
    fn test_explicit_window_thresholds_win_over_bin_count() {
        let params = FocusParams::from_toml_str(
            r#"
            hist_bins = 64

            [window]
            end_gate = 30
            "#,
        )
        .unwrap();
        assert_eq!(params.window.end_gate, 30);
        assert_eq!(params.window.scan_floor, 42);
        assert_eq!(params.window.descend_end, 48);
    }

    #[test]
    fn test_params_text_is_validated() {
        assert!(FocusParams::from_toml_str("min_result = 300").is_err());
        assert!(FocusParams::from_toml_str("hist_bins = [").is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let params = FocusParams::from_toml_str(
            r#"
            min_result = 6

            [window]
            mode = "rising-edge"

            [deductions]
            mouth = 0.75
            "#,
        )
        .unwrap();

        assert_eq!(params.min_result, 6);
        assert_eq!(params.window.mode, WindowMode::RisingEdge);
        assert_eq!(params.window.range, 6);
        assert_eq!(params.deductions.mouth, 0.75);
        assert_eq!(params.deductions.eye, 0.75);
        assert_eq!(params.max_result, 255);
    }
}
