//! Conversion of the winning region's power into the final bounded score.

use crate::focus_params::{ConfidenceCurve, FocusParams};
use crate::region::Region;

/// Area unit used to normalize power: 10,000 pixels.
pub const PIXEL_UNIT: f64 = 10_000.0;

/// Score reported when no region passed arbitration.
pub const NO_USABLE_REGION: u32 = 0;

/// Discount `power` by detection confidence.
///
/// Below the cliff the penalty is convex, `(confidence + slope)^2`; at or
/// above it power is scaled by the confidence itself.
pub fn attenuate(power: f64, confidence: f64, curve: &ConfidenceCurve) -> f64 {
    if confidence < curve.cliff {
        power * (confidence + curve.slope).powi(2)
    } else {
        power * confidence
    }
}

/// Region area in units of [`PIXEL_UNIT`], at least 1.
///
/// The whole-frame pseudo-region counts with half its width and height, since
/// the subject only occupies part of the frame.
pub fn pixel_units(region: &Region) -> f64 {
    let (mut width, mut height) = (region.width as f64, region.height as f64);
    if region.is_whole_frame() {
        width /= 2.0;
        height /= 2.0;
    }
    (width * height / PIXEL_UNIT).floor().max(1.0)
}

/// Clamp a raw score into `[min_result, max_result]`.
///
/// A weak but positive measurement is lifted to the floor; an exact zero
/// stays zero. Halves round to the even neighbour.
pub fn clamp_score(raw: f64, min_result: u32, max_result: u32) -> u32 {
    if raw > max_result as f64 {
        max_result
    } else if raw > 0.0 && raw < min_result as f64 {
        min_result
    } else {
        raw.round_ties_even().max(0.0) as u32
    }
}

/// Unclamped score of `region` given its deducted power.
pub fn raw_score(power: f64, region: &Region, params: &FocusParams) -> f64 {
    let attenuated = attenuate(power, region.confidence(), &params.confidence);
    attenuated / pixel_units(region)
}

/// Final score of the winning region.
pub fn normalize(power: f64, region: &Region, params: &FocusParams) -> u32 {
    clamp_score(raw_score(power, region, params), params.min_result, params.max_result)
}
