use crate::focus_params::Deductions;
use crate::region::{Region, RegionSource};

/// Combined multiplicative penalty for missing facial evidence in `region`.
///
/// Detected faces are penalized per missing landmark group; the whole-frame
/// pseudo-region gets the single face-absence factor instead.
pub fn deduction_factor(region: &Region, deductions: &Deductions) -> f64 {
    match &region.source {
        RegionSource::WholeFrame => deductions.face_absence,
        RegionSource::Detected { landmarks, .. } => {
            let mut factor = 1.0;
            if landmarks.mouth_missing() {
                factor *= deductions.mouth;
            }
            if landmarks.eyes_missing() {
                factor *= deductions.eye;
            }
            if landmarks.nose_missing() {
                factor *= deductions.nose;
            }
            factor
        }
    }
}
