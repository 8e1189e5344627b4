use image::imageops::FilterType;
use image::RgbImage;

use crate::focus_params::FocusParams;

/// Downscale factor for a frame whose longer side is `long_side` pixels.
///
/// Bounds detector and edge-filter cost on very large frames while leaving
/// small frames untouched.
pub fn resize_factor(long_side: u32, params: &FocusParams) -> f64 {
    if long_side > params.big_long_side {
        0.25
    } else if long_side > params.small_long_side {
        0.5
    } else {
        1.0
    }
}

/// Resize `frame` by `factor` using nearest-neighbour sampling.
///
/// Returns the frame unchanged (cloned) when `factor` is 1.
pub fn resize_frame(frame: &RgbImage, factor: f64) -> RgbImage {
    if factor == 1.0 {
        return frame.clone();
    }
    let (width, height) = scaled_size(frame.width(), frame.height(), factor);
    image::imageops::resize(frame, width, height, FilterType::Nearest)
}

/// Scaled dimensions, never smaller than one pixel.
pub fn scaled_size(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let w = (width as f64 * factor).round().max(1.0) as u32;
    let h = (height as f64 * factor).round().max(1.0) as u32;
    (w, h)
}
