//! Edge map production: crop, contrast normalization, grayscale, edge filter
//! and binning into an [`EdgeHistogram`].

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::separable_filter;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::region::Region;

type GrayF32 = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Upper bound of the edge-intensity range the histogram covers.
const INTENSITY_RANGE: f32 = 256.0;

/// Spread factor around the median for automatic Canny thresholds.
const CANNY_SIGMA: f32 = 0.33;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EdgeFilter {
    #[default]
    Laplacian,
    Sobel,
    Canny,
}

/// Output depth of the Laplacian and Sobel derivatives. Canny output is binary
/// and unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BitDepth {
    /// Saturate to `[0, 255]` (negative responses become 0)
    #[default]
    U8,
    /// Keep raw responses; values outside the histogram range are not counted
    F32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NormalizeMode {
    On,
    Off,
    /// Normalize when no face was found or the crop has low contrast
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeSettings {
    pub filter: EdgeFilter,
    /// Odd aperture size in `1..=9`
    pub kernel_size: u32,
    pub depth: BitDepth,
    pub normalize: NormalizeMode,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            filter: EdgeFilter::Laplacian,
            kernel_size: 5,
            depth: BitDepth::U8,
            normalize: NormalizeMode::Auto,
        }
    }
}

/// Binned edge intensities over `[0, 256]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeHistogram {
    counts: Vec<u32>,
}

impl EdgeHistogram {
    pub fn from_counts(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    /// Bin `values` into `bins` equal-width bins. The top edge (256) belongs to the
    /// last bin; anything outside the range, and NaN, is dropped.
    pub fn from_intensities(values: &[f32], bins: usize) -> Self {
        let mut counts = vec![0u32; bins];
        let bin_width = INTENSITY_RANGE / bins as f32;
        for &v in values {
            if !(0.0..=INTENSITY_RANGE).contains(&v) {
                continue;
            }
            let bin = ((v / bin_width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Self { counts }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }
}

/// Edge analysis of one region.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    pub intensities: GrayF32,
    pub histogram: EdgeHistogram,
    /// Standard deviation of the crop before normalization
    pub stddev: f64,
    pub normalized: bool,
}

impl EdgeMap {
    /// 8-bit rendering of the edge response, for visual logs.
    pub fn to_gray8(&self) -> GrayImage {
        let (w, h) = self.intensities.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            Luma([self.intensities.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Crop `region` out of `frame` and analyse its edges.
///
/// Returns `None` when the region does not overlap the frame.
pub fn produce_edge_map(
    frame: &RgbImage,
    region: &Region,
    settings: &EdgeSettings,
    face_found: bool,
    stddev_threshold: f64,
    bins: usize,
) -> Option<EdgeMap> {
    let (x, y, w, h) = region.clip_to(frame.width(), frame.height())?;
    let mut crop = image::imageops::crop_imm(frame, x, y, w, h).to_image();

    let stddev = sample_stddev(crop.as_raw());
    let normalized = should_normalize(settings.normalize, face_found, stddev, stddev_threshold);
    if normalized {
        normalize_min_max(&mut crop);
    }
    trace!(
        "crop x={x} y={y} w={w} h={h} stddev={stddev:.2} normalize={}",
        if normalized { "on" } else { "off" }
    );

    let gray = luma_rec601(&crop);
    let intensities = edge_intensities(&gray, settings);
    let histogram = EdgeHistogram::from_intensities(intensities.as_raw(), bins);

    Some(EdgeMap {
        intensities,
        histogram,
        stddev,
        normalized,
    })
}

pub fn should_normalize(
    mode: NormalizeMode,
    face_found: bool,
    stddev: f64,
    threshold: f64,
) -> bool {
    match mode {
        NormalizeMode::On => true,
        NormalizeMode::Off => false,
        NormalizeMode::Auto => !face_found || stddev < threshold,
    }
}

/// Population standard deviation over every channel sample.
pub fn sample_stddev(samples: &[u8]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

/// Stretch all channel samples to `[0, 255]`. A constant image becomes black.
pub fn normalize_min_max(image: &mut RgbImage) {
    let (min, max) = image
        .as_raw()
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let scale = if max > min {
        255.0 / (max - min) as f32
    } else {
        0.0
    };
    for v in image.iter_mut() {
        *v = ((*v as f32 - min as f32) * scale).round().clamp(0.0, 255.0) as u8;
    }
}

/// Grayscale with BT.601 weights in 14-bit fixed point.
pub fn luma_rec601(image: &RgbImage) -> GrayImage {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    let (w, h) = image.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        let v = (r as u32 * R + g as u32 * G + b as u32 * B + (1 << 13)) >> 14;
        Luma([v as u8])
    })
}

/// Per-pixel edge response of `gray` with the configured filter.
pub fn edge_intensities(gray: &GrayImage, settings: &EdgeSettings) -> GrayF32 {
    match settings.filter {
        EdgeFilter::Laplacian => laplacian(gray, settings.kernel_size, settings.depth),
        EdgeFilter::Sobel => sobel_magnitude(gray, settings.kernel_size, settings.depth),
        EdgeFilter::Canny => canny(gray),
    }
}

fn to_f32(gray: &GrayImage) -> GrayF32 {
    let (w, h) = gray.dimensions();
    GrayF32::from_fn(w, h, |x, y| Luma([gray.get_pixel(x, y)[0] as f32]))
}

fn laplacian(gray: &GrayImage, ksize: u32, depth: BitDepth) -> GrayF32 {
    let src = to_f32(gray);
    let smooth = smoothing_kernel(ksize);
    let second = second_derivative_kernel(ksize);

    let d2x = separable_filter(&src, &second, &smooth);
    let d2y = separable_filter(&src, &smooth, &second);

    let (w, h) = src.dimensions();
    GrayF32::from_fn(w, h, |x, y| {
        let v = d2x.get_pixel(x, y)[0] + d2y.get_pixel(x, y)[0];
        Luma([match depth {
            BitDepth::U8 => saturate_u8(v),
            BitDepth::F32 => v,
        }])
    })
}

/// Mean of the absolute x and y gradients, each saturated to 8 bits.
///
/// At 8-bit depth negative gradients saturate to 0 before the absolute value
/// is taken, so edges of one polarity drop out.
fn sobel_magnitude(gray: &GrayImage, ksize: u32, depth: BitDepth) -> GrayF32 {
    let src = to_f32(gray);
    let smooth = smoothing_kernel(ksize);
    let first = first_derivative_kernel(ksize);

    let gx = separable_filter(&src, &first, &smooth);
    let gy = separable_filter(&src, &smooth, &first);

    let (w, h) = src.dimensions();
    GrayF32::from_fn(w, h, |x, y| {
        let (ax, ay) = match depth {
            BitDepth::U8 => (
                saturate_u8(gx.get_pixel(x, y)[0]),
                saturate_u8(gy.get_pixel(x, y)[0]),
            ),
            BitDepth::F32 => (
                saturate_u8(gx.get_pixel(x, y)[0].abs()),
                saturate_u8(gy.get_pixel(x, y)[0].abs()),
            ),
        };
        Luma([saturate_u8(0.5 * ax + 0.5 * ay)])
    })
}

/// Canny with thresholds derived from the median intensity.
fn canny(gray: &GrayImage) -> GrayF32 {
    let median = median_intensity(gray) as f32;
    let low = ((1.0 - CANNY_SIGMA) * median).max(0.0);
    let high = ((1.0 + CANNY_SIGMA) * median).max(255.0);
    to_f32(&imageproc::edges::canny(gray, low, high))
}

fn median_intensity(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p[0] as usize] += 1;
    }
    let half = (gray.width() as u64 * gray.height() as u64).div_ceil(2);
    let mut seen = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= half && count > 0 {
            return value as u8;
        }
    }
    0
}

fn saturate_u8(v: f32) -> f32 {
    v.round().clamp(0.0, 255.0)
}

fn convolve(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Binomial row of length `len` (`[1, 2, 1]` for 3).
fn binomial(len: usize) -> Vec<f32> {
    let mut k = vec![1.0];
    for _ in 1..len {
        k = convolve(&k, &[1.0, 1.0]);
    }
    k
}

fn smoothing_kernel(ksize: u32) -> Vec<f32> {
    if ksize <= 1 {
        vec![0.0, 1.0, 0.0]
    } else {
        binomial(ksize as usize)
    }
}

fn first_derivative_kernel(ksize: u32) -> Vec<f32> {
    if ksize <= 1 {
        vec![-1.0, 0.0, 1.0]
    } else {
        convolve(&binomial(ksize as usize - 2), &[-1.0, 0.0, 1.0])
    }
}

fn second_derivative_kernel(ksize: u32) -> Vec<f32> {
    if ksize <= 1 {
        vec![1.0, -2.0, 1.0]
    } else {
        convolve(&binomial(ksize as usize - 2), &[1.0, -2.0, 1.0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use image::Rgb;

    fn checkerboard(size: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn test_kernels() {
        assert_eq!(binomial(5), vec![1.0, 4.0, 6.0, 4.0, 1.0]);
        assert_eq!(first_derivative_kernel(3), vec![-1.0, 0.0, 1.0]);
        assert_eq!(first_derivative_kernel(5), vec![-1.0, -2.0, 0.0, 2.0, 1.0]);
        assert_eq!(second_derivative_kernel(5), vec![1.0, 0.0, -2.0, 0.0, 1.0]);
        assert_eq!(smoothing_kernel(1), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_histogram_binning() {
        let values = [0.0, 7.9, 8.0, 255.0, 256.0, 300.0, -1.0, f32::NAN];
        let hist = EdgeHistogram::from_intensities(&values, 32);
        assert_eq!(hist.bins(), 32);
        assert_eq!(hist.counts()[0], 2);
        assert_eq!(hist.counts()[1], 1);
        assert_eq!(hist.counts()[31], 2);
        assert_eq!(hist.total(), 5);
    }

    #[test]
    fn test_stddev() {
        assert_eq!(sample_stddev(&[]), 0.0);
        assert_eq!(sample_stddev(&[7, 7, 7]), 0.0);
        assert!((sample_stddev(&[0, 255]) - 127.5).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_min_max() {
        let mut img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([100, 110, 120])
            } else {
                Rgb([140, 130, 150])
            }
        });
        normalize_min_max(&mut img);
        assert_eq!(img.get_pixel(0, 0).0, [0, 51, 102]);
        assert_eq!(img.get_pixel(1, 0).0, [204, 153, 255]);

        let mut flat = RgbImage::from_pixel(3, 3, Rgb([90, 90, 90]));
        normalize_min_max(&mut flat);
        assert!(flat.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_should_normalize() {
        assert!(should_normalize(NormalizeMode::On, true, 80.0, 50.0));
        assert!(!should_normalize(NormalizeMode::Off, false, 10.0, 50.0));
        assert!(should_normalize(NormalizeMode::Auto, false, 80.0, 50.0));
        assert!(should_normalize(NormalizeMode::Auto, true, 49.9, 50.0));
        assert!(!should_normalize(NormalizeMode::Auto, true, 50.0, 50.0));
    }

    #[test]
    fn test_flat_region_has_no_edges() {
        let frame = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let region = Region::whole_frame(64, 64);
        for filter in [EdgeFilter::Laplacian, EdgeFilter::Sobel, EdgeFilter::Canny] {
            let settings = EdgeSettings {
                filter,
                ..Default::default()
            };
            let map = produce_edge_map(&frame, &region, &settings, false, 50.0, 32).unwrap();
            assert_eq!(map.histogram.total(), 64 * 64);
            assert_eq!(map.histogram.counts()[0], 64 * 64, "{filter:?}");
            assert!(map.normalized);
        }
    }

    #[test]
    fn test_checkerboard_reaches_top_bins() {
        let frame = checkerboard(64, 8);
        let region = Region::whole_frame(64, 64);
        let settings = EdgeSettings::default();
        let map = produce_edge_map(&frame, &region, &settings, true, 50.0, 32).unwrap();
        assert!(!map.normalized);
        assert!(map.histogram.counts()[31] > 0);
        assert_eq!(map.to_gray8().dimensions(), (64, 64));
    }

    #[test]
    fn test_sobel_stays_in_byte_range() {
        let frame = checkerboard(32, 4);
        let settings = EdgeSettings {
            filter: EdgeFilter::Sobel,
            kernel_size: 3,
            ..Default::default()
        };
        let region = Region::whole_frame(32, 32);
        let map = produce_edge_map(&frame, &region, &settings, true, 50.0, 32).unwrap();
        assert!(map.intensities.as_raw().iter().all(|&v| (0.0..=255.0).contains(&v)));
        assert!(map.histogram.counts()[31] > 0);
    }

    #[test]
    fn test_sobel_depth_controls_gradient_sign() {
        // a 30-level step along x; kernel weight 4 gives |gx| = 120 at the step
        let rising = GrayImage::from_fn(12, 4, |x, _| Luma([if x < 6 { 0 } else { 30 }]));
        let falling = GrayImage::from_fn(12, 4, |x, _| Luma([if x < 6 { 30 } else { 0 }]));

        let up = sobel_magnitude(&rising, 3, BitDepth::U8).get_pixel(6, 2)[0];
        let down = sobel_magnitude(&falling, 3, BitDepth::U8).get_pixel(6, 2)[0];
        assert_eq!(up.max(down), 60.0);
        assert_eq!(up.min(down), 0.0);

        for image in [&rising, &falling] {
            assert_eq!(sobel_magnitude(image, 3, BitDepth::F32).get_pixel(6, 2)[0], 60.0);
        }
    }

    #[test]
    fn test_luma_uses_bt601_weights() {
        let img = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            2 => Rgb([0, 0, 255]),
            _ => Rgb([200, 200, 200]),
        });
        let gray = luma_rec601(&img);
        assert_eq!(gray.as_raw(), &vec![76, 150, 29, 200]);
    }
}
