//! Location of the significant high-intensity band of an edge histogram.
//!
//! Sharp regions concentrate edge energy at the top of the intensity range
//! while blur spreads it toward low bins, so only the strongest tail of the
//! histogram is used as evidence. The window ends at the highest non-zero bin
//! reachable by a top-down scan; its start is either a fixed offset below the
//! end or the first sharp rise in counts below it ([`WindowMode`]).

use serde::Serialize;

use crate::edge_map::EdgeHistogram;
use crate::focus_params::{TailShape, WindowMode, WindowParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerWindow {
    pub start: usize,
    pub end: usize,
}

impl PowerWindow {
    /// `Σ count[i] * i` over the window.
    pub fn raw_power(&self, histogram: &EdgeHistogram) -> f64 {
        histogram.counts()[self.start..=self.end]
            .iter()
            .zip(self.start..)
            .map(|(&count, i)| count as f64 * i as f64)
            .sum()
    }
}

/// Find the power window of `histogram`.
///
/// A histogram with nothing above `scan_floor` gets the degenerate window
/// `{bins-1, bins-1}`.
pub fn locate_window(histogram: &EdgeHistogram, params: &WindowParams) -> PowerWindow {
    let counts = histogram.counts();
    let last = counts.len() - 1;

    let Some(end) = ((params.scan_floor + 1)..=last)
        .rev()
        .find(|&i| counts[i] != 0)
    else {
        return PowerWindow {
            start: last,
            end: last,
        };
    };

    let fixed_start = end.saturating_sub(params.range - 1);
    let start = match params.mode {
        WindowMode::FixedOffset => fixed_start,
        WindowMode::RisingEdge => rising_start(counts, end, fixed_start, params.rise_ratio),
    };

    PowerWindow { start, end }
}

/// First `i` in `(fixed_start, end]`, walking down, where the bin below rises
/// by more than `rise_ratio`. Falls back to `fixed_start`.
fn rising_start(counts: &[u32], end: usize, fixed_start: usize, rise_ratio: f64) -> usize {
    for i in (fixed_start.max(1)..=end).rev() {
        let here = counts[i] as f64;
        let below = counts[i - 1] as f64;
        let rises = if here == 0.0 {
            below > 0.0
        } else {
            below / here > rise_ratio
        };
        if rises {
            return i;
        }
    }
    fixed_start
}

/// Multiplier for where the window ends: saturated tails are boosted,
/// windows ending mid-range are penalized.
pub fn tail_shape_factor(end: usize, bins: usize, window: &WindowParams, tail: &TailShape) -> f64 {
    let last = bins - 1;
    if end == last {
        return tail.saturation_boost;
    }
    let mut factor = 1.0;
    if end + 1 == last {
        factor *= tail.near_saturation_boost;
    }
    if window.end_gate < end && end < window.descend_end {
        factor *= tail.descend_penalty;
    }
    factor
}

/// Window and power of one histogram before deductions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowPower {
    pub window: PowerWindow,
    pub raw_power: f64,
    /// Raw power after the tail-shape adjustment
    pub shaped_power: f64,
}

pub fn measure(
    histogram: &EdgeHistogram,
    window_params: &WindowParams,
    tail: &TailShape,
) -> WindowPower {
    let window = locate_window(histogram, window_params);
    let raw_power = window.raw_power(histogram);
    let shaped_power =
        raw_power * tail_shape_factor(window.end, histogram.bins(), window_params, tail);
    WindowPower {
        window,
        raw_power,
        shaped_power,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist_with(entries: &[(usize, u32)]) -> EdgeHistogram {
        let mut counts = vec![0u32; 32];
        for &(i, c) in entries {
            counts[i] = c;
        }
        EdgeHistogram::from_counts(counts)
    }

    #[test]
    fn test_single_bin_window() {
        let params = WindowParams::default();
        for k in 21..32 {
            let hist = hist_with(&[(k, 9)]);
            let window = locate_window(&hist, &params);
            assert_eq!(window, PowerWindow { start: k - 5, end: k });
            assert_eq!(window.raw_power(&hist), 9.0 * k as f64);
        }
    }

    #[test]
    fn test_bins_below_scan_floor_are_unreachable() {
        let params = WindowParams::default();
        let hist = hist_with(&[(20, 1000), (3, 50)]);
        let window = locate_window(&hist, &params);
        assert_eq!(window, PowerWindow { start: 31, end: 31 });
        assert_eq!(window.raw_power(&hist), 0.0);
    }

    #[test]
    fn test_start_clamps_at_zero() {
        let params = WindowParams {
            scan_floor: 0,
            range: 8,
            ..Default::default()
        };
        let hist = hist_with(&[(3, 4), (1, 2)]);
        let window = locate_window(&hist, &params);
        assert_eq!(window, PowerWindow { start: 0, end: 3 });
        assert_eq!(window.raw_power(&hist), 4.0 * 3.0 + 2.0);
    }

    #[test]
    fn test_saturated_tail_scenario() {
        let mut counts = vec![0u32; 30];
        counts.extend([5, 8]);
        let hist = EdgeHistogram::from_counts(counts);

        let result = measure(&hist, &WindowParams::default(), &TailShape::default());
        assert_eq!(result.window, PowerWindow { start: 26, end: 31 });
        assert_eq!(result.raw_power, 5.0 * 30.0 + 8.0 * 31.0);
        assert!((result.shaped_power - 398.0 * 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_tail_shape_factors() {
        let window = WindowParams::default();
        let tail = TailShape::default();
        assert_eq!(tail_shape_factor(31, 32, &window, &tail), 1.25);
        assert_eq!(tail_shape_factor(30, 32, &window, &tail), 1.1);
        assert_eq!(tail_shape_factor(29, 32, &window, &tail), 1.0);
        assert_eq!(tail_shape_factor(23, 32, &window, &tail), 0.75);
        assert_eq!(tail_shape_factor(13, 32, &window, &tail), 0.75);
        assert_eq!(tail_shape_factor(12, 32, &window, &tail), 1.0);
        assert_eq!(tail_shape_factor(24, 32, &window, &tail), 1.0);
    }

    #[test]
    fn test_rising_edge_narrows_window() {
        let params = WindowParams {
            mode: WindowMode::RisingEdge,
            ..Default::default()
        };
        // bulk at 27, thin tail from 28 to 30
        let hist = hist_with(&[(25, 400), (26, 300), (27, 200), (28, 20), (29, 15), (30, 10)]);
        let window = locate_window(&hist, &params);
        assert_eq!(window, PowerWindow { start: 28, end: 30 });
    }

    #[test]
    fn test_rising_edge_falls_back_to_fixed_offset() {
        let params = WindowParams {
            mode: WindowMode::RisingEdge,
            ..Default::default()
        };
        let hist = hist_with(&[(25, 10), (26, 10), (27, 10), (28, 10), (29, 10), (30, 10)]);
        let window = locate_window(&hist, &params);
        assert_eq!(window, PowerWindow { start: 25, end: 30 });
    }

    #[test]
    fn test_rising_edge_with_gap_below_end() {
        let params = WindowParams {
            mode: WindowMode::RisingEdge,
            ..Default::default()
        };
        // 29 empty, 28 populated: the walk stops at 29
        let hist = hist_with(&[(28, 50), (30, 5)]);
        let window = locate_window(&hist, &params);
        assert_eq!(window, PowerWindow { start: 29, end: 30 });
    }
}
