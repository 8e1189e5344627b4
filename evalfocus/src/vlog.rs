//! Visual log: the analysed frame annotated with the winning region.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::engine::RegionAnalysis;
use crate::region::Point;

/// Gap between the edge map overlay and the frame border.
pub const IMPOSE_OFFSET: u32 = 16;

const LANDMARK_RADIUS: i32 = 5;

const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const MAGENTA: Rgb<u8> = Rgb([255, 0, 255]);

/// Stroke width scaled to the frame, at least 3 px.
pub fn line_width(width: u32, height: u32) -> u32 {
    (width.max(height) / 1000).max(3)
}

fn draw_thick_rect(
    img: &mut RgbImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    thickness: u32,
    color: Rgb<u8>,
) {
    for t in 0..thickness as i32 {
        let rect = Rect::at(x - t, y - t).of_size(
            (width + 2 * t as u32).max(1),
            (height + 2 * t as u32).max(1),
        );
        draw_hollow_rect_mut(img, rect, color);
    }
}

fn draw_point(img: &mut RgbImage, point: Option<Point>, color: Rgb<u8>) {
    if let Some(p) = point {
        draw_filled_circle_mut(img, (p.x as i32, p.y as i32), LANDMARK_RADIUS, color);
    }
}

/// Annotate `frame` with the winning region.
///
/// Detected faces get their box and landmarks drawn. The winner's edge map is
/// pasted in the bottom-left corner, framed green for the whole-frame region
/// and blue for a face; for the whole frame only its central third is shown.
pub fn render_vlog(frame: &RgbImage, winner: Option<&RegionAnalysis>) -> RgbImage {
    let mut canvas = frame.clone();
    let Some(winner) = winner else {
        return canvas;
    };
    let (frame_w, frame_h) = canvas.dimensions();
    let thickness = line_width(frame_w, frame_h);
    let region = &winner.region;

    if let Some(landmarks) = region.landmarks() {
        draw_thick_rect(
            &mut canvas,
            region.x as i32,
            region.y as i32,
            region.width,
            region.height,
            thickness,
            BLUE,
        );
        draw_point(&mut canvas, landmarks.right_mouth, MAGENTA);
        draw_point(&mut canvas, landmarks.left_mouth, MAGENTA);
        draw_point(&mut canvas, landmarks.right_eye, RED);
        draw_point(&mut canvas, landmarks.left_eye, RED);
        draw_point(&mut canvas, landmarks.nose, GREEN);
    }

    let mut edge = image::DynamicImage::ImageLuma8(winner.edge_map.to_gray8()).to_rgb8();
    if region.is_whole_frame() {
        let (w, h) = edge.dimensions();
        let (cw, ch) = ((w / 3).max(1), (h / 3).max(1));
        edge = image::imageops::crop_imm(&edge, w / 3, h / 3, cw, ch).to_image();
    }
    let (edge_w, edge_h) = edge.dimensions();
    let x = IMPOSE_OFFSET as i64;
    let y = frame_h as i64 - IMPOSE_OFFSET as i64 - edge_h as i64;
    let frame_color = if region.is_whole_frame() { GREEN } else { BLUE };
    draw_thick_rect(&mut canvas, x as i32, y as i32, edge_w, edge_h, thickness, frame_color);
    image::imageops::overlay(&mut canvas, &edge, x, y);

    canvas
}

/// Output path `<dir>/<stem>_vlog.<ext>` for `input`.
pub fn vlog_path(input: &Path, dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = input
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("jpg");
    dir.join(format!("{stem}_vlog.{ext}"))
}

/// Render and write the visual log of `input`, returning the written path.
pub fn save_vlog(
    frame: &RgbImage,
    winner: Option<&RegionAnalysis>,
    input: &Path,
    dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create visual log directory {}", dir.display()))?;
    let path = vlog_path(input, dir);
    render_vlog(frame, winner)
        .save(&path)
        .with_context(|| format!("Failed to write visual log {}", path.display()))?;
    Ok(path)
}
