use image::{Rgb, RgbImage};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_evalfocus(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_evalfocus"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute evalfocus")
}

fn write_checkerboard(path: &Path) {
    RgbImage::from_fn(160, 120, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgb([250, 250, 250])
        } else {
            Rgb([10, 10, 10])
        }
    })
    .save(path)
    .unwrap();
}

#[test]
fn test_missing_image_exits_cantopen() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.jpg");

    let output = run_evalfocus(&[missing.to_str().unwrap(), "--no-face-detect"]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "got: {stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn test_missing_model_exits_cantopen() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("frame.png");
    write_checkerboard(&image);

    let output = run_evalfocus(&[
        image.to_str().unwrap(),
        "-m",
        "/non/existent/yunet.onnx",
        "--device",
        "cpu",
    ]);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("model file does not exist"), "got: {stderr}");
}

#[test]
fn test_undecodable_image_exits_cantopen() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("broken.jpg");
    std::fs::write(&image, b"not an image").unwrap();

    let output = run_evalfocus(&[image.to_str().unwrap(), "--no-face-detect"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_single_image_exit_status_is_score() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("frame.png");
    write_checkerboard(&image);

    let output = run_evalfocus(&[image.to_str().unwrap(), "--no-face-detect"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().next().expect("no result line");
    let (value, faces) = line
        .strip_prefix("value=")
        .and_then(|rest| rest.split_once(",face_count="))
        .unwrap_or_else(|| panic!("unexpected output: {line}"));
    let value: i32 = value.parse().unwrap();

    assert_eq!(faces, "0");
    assert!((5..=255).contains(&value));
    assert_eq!(output.status.code(), Some(value));
}

#[test]
fn test_metadata_is_written_to_output_dir() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("frame.png");
    write_checkerboard(&image);
    let out_dir = temp_dir.path().join("meta");

    run_evalfocus(&[
        image.to_str().unwrap(),
        "--no-face-detect",
        "--metadata",
        "--output-dir",
        out_dir.to_str().unwrap(),
    ]);

    let text = std::fs::read_to_string(out_dir.join("frame.evalfocus.toml")).unwrap();
    let parsed: toml::Value = toml::from_str(&text).unwrap();
    assert_eq!(parsed["focus"]["face_count"].as_integer(), Some(0));
    assert_eq!(parsed["config"]["face_detect"].as_bool(), Some(false));
    assert_eq!(parsed["input"]["width"].as_integer(), Some(160));
}

#[test]
fn test_vlog_is_written() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("frame.png");
    write_checkerboard(&image);
    let vlog_dir = temp_dir.path().join("vlog");

    run_evalfocus(&[
        image.to_str().unwrap(),
        "--no-face-detect",
        "--vlog",
        "--vlog-dir",
        vlog_dir.to_str().unwrap(),
    ]);

    assert!(vlog_dir.join("frame_vlog.png").is_file());
}

#[test]
fn test_several_images_exit_zero() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["a.png", "b.png"] {
        write_checkerboard(&temp_dir.path().join(name));
    }

    let output = run_evalfocus(&[temp_dir.path().to_str().unwrap(), "--no-face-detect"]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().filter(|l| l.starts_with("value=")).count(), 2);
}

#[test]
fn test_sobel_conflicts_with_canny() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("frame.png");
    write_checkerboard(&image);

    let output = run_evalfocus(&[
        image.to_str().unwrap(),
        "--no-face-detect",
        "--sobel",
        "--filter",
        "canny",
    ]);
    assert_eq!(output.status.code(), Some(1));
}
