use anyhow::Result;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FocusError;

/// Check if a file has a supported image extension
/// Supports: jpg, jpeg, png, webp, bmp, tiff, tif
pub fn is_supported_image_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext_lower = ext.to_string_lossy().to_lowercase();
        matches!(
            ext_lower.as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tiff" | "tif"
        )
    } else {
        false
    }
}

/// Find all image files in a directory (non-recursive)
pub fn find_images_in_directory(dir_path: &Path) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();

    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();
        if path.is_file() && is_supported_image_file(&path) {
            image_files.push(path);
        }
    }

    image_files.sort();
    Ok(image_files)
}

fn looks_like_glob(source: &str) -> bool {
    source.contains('*') || source.contains('?') || source.contains('[')
}

/// Expand files, directories and glob patterns into image paths.
///
/// Explicit files are kept in the order given, whatever their extension; the
/// decoder decides whether they are images. A missing explicit path is a
/// [`FocusError::ImageNotFound`].
pub fn collect_images_from_sources(sources: &[String]) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    for source in sources {
        let source_path = Path::new(source);

        if source_path.is_file() {
            images.push(source_path.to_path_buf());
        } else if source_path.is_dir() {
            let dir_images = find_images_in_directory(source_path)?;
            if dir_images.is_empty() {
                log::warn!(
                    "{} No images found in directory: {}",
                    crate::color_utils::symbols::warning(),
                    source
                );
            }
            images.extend(dir_images);
        } else if !looks_like_glob(source) {
            return Err(FocusError::ImageNotFound(source_path.to_path_buf()).into());
        } else {
            let paths = glob::glob(source)
                .map_err(|_| FocusError::ImageNotFound(source_path.to_path_buf()))?;
            let mut matched = Vec::new();
            for path_result in paths {
                match path_result {
                    Ok(path) if path.is_file() && is_supported_image_file(&path) => {
                        matched.push(path)
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!(
                            "{} Error reading path in glob {source}: {e}",
                            crate::color_utils::symbols::warning()
                        );
                    }
                }
            }
            if matched.is_empty() {
                return Err(FocusError::ImageNotFound(source_path.to_path_buf()).into());
            }
            matched.sort();
            images.extend(matched);
        }
    }

    // the same file given twice is scored once
    let mut seen = std::collections::HashSet::new();
    images.retain(|path| seen.insert(path.clone()));

    Ok(images)
}

/// Decode `path` into an RGB frame.
pub fn load_frame(path: &Path) -> Result<RgbImage> {
    if !path.is_file() {
        return Err(FocusError::ImageNotFound(path.to_path_buf()).into());
    }
    let img = image::open(path).map_err(|e| FocusError::ImageDecode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(img.to_rgb8())
}
