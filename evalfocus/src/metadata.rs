//! Per-image metadata files: the focus report together with the configuration
//! and runtime context that produced it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::FocusReport;
use crate::onnx_session::ModelInfo;

/// Suffix of metadata files, before the extension
pub const METADATA_SUFFIX: &str = "evalfocus";

#[derive(Serialize, Debug, Clone)]
pub struct FocusMetadata {
    pub focus: FocusReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Value>,
    pub execution: ExecutionContext,
    pub system: SystemInfo,
    pub input: InputInfo,
}

#[derive(Serialize, Debug, Clone)]
pub struct ExecutionContext {
    pub timestamp: DateTime<Utc>,
    pub evalfocus_version: String,
    pub command_line: Vec<String>,
    pub processing_time_ms: f64,
}

impl ExecutionContext {
    pub fn now(processing_time_ms: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            evalfocus_version: env!("CARGO_PKG_VERSION").to_string(),
            command_line: std::env::args().collect(),
            processing_time_ms,
        }
    }
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct SystemInfo {
    pub device_requested: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_model: Option<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_model: Option<ModelInfo>,
}

#[derive(Serialize, Debug, Clone)]
pub struct InputInfo {
    pub image_path: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlog_path: Option<String>,
}

/// `<stem>.evalfocus.toml` next to `input`, or inside `output_dir` when given.
pub fn get_metadata_path(input: &Path, output_dir: Option<&str>) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let filename = format!("{stem}.{METADATA_SUFFIX}.toml");

    match output_dir {
        Some(dir) => {
            let dir = Path::new(dir);
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
            Ok(dir.join(filename))
        }
        None => Ok(input.parent().unwrap_or(Path::new(".")).join(filename)),
    }
}

pub fn save_metadata(metadata: &FocusMetadata, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(metadata).context("Failed to serialize metadata")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write metadata {}", path.display()))?;
    debug!("📋 Saved metadata to: {}", path.display());
    Ok(())
}
