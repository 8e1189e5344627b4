//! Configuration layer separating CLI arguments from the internal run configuration.
//!
//! - `GlobalArgs`: options that concern output, logging and the runtime
//! - `FocusCommand`: options of the focus evaluation itself
//! - `FocusConfig`: what the rest of the crate works with, built by `FocusConfig::from_args`
//!
//! Engine tuning constants live in [`FocusParams`] and may be replaced from a TOML file.

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::edge_map::{BitDepth, EdgeFilter, EdgeSettings, NormalizeMode};
use crate::focus_params::FocusParams;
use crate::onnx_session::Device;

/// Default face model file name
pub const DEFAULT_FACE_MODEL: &str = "yunet.onnx";

/// Parse an edge filter aperture (odd, 1 to 9)
pub fn parse_kernel_size(s: &str) -> Result<u32, String> {
    let val = s
        .parse::<u32>()
        .map_err(|_| format!("Invalid number: '{s}'"))?;
    if !matches!(val, 1 | 3 | 5 | 7 | 9) {
        return Err(format!("Kernel size must be one of 1, 3, 5, 7, 9, got {val}"));
    }
    Ok(val)
}

/// Parse an edge filter depth in bits (8 or 32)
pub fn parse_depth(s: &str) -> Result<BitDepth, String> {
    match s.trim() {
        "8" => Ok(BitDepth::U8),
        "32" => Ok(BitDepth::F32),
        _ => Err(format!("Depth must be 8 or 32, got '{s}'")),
    }
}

/// CLI arguments that concern output, logging and the runtime
#[derive(Parser, Debug, Clone)]
pub struct GlobalArgs {
    /// Output directory for metadata files (overrides default placement next to input)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Write a metadata file per image
    #[arg(long)]
    pub metadata: bool,

    /// Verbosity level (-q/--quiet, -v/-vv/-vvv for info/debug/trace)
    #[command(flatten)]
    pub verbosity: Verbosity,

    /// Device to use for inference
    #[arg(long, value_enum, default_value_t = Device::Auto)]
    pub device: Device,

    /// Disable colored output (also respects NO_COLOR and EVALFOCUS_NO_COLOR env vars)
    #[arg(long)]
    pub no_color: bool,
}

/// CLI arguments of the focus evaluation
#[derive(Parser, Debug, Clone)]
pub struct FocusCommand {
    /// Path(s) to input images or directories. Supports glob patterns like *.jpg
    #[arg(value_name = "IMAGES_OR_DIRS", required = true)]
    pub sources: Vec<String>,

    /// Edge filter aperture size
    #[arg(short = 'k', long = "kernel", default_value = "5", value_parser = parse_kernel_size)]
    pub kernel_size: u32,

    /// Edge filter depth in bits (8 or 32)
    #[arg(short = 'd', long, default_value = "8", value_parser = parse_depth)]
    pub depth: BitDepth,

    /// Edge filter
    #[arg(long, value_enum, default_value_t = EdgeFilter::Laplacian)]
    pub filter: EdgeFilter,

    /// Shorthand for --filter sobel
    #[arg(long)]
    pub sobel: bool,

    /// Detect faces and score the sharpest one (default)
    #[arg(long, overrides_with = "no_face_detect")]
    pub face_detect: bool,

    /// Score the whole frame without face detection
    #[arg(long, overrides_with = "face_detect")]
    pub no_face_detect: bool,

    /// Face detection model file
    #[arg(short = 'm', long, default_value = DEFAULT_FACE_MODEL)]
    pub model: String,

    /// Always stretch crop contrast before filtering
    #[arg(long, overrides_with = "no_normalize")]
    pub normalize: bool,

    /// Never stretch crop contrast
    #[arg(long, overrides_with = "normalize")]
    pub no_normalize: bool,

    /// Optional no-reference quality model used as a pre-check
    #[arg(long)]
    pub quality_model: Option<String>,

    /// TOML file overriding scoring parameters
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Save an annotated visual log image
    #[arg(long)]
    pub vlog: bool,

    /// Directory for visual logs (default: $HOME/vlog)
    #[arg(long)]
    pub vlog_dir: Option<String>,
}

/// Internal configuration for one run
#[derive(Debug, Clone, Serialize)]
pub struct FocusConfig {
    #[serde(skip)]
    pub sources: Vec<String>,
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    pub metadata: bool,
    pub face_detect: bool,
    pub model_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_model: Option<String>,
    pub edge: EdgeSettings,
    pub params: FocusParams,
    pub vlog: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vlog_dir: Option<String>,
}

impl FocusConfig {
    /// Create configuration from global args and command args
    pub fn from_args(global: GlobalArgs, cmd: FocusCommand) -> anyhow::Result<Self> {
        let filter = if cmd.sobel {
            if cmd.filter != EdgeFilter::Laplacian && cmd.filter != EdgeFilter::Sobel {
                anyhow::bail!("Cannot use --sobel together with --filter {:?}", cmd.filter);
            }
            EdgeFilter::Sobel
        } else {
            cmd.filter
        };

        let normalize = if cmd.normalize {
            NormalizeMode::On
        } else if cmd.no_normalize {
            NormalizeMode::Off
        } else {
            NormalizeMode::Auto
        };

        let params = match &cmd.params {
            Some(path) => FocusParams::from_toml_file(path)?,
            None => FocusParams::default(),
        };

        Ok(Self {
            sources: cmd.sources,
            device: global.device,
            output_dir: global.output_dir,
            metadata: global.metadata,
            face_detect: !cmd.no_face_detect,
            model_path: cmd.model,
            quality_model: cmd.quality_model,
            edge: EdgeSettings {
                filter,
                kernel_size: cmd.kernel_size,
                depth: cmd.depth,
                normalize,
            },
            params,
            vlog: cmd.vlog,
            vlog_dir: cmd.vlog_dir,
        })
    }

    /// Directory visual logs are written to
    pub fn vlog_dir(&self) -> Option<PathBuf> {
        match &self.vlog_dir {
            Some(dir) => Some(PathBuf::from(dir)),
            None => std::env::var_os("HOME").map(|home| PathBuf::from(home).join("vlog")),
        }
    }
}

/// Resolve a model path given on the command line.
///
/// Relative paths that do not exist in the working directory are looked up
/// next to the executable.
pub fn resolve_model_path(model: &str) -> PathBuf {
    let path = Path::new(model);
    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(path)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}
