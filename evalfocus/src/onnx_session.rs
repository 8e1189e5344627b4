use crate::color_utils::symbols;
use crate::error::FocusError;
use anyhow::{Context, Result};
use log::Level;
use ort::{
    execution_providers::{CPUExecutionProvider, CoreMLExecutionProvider, ExecutionProvider},
    logging::LogLevel,
    session::Session,
};
use serde::Serialize;
use std::fs;
use std::path::Path;

fn log_level_from_ort(level: LogLevel) -> Level {
    match level {
        LogLevel::Verbose => Level::Trace,
        LogLevel::Info => Level::Trace,
        LogLevel::Warning => Level::Debug,
        LogLevel::Error => Level::Info,
        LogLevel::Fatal => Level::Error,
    }
}

fn ort_level_from_log(level: Level) -> LogLevel {
    match level {
        // ONNX info output is closer to our trace
        Level::Trace => LogLevel::Verbose,
        Level::Debug => LogLevel::Warning,
        Level::Info => LogLevel::Error,
        Level::Warn => LogLevel::Error,
        Level::Error => LogLevel::Fatal,
    }
}

/// Execution device for ONNX models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CoreML when available, otherwise CPU
    #[default]
    Auto,
    Cpu,
    Coreml,
}

/// Resolve `Auto` to a concrete device
pub fn determine_optimal_device(requested: Device) -> Device {
    match requested {
        Device::Auto => match CoreMLExecutionProvider::default().is_available() {
            Ok(true) => Device::Coreml,
            _ => Device::Cpu,
        },
        other => other,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_path: String,
    pub model_size_bytes: usize,
    pub execution_providers: Vec<String>,
}

/// Load an ONNX model from `path` and build a session on `device`.
///
/// A missing file is reported as [`FocusError::ModelNotFound`].
pub fn create_onnx_session(path: &Path, device: Device) -> Result<(Session, ModelInfo)> {
    if !path.is_file() {
        return Err(FocusError::ModelNotFound(path.to_path_buf()).into());
    }
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read model file: {}", path.display()))?;

    let execution_providers = match determine_optimal_device(device) {
        Device::Coreml => match CoreMLExecutionProvider::default().is_available() {
            Ok(true) => vec![
                CoreMLExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
            _ => {
                log::warn!(
                    "{} CoreML not available, falling back to CPU",
                    symbols::warning()
                );
                vec![CPUExecutionProvider::default().build()]
            }
        },
        _ => vec![CPUExecutionProvider::default().build()],
    };

    let ep_names: Vec<String> = execution_providers
        .iter()
        .map(|ep| format!("{ep:?}"))
        .collect();

    // Choose the ORT log level based on what is enabled for us
    let ort_log_level = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
    ]
    .into_iter()
    .find(|&lvl| log::log_enabled!(lvl))
    .map(ort_level_from_log)
    .unwrap_or(LogLevel::Fatal);

    let session = Session::builder()
        .map_err(|e| anyhow::anyhow!("Failed to create session builder: {}", e))?
        .with_logger(Box::new(|level, _, _, _, msg| {
            let log_level = log_level_from_ort(level);
            log::log!(log_level, "[onnx] {msg}")
        }))
        .map_err(|e| anyhow::anyhow!("Failed to set logger: {}", e))?
        .with_log_level(ort_log_level)
        .map_err(|e| anyhow::anyhow!("Failed to set log level: {}", e))?
        .with_execution_providers(execution_providers)
        .map_err(|e| anyhow::anyhow!("Failed to set execution providers: {}", e))?
        .commit_from_memory(&bytes)
        .map_err(|e| anyhow::anyhow!("Failed to load model {}: {}", path.display(), e))?;

    let model_info = ModelInfo {
        model_path: path.display().to_string(),
        model_size_bytes: bytes.len(),
        execution_providers: ep_names,
    };

    log::debug!(
        "{} Execution providers registered: {}",
        symbols::system_setup(),
        model_info.execution_providers.join(" -> ")
    );

    Ok((session, model_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_resource_error() {
        let err = create_onnx_session(Path::new("/nonexistent/face.onnx"), Device::Cpu)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<FocusError>(),
            Some(FocusError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_explicit_device_is_kept() {
        assert_eq!(determine_optimal_device(Device::Cpu), Device::Cpu);
        assert_eq!(determine_optimal_device(Device::Coreml), Device::Coreml);
    }
}
