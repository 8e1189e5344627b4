use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use env_logger::Env;
use log::{debug, error, info, Level};
use std::path::Path;
use std::time::Instant;

use evalfocus::color_utils::{colors, init_color_config, symbols};
use evalfocus::config::{resolve_model_path, FocusCommand, FocusConfig, GlobalArgs};
use evalfocus::face_detector::FaceDetector;
use evalfocus::image_input::{collect_images_from_sources, load_frame};
use evalfocus::metadata::{
    get_metadata_path, save_metadata, ExecutionContext, FocusMetadata, InputInfo, SystemInfo,
};
use evalfocus::quality_gate::{OnnxQualityGate, QualityGate};
use evalfocus::vlog::save_vlog;
use evalfocus::yunet::YuNetDetector;
use evalfocus::{FocusEngine, FocusError, FocusReport};
use std::io::Write;

#[derive(Parser)]
#[command(name = "evalfocus")]
#[command(version)]
#[command(about = "Evaluate image focus")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    focus: FocusCommand,
}

fn get_log_level_from_verbosity(
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::ErrorLevel>,
) -> log::LevelFilter {
    let base_level = verbosity.log_level_filter();
    let adjusted_level = match base_level {
        log::LevelFilter::Off => log::LevelFilter::Off, // -qq -> OFF
        log::LevelFilter::Error => log::LevelFilter::Warn, // default -> WARN
        log::LevelFilter::Warn => log::LevelFilter::Info, // -v -> INFO
        log::LevelFilter::Info => log::LevelFilter::Debug, // -vv -> DEBUG
        log::LevelFilter::Debug => log::LevelFilter::Trace, // -vvv -> TRACE
        log::LevelFilter::Trace => log::LevelFilter::Trace, // -vvvv -> TRACE (max)
    };

    // clap-verbosity-flag can't tell default from -q, so check quiet directly
    if verbosity.is_silent() {
        log::LevelFilter::Error // -q -> ERROR
    } else {
        adjusted_level
    }
}

/// Loaded models, shared across all inputs of a run
struct Collaborators {
    detector: Option<YuNetDetector>,
    quality_gate: Option<OnnxQualityGate>,
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<FocusError>().is_some() {
        FocusError::EXIT_CANTOPEN
    } else {
        1
    }
}

fn process_image(
    path: &Path,
    config: &FocusConfig,
    engine: &FocusEngine,
    collaborators: &mut Collaborators,
) -> Result<FocusReport> {
    let start = Instant::now();
    debug!("{} Processing: {}", symbols::focus_start(), path.display());

    let frame = load_frame(path)?;
    let detector = collaborators
        .detector
        .as_mut()
        .map(|d| d as &mut dyn FaceDetector);
    let quality_gate = collaborators
        .quality_gate
        .as_mut()
        .map(|g| g as &mut dyn QualityGate);
    let outcome = engine.evaluate(&frame, detector, quality_gate)?;
    let report = outcome.report;

    println!("value={},face_count={}", report.score, report.face_count);
    info!(
        "{} {}: score={} faces={} regions={}/{}",
        symbols::completed_successfully(),
        path.display(),
        report.score,
        report.face_count,
        report.scored_regions,
        report.region_count
    );
    if let Some(winner) = &report.winner {
        info!(
            "   window={}..{} power={:.1} deduction={:.3} raw score={:.2}",
            winner.window.start,
            winner.window.end,
            winner.deducted_power,
            winner.deduction,
            winner.raw_score
        );
    }

    let mut vlog_path = None;
    if config.vlog {
        match (&outcome.frame, config.vlog_dir()) {
            (Some(resized), Some(dir)) => {
                let written = save_vlog(resized, outcome.winner.as_ref(), path, &dir)?;
                info!("   visual log={}", written.display());
                vlog_path = Some(written.display().to_string());
            }
            (None, _) => debug!("No visual log: quality gate decided the score"),
            (Some(_), None) => {
                log::warn!(
                    "{} HOME is not set; use --vlog-dir to save visual logs",
                    symbols::warning()
                );
            }
        }
    }

    if config.metadata {
        let metadata_path = get_metadata_path(path, config.output_dir.as_deref())?;
        let metadata = FocusMetadata {
            focus: report.clone(),
            config: Some(toml::Value::try_from(config)?),
            execution: ExecutionContext::now(start.elapsed().as_secs_f64() * 1000.0),
            system: SystemInfo {
                device_requested: format!("{:?}", config.device).to_lowercase(),
                face_model: collaborators
                    .detector
                    .as_ref()
                    .map(|d| d.model_info().clone()),
                quality_model: collaborators
                    .quality_gate
                    .as_ref()
                    .map(|g| g.model_info().clone()),
            },
            input: InputInfo {
                image_path: path.display().to_string(),
                width: frame.width(),
                height: frame.height(),
                vlog_path,
            },
        };
        save_metadata(&metadata, &metadata_path)?;
    }

    Ok(report)
}

/// Returns the process exit status.
fn run(global: GlobalArgs, cmd: FocusCommand) -> Result<i32> {
    let config = FocusConfig::from_args(global, cmd)?;
    let images = collect_images_from_sources(&config.sources)?;
    if images.is_empty() {
        anyhow::bail!("No image files found in the specified sources");
    }

    let sources_desc = if images.len() == 1 {
        images[0].display().to_string()
    } else {
        format!("{} inputs", images.len())
    };
    info!(
        "{} Focus evaluation: {} | filter: {:?} k={} | device: {:?}",
        symbols::focus_start(),
        sources_desc,
        config.edge.filter,
        config.edge.kernel_size,
        config.device
    );

    let engine = FocusEngine::new(config.params.clone(), config.edge.clone())?;
    let detector = if config.face_detect {
        let model_path = resolve_model_path(&config.model_path);
        Some(YuNetDetector::new(&model_path, config.device, &config.params)?)
    } else {
        None
    };
    let quality_gate = config
        .quality_model
        .as_ref()
        .map(|p| OnnxQualityGate::new(Path::new(p), config.device))
        .transpose()?;
    let mut collaborators = Collaborators {
        detector,
        quality_gate,
    };

    if let [single] = images.as_slice() {
        let report = process_image(single, &config, &engine, &mut collaborators)?;
        return Ok(report.score as i32);
    }

    let mut failures = 0;
    for path in &images {
        if let Err(e) = process_image(path, &config, &engine, &mut collaborators) {
            error!(
                "{} {}: {e:#}",
                symbols::operation_failed(),
                path.display()
            );
            failures += 1;
        }
    }

    if failures == 0 {
        info!(
            "{} Evaluated {} images",
            symbols::completed_successfully(),
            images.len()
        );
        Ok(0)
    } else {
        log::warn!(
            "{} {failures} of {} images failed",
            symbols::completed_partially_successfully(),
            images.len()
        );
        Ok(1)
    }
}

fn main() {
    let cli = Cli::parse();

    init_color_config(cli.global.no_color);

    // If user didn't pass -v/-q and RUST_LOG is set, honor the env var.
    let use_env = !cli.global.verbosity.is_present() && std::env::var_os("RUST_LOG").is_some();

    let mut logger = if use_env {
        Builder::from_env(Env::default())
    } else {
        let level_filter = get_log_level_from_verbosity(cli.global.verbosity.clone());

        let mut b = Builder::new();
        b.filter_level(level_filter);
        b
    };

    logger
        .format(|buf, record| {
            let level_str = match record.level() {
                Level::Error => colors::error_level("ERROR"),
                Level::Warn => colors::warning_level("WARN"),
                Level::Info => colors::info_level("INFO"),
                Level::Debug => colors::debug_level("DEBUG"),
                Level::Trace => colors::trace_level("TRACE"),
            };
            writeln!(buf, "[{}] {}", level_str, record.args())
        })
        .init();

    let code = match run(cli.global, cli.focus) {
        Ok(code) => code,
        Err(e) => {
            error!("{} Focus evaluation failed: {e:#}", symbols::operation_failed());
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
