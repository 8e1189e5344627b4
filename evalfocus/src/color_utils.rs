//! Terminal styling for log output.
//!
//! Styling is off when `--no-color` is given, when `NO_COLOR` or
//! `EVALFOCUS_NO_COLOR` is set to a non-empty value, under `TERM=dumb`, or when
//! stderr is not a terminal.

use colored::ColoredString;
use std::io::{stderr, IsTerminal};
use std::sync::OnceLock;

static STYLING: OnceLock<bool> = OnceLock::new();

fn env_flag_set(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty())
}

fn environment_allows_styling() -> bool {
    !env_flag_set("NO_COLOR")
        && !env_flag_set("EVALFOCUS_NO_COLOR")
        && std::env::var("TERM").map_or(true, |term| term != "dumb")
        && stderr().is_terminal()
}

fn styling_allowed(no_color_flag: bool) -> bool {
    !no_color_flag && environment_allows_styling()
}

/// Fix the styling decision for the rest of the process.
pub fn init_color_config(no_color_flag: bool) {
    if STYLING.set(styling_allowed(no_color_flag)).is_err() {
        eprintln!("Warning: color configuration already initialized");
    }
}

fn styling_enabled() -> bool {
    *STYLING.get_or_init(environment_allows_styling)
}

/// `style(text)` when styling is enabled, otherwise `text` unchanged.
pub fn maybe_color_stderr<F>(text: &str, style: F) -> String
where
    F: FnOnce(&str) -> ColoredString,
{
    if styling_enabled() {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

/// Level tags used by the logger
pub mod colors {
    use super::maybe_color_stderr;
    use colored::Colorize;

    pub fn error_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.red().bold())
    }

    pub fn warning_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.yellow())
    }

    pub fn info_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.green())
    }

    pub fn debug_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.blue())
    }

    pub fn trace_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.magenta())
    }
}

/// Message prefixes; emoji when styled, plain markers otherwise.
pub mod symbols {
    use super::styling_enabled;

    fn pick(styled: &'static str, plain: &'static str) -> &'static str {
        if styling_enabled() {
            styled
        } else {
            plain
        }
    }

    pub fn model_loaded() -> &'static str {
        pick("✅", "")
    }

    pub fn focus_start() -> &'static str {
        pick("🔍", "")
    }

    pub fn operation_failed() -> &'static str {
        pick("❌", "[FAILED]")
    }

    pub fn system_setup() -> &'static str {
        pick("⚙️", "")
    }

    pub fn completed_successfully() -> &'static str {
        pick("✅", "[OK]")
    }

    /// Some inputs succeeded, some failed
    pub fn completed_partially_successfully() -> &'static str {
        pick("⚠️", "[PARTIAL]")
    }

    pub fn warning() -> &'static str {
        pick("⚠️", "")
    }
}
