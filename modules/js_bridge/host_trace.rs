// Host (Rust) backtraces rendered as frame strings, innermost first.

use crate::config::HostBacktraceMode;
use std::backtrace::{Backtrace, BacktraceStatus};

/// Symbols belonging to the capture machinery rather than to the failure.
const CAPTURE_FRAME_PREFIXES: &[&str] = &[
    "std::backtrace::",
    "std::backtrace_rs::",
    "<std::backtrace",
    "anyhow::",
    "<anyhow::",
];

/// Captures the current host stack according to `mode`.
pub(crate) fn capture(mode: HostBacktraceMode) -> Option<Vec<String>> {
    let backtrace = match mode {
        HostBacktraceMode::Disabled => return None,
        HostBacktraceMode::Env => Backtrace::capture(),
        HostBacktraceMode::Always => Backtrace::force_capture(),
    };
    render(&backtrace)
}

/// Renders a captured backtrace into `symbol (file:line:col)` frames.
/// Returns `None` when nothing was captured (disabled or unsupported).
pub fn render(backtrace: &Backtrace) -> Option<Vec<String>> {
    if backtrace.status() != BacktraceStatus::Captured {
        return None;
    }
    Some(parse_frames(&backtrace.to_string()))
}

/// Parses the `Display` form of a std backtrace:
///
/// ```text
///    3: app::load_config
///              at ./src/config.rs:14:9
/// ```
pub fn parse_frames(text: &str) -> Vec<String> {
    let mut frames: Vec<(String, Option<String>)> = Vec::new();
    for line in text.lines() {
        let line = line.trim_start();
        if let Some(location) = line.strip_prefix("at ") {
            if let Some((_, slot @ None)) = frames.last_mut() {
                *slot = Some(location.trim().to_string());
            }
            continue;
        }
        let Some((index, symbol)) = line.split_once(": ") else {
            continue;
        };
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        frames.push((symbol.trim().to_string(), None));
    }

    frames
        .into_iter()
        .filter(|(symbol, _)| !is_capture_frame(symbol))
        .map(|(symbol, location)| match location {
            Some(location) => format!("{symbol} ({location})"),
            None => symbol,
        })
        .collect()
}

fn is_capture_frame(symbol: &str) -> bool {
    CAPTURE_FRAME_PREFIXES
        .iter()
        .any(|prefix| symbol.starts_with(prefix))
}
