// Human readable and serializable reports of bridged errors.

use crate::backtrace::BacktraceFilter;
use crate::error::{BridgedError, Origin};
use crate::stack_trace::StackFrame;
use deno_terminal::colors;
use serde::Serialize;
use std::fmt::Write;

/// Causes listed by [`format_error`] before the list is cut short.
const MAX_LISTED_CAUSES: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub color: bool,
    /// Passed to [`BridgedError::backtrace`].
    pub filters: Vec<BacktraceFilter>,
}

/// Formats `error` for a terminal:
///
/// ```text
/// error: callback failed
///     at check (app.js:3:9)
///     at app::main (./src/main.rs:12:5)
///
/// Caused by:
///     0: callback failed
///     1: quota exceeded
/// ```
///
/// Consecutive causes with the same message are listed once.
pub fn format_error(error: &BridgedError, options: &ReportOptions) -> String {
    let mut out = String::new();
    let label = match error.name() {
        Some(name) => format!("{name}:"),
        None => "error:".to_string(),
    };
    if options.color {
        let _ = write!(out, "{} {}", colors::red_bold(&label), error.message());
    } else {
        let _ = write!(out, "{} {}", label, error.message());
    }

    let frames = error.backtrace(&options.filters).unwrap_or_default();
    for frame in frames {
        if options.color {
            let _ = write!(out, "\n    {}", colors::gray(&format!("at {frame}")));
        } else {
            let _ = write!(out, "\n    at {frame}");
        }
    }

    if error.cause().is_some() {
        out.push_str("\n\nCaused by:");
        out.push_str(&format_causes(error));
    }
    out
}

/// Numbered list of the distinct messages along the cause chain.
fn format_causes(error: &BridgedError) -> String {
    let mut message = String::new();
    let mut display_count = 0;
    let mut past_message: Option<&str> = None;

    for cause in error.causes() {
        if past_message == Some(cause.message()) {
            continue;
        }
        if display_count >= MAX_LISTED_CAUSES {
            message.push_str("\n    ...");
            break;
        }
        let _ = write!(message, "\n    {}: {}", display_count, cause.message());
        past_message = Some(cause.message());
        display_count += 1;
    }
    message
}

/// Structured snapshot of a bridged error and its causes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub origin: Origin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thrown: Option<String>,
    pub engine_frames: Vec<StackFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorReport>>,
}

impl ErrorReport {
    pub fn new(error: &BridgedError) -> Self {
        Self::with_filters(error, &[])
    }

    /// `filters` select the backtrace of every level, see
    /// [`BridgedError::backtrace`].
    pub fn with_filters(error: &BridgedError, filters: &[BacktraceFilter]) -> Self {
        // Built from the root outwards so deep chains need no recursion.
        let causes: Vec<&BridgedError> = error.causes().skip(1).collect();
        let mut cause = None;
        for link in causes.into_iter().rev() {
            cause = Some(Box::new(Self::level(link, filters, cause)));
        }
        Self::level(error, filters, cause)
    }

    fn level(
        error: &BridgedError,
        filters: &[BacktraceFilter],
        cause: Option<Box<ErrorReport>>,
    ) -> Self {
        Self {
            message: error.message().to_string(),
            origin: error.origin(),
            name: error.name().map(str::to_string),
            thrown: error.value().map(|value| value.as_str().to_string()),
            engine_frames: error
                .engine_backtrace()
                .map(|trace| trace.frames().to_vec())
                .unwrap_or_default(),
            backtrace: error.backtrace(filters),
            cause,
        }
    }

    /// Number of errors in the report, this one included.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self;
        while let Some(cause) = current.cause.as_deref() {
            depth += 1;
            current = cause;
        }
        depth
    }
}

impl From<&BridgedError> for ErrorReport {
    fn from(error: &BridgedError) -> Self {
        Self::new(error)
    }
}
