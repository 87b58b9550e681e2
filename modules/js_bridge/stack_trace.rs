// Engine-side stack traces.
//
// QuickJS records the stack on an error object when it is constructed and
// exposes it as the `stack` string, one `    at ...` line per frame,
// innermost first. Capture reads that string once and parses it into
// frames; nothing here ever throws into the engine.

use crate::config::{CaptureConfig, StackTraceDetail};
use crate::translate::discard_exception;
use rquickjs::{Ctx, Object};
use serde::{Deserialize, Serialize};
use std::fmt;

const NATIVE_LOCATION: &str = "native";
const ANONYMOUS: &str = "<anonymous>";

/// One captured call site in script code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    function_name: Option<String>,
    resource_name: String,
    line_number: u32,
    column_number: u32,
    is_native: bool,
}

impl StackFrame {
    /// `column_number` is 0-based.
    pub fn new(
        function_name: Option<String>,
        resource_name: impl Into<String>,
        line_number: u32,
        column_number: u32,
    ) -> Self {
        Self {
            function_name,
            resource_name: resource_name.into(),
            line_number,
            column_number,
            is_native: false,
        }
    }

    /// A frame of a function implemented outside script code.
    pub fn native(function_name: Option<String>) -> Self {
        Self {
            function_name,
            resource_name: NATIVE_LOCATION.to_string(),
            line_number: 0,
            column_number: 0,
            is_native: true,
        }
    }

    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// 1-based.
    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    /// 0-based; rendered 1-based.
    pub fn column_number(&self) -> u32 {
        self.column_number
    }

    pub fn is_native(&self) -> bool {
        self.is_native
    }

    /// Parses one line of an engine `stack` string.
    ///
    /// Accepts `at name (file:line:col)`, `at file:line:col`,
    /// `at name (native)` and line-only locations.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix("at ")?.trim();
        let (name, location) = match rest
            .strip_suffix(')')
            .and_then(|inner| inner.split_once(" ("))
        {
            Some((name, location)) => (Some(name.trim()), location),
            None => (None, rest),
        };
        let function_name = name
            .filter(|name| !name.is_empty() && *name != ANONYMOUS)
            .map(str::to_string);

        if location == NATIVE_LOCATION {
            return Some(Self::native(function_name));
        }

        let (resource_name, line_number, column_number) = parse_location(location)?;
        Some(Self::new(
            function_name,
            resource_name,
            line_number,
            column_number,
        ))
    }
}

/// Splits `file:line[:col]` from the right so that resource names may
/// contain colons. Engine columns are 1-based and stored 0-based.
fn parse_location(location: &str) -> Option<(String, u32, u32)> {
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next()?;
    let middle = parts.next()?;
    match parts.next() {
        Some(resource) => match (middle.parse::<u32>(), last.parse::<u32>()) {
            (Ok(line), Ok(column)) => Some((resource.to_string(), line, column.saturating_sub(1))),
            _ => {
                let line = last.parse().ok()?;
                Some((format!("{resource}:{middle}"), line, 0))
            }
        },
        None => Some((middle.to_string(), last.parse().ok()?, 0)),
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native {
            let name = self.function_name.as_deref().unwrap_or(ANONYMOUS);
            return write!(f, "{name} ({NATIVE_LOCATION})");
        }
        let location = format!(
            "{}:{}:{}",
            self.resource_name,
            self.line_number,
            self.column_number + 1
        );
        match &self.function_name {
            Some(name) => write!(f, "{name} ({location})"),
            None => f.write_str(&location),
        }
    }
}

/// Frames captured for one throw, innermost (throw site) first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackTrace {
    frames: Vec<StackFrame>,
}

impl StackTrace {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<StackFrame>) -> Self {
        Self { frames }
    }

    /// Parses an engine `stack` string, keeping at most `limit` frames.
    /// Lines that are not frames (the leading message of some engines,
    /// blank lines) are skipped.
    pub fn parse(stack: &str, limit: usize, detail: StackTraceDetail) -> Self {
        let frames = stack
            .lines()
            .filter_map(StackFrame::parse)
            .filter(|frame| detail == StackTraceDetail::Detailed || !frame.is_native)
            .take(limit)
            .collect();
        Self { frames }
    }

    /// Reads the trace the engine recorded on `error`.
    ///
    /// Never fails: a missing, non-string or throwing `stack` property
    /// yields an empty trace, as does disabled capture.
    pub fn capture<'js>(ctx: &Ctx<'js>, error: &Object<'js>, config: &CaptureConfig) -> Self {
        let limit = config.effective_frame_limit();
        if limit == 0 {
            return Self::empty();
        }
        match error.get::<_, Option<String>>("stack") {
            Ok(Some(stack)) => Self::parse(&stack, limit, config.detail),
            Ok(None) => Self::empty(),
            Err(error) => {
                discard_exception(ctx, &error);
                Self::empty()
            }
        }
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StackFrame> {
        self.frames.iter()
    }

    /// Rendered frames, innermost first.
    pub fn to_strings(&self) -> Vec<String> {
        self.frames.iter().map(ToString::to_string).collect()
    }
}

impl<'a> IntoIterator for &'a StackTrace {
    type Item = &'a StackFrame;
    type IntoIter = std::slice::Iter<'a, StackFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "    at {frame}")?;
        }
        Ok(())
    }
}
