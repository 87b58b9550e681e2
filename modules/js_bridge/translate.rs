// Translation of caught engine exceptions into host errors.
//
// Translation never fails. Every engine query that throws (getters, string
// conversion of symbols) has its exception discarded and falls back to a
// plainer message.

use crate::boundary::Boundary;
use crate::config::{CaptureConfig, StackTraceDetail};
use crate::error::{BridgedError, Origin, ThrownValue};
use crate::stack_trace::StackTrace;
use rquickjs::convert::Coerced;
use rquickjs::{Ctx, FromJs, Object, Value};

/// Where an engine failure happened, for failures without call frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub resource_name: String,
    /// 1-based.
    pub line_number: u32,
    /// 0-based.
    pub start_column: u32,
}

impl MessageInfo {
    /// Location recorded on an engine error object: its `fileName`,
    /// `lineNumber` and `columnNumber` properties, or else the first
    /// location in its `stack`.
    pub fn from_error<'js>(ctx: &Ctx<'js>, error: &Object<'js>) -> Option<Self> {
        let resource_name = property::<Option<String>>(ctx, error, "fileName").flatten();
        let line_number = property::<Option<u32>>(ctx, error, "lineNumber").flatten();
        if let (Some(resource_name), Some(line_number)) = (resource_name, line_number) {
            let column = property::<Option<u32>>(ctx, error, "columnNumber")
                .flatten()
                .unwrap_or(1);
            return Some(Self {
                resource_name,
                line_number,
                start_column: column.saturating_sub(1),
            });
        }

        let stack = property::<Option<String>>(ctx, error, "stack").flatten()?;
        let trace = StackTrace::parse(&stack, 1, StackTraceDetail::Overview);
        let frame = trace.frames().first()?;
        Some(Self {
            resource_name: frame.resource_name().to_string(),
            line_number: frame.line_number(),
            start_column: frame.column_number(),
        })
    }
}

/// Message of a syntax error, which has no call frames to point at the
/// offending source: `"{message} at {resource}:{line}:{column}"` with a
/// 1-based column.
pub fn syntax_error_message(message: &str, info: &MessageInfo) -> String {
    format!(
        "{} at {}:{}:{}",
        message,
        info.resource_name,
        info.line_number,
        info.start_column + 1
    )
}

/// Turns the value caught from the engine into a host error.
///
/// `boundary` resolves the BoundaryTag of exceptions that started as host
/// errors, which become the translated error's cause.
pub fn translate_caught_exception<'js>(
    ctx: &Ctx<'js>,
    thrown: Value<'js>,
    config: &CaptureConfig,
    boundary: &Boundary,
) -> BridgedError {
    let mut cause = None;
    let mut name = None;
    let mut syntax_error = false;
    let mut engine_backtrace = StackTrace::empty();

    let message = match thrown.as_object() {
        Some(object) if thrown.is_error() => {
            cause = boundary.recover(ctx, object);
            name = property::<Option<String>>(ctx, object, "name").flatten();
            let message = property::<Option<Coerced<String>>>(ctx, object, "message")
                .flatten()
                .map_or_else(|| coerce(ctx, &thrown), |message| message.0);
            if is_syntax_error(ctx, object) {
                syntax_error = true;
                match MessageInfo::from_error(ctx, object) {
                    Some(info) => syntax_error_message(&message, &info),
                    None => message,
                }
            } else {
                engine_backtrace = StackTrace::capture(ctx, object, config);
                message
            }
        }
        Some(object) => match property::<Option<Coerced<String>>>(ctx, object, "message") {
            Some(Some(message)) => message.0,
            _ => coerce(ctx, &thrown),
        },
        None => coerce(ctx, &thrown),
    };

    tracing::debug!(
        error = %message,
        frames = engine_backtrace.len(),
        recovered_cause = cause.is_some(),
        "translated engine exception"
    );

    let display = coerce(ctx, &thrown);
    let mut builder = BridgedError::builder(Origin::Engine, message)
        .value(ThrownValue::save(ctx, thrown, display))
        .engine_backtrace(engine_backtrace)
        .capture_host_backtrace(config.host_backtrace);
    if let Some(name) = name {
        builder = builder.name(name);
    }
    if let Some(cause) = cause {
        builder = builder.cause(cause);
    }
    if syntax_error {
        builder = builder.syntax_error();
    }
    builder.build()
}

fn is_syntax_error<'js>(ctx: &Ctx<'js>, error: &Object<'js>) -> bool {
    let constructor = property::<Value>(ctx, error, "constructor");
    let syntax_error = property::<Value>(ctx, &ctx.globals(), "SyntaxError");
    matches!((constructor, syntax_error), (Some(a), Some(b)) if a == b)
}

fn property<'js, T: FromJs<'js>>(ctx: &Ctx<'js>, object: &Object<'js>, key: &str) -> Option<T> {
    match object.get::<_, T>(key) {
        Ok(value) => Some(value),
        Err(error) => {
            discard_exception(ctx, &error);
            None
        }
    }
}

/// String form of any engine value.
fn coerce<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    match value.get::<Coerced<String>>() {
        Ok(text) => text.0,
        Err(error) => {
            discard_exception(ctx, &error);
            let fallback = format!("<unprintable {:?}>", value.type_of());
            tracing::warn!(error = %fallback, "thrown value has no string form");
            fallback
        }
    }
}

/// Clears the pending exception left behind by a failed engine call.
pub(crate) fn discard_exception(ctx: &Ctx<'_>, error: &rquickjs::Error) {
    if matches!(error, rquickjs::Error::Exception) {
        let _ = ctx.catch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_message_uses_one_based_column() {
        let info = MessageInfo {
            resource_name: "main.js".into(),
            line_number: 10,
            start_column: 4,
        };
        let message = syntax_error_message("unexpected token", &info);
        assert_eq!(message, "unexpected token at main.js:10:5");
        assert!(message.ends_with("at main.js:10:5"));
    }
}
