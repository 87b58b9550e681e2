use crate::backtrace::{BacktraceFilter, Selection, TraceLink, bilingual_backtrace, is_internal_frame};
use crate::config::HostBacktraceMode;
use crate::host_trace;
use crate::stack_trace::StackTrace;
use rquickjs::{Ctx, Persistent, Value};
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

/// Runtime in which a failure was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    Engine,
    Host,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Engine => f.write_str("engine"),
            Origin::Host => f.write_str("host"),
        }
    }
}

/// The raw value passed to a script `throw`, kept alive on the host side.
///
/// Must be dropped before the runtime it was thrown in.
#[derive(Clone)]
pub struct ThrownValue {
    raw: Persistent<Value<'static>>,
    display: String,
}

impl ThrownValue {
    pub(crate) fn save<'js>(ctx: &Ctx<'js>, value: Value<'js>, display: String) -> Self {
        Self {
            raw: Persistent::save(ctx, value),
            display,
        }
    }

    /// Returns the original value; objects keep their identity.
    ///
    /// # Errors
    /// Fails when `ctx` belongs to a different runtime than the one the
    /// value was thrown in.
    pub fn restore<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.raw.clone().restore(ctx)
    }

    /// String form of the value at the time it was caught.
    pub fn as_str(&self) -> &str {
        &self.display
    }
}

impl fmt::Debug for ThrownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThrownValue").field(&self.display).finish()
    }
}

enum HostSource {
    Boxed(Box<dyn StdError + 'static>),
    Anyhow(anyhow::Error),
}

impl HostSource {
    fn as_error(&self) -> &(dyn StdError + 'static) {
        match self {
            HostSource::Boxed(error) => error.as_ref(),
            HostSource::Anyhow(error) => &**error,
        }
    }
}

struct Inner {
    message: String,
    origin: Origin,
    name: Option<String>,
    value: Option<ThrownValue>,
    cause: Option<BridgedError>,
    engine_backtrace: Option<StackTrace>,
    host_backtrace: Option<Vec<String>>,
    syntax_error: bool,
    source: Option<HostSource>,
}

/// A failure from either runtime, as seen by the host.
///
/// Clones share the same error: [`BridgedError::ptr_eq`] tells whether two
/// handles are the same failure. `cause` links to the error that, when it
/// crossed the host/engine boundary, produced this one. Chains are built
/// only from already existing errors and are therefore finite and acyclic.
#[derive(Clone)]
pub struct BridgedError {
    inner: Rc<Inner>,
}

impl BridgedError {
    pub fn builder(origin: Origin, message: impl Into<String>) -> BridgedErrorBuilder {
        BridgedErrorBuilder::new(origin, message.into())
    }

    /// A host failure, with the host backtrace captured here as configured
    /// by `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`.
    pub fn host(message: impl Into<String>) -> Self {
        Self::builder(Origin::Host, message)
            .capture_host_backtrace(HostBacktraceMode::Env)
            .build()
    }

    /// Wraps a foreign host error. A boxed `BridgedError` is unwrapped
    /// instead, so it keeps its identity.
    pub fn from_host_error(error: Box<dyn StdError + 'static>) -> Self {
        match error.downcast::<BridgedError>() {
            Ok(bridged) => *bridged,
            Err(error) => Self::builder(Origin::Host, error.to_string())
                .capture_host_backtrace(HostBacktraceMode::Env)
                .source(HostSource::Boxed(error))
                .build(),
        }
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn origin(&self) -> Origin {
        self.inner.origin
    }

    /// Engine error class name (`TypeError`, ...), when known.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The raw thrown payload of an engine error. Host errors are their
    /// own payload and return `None`.
    pub fn value(&self) -> Option<&ThrownValue> {
        self.inner.value.as_ref()
    }

    pub fn cause(&self) -> Option<&BridgedError> {
        self.inner.cause.as_ref()
    }

    /// Engine frames captured when this error was thrown. Present (possibly
    /// empty) for engine errors, absent for host errors.
    pub fn engine_backtrace(&self) -> Option<&StackTrace> {
        self.inner.engine_backtrace.as_ref()
    }

    /// Host frames captured when this error was raised on the host side.
    pub fn host_backtrace(&self) -> Option<&[String]> {
        self.inner.host_backtrace.as_deref()
    }

    pub fn is_syntax_error(&self) -> bool {
        self.inner.syntax_error
    }

    pub fn ptr_eq(&self, other: &BridgedError) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The wrapped foreign host error, if it is an `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.source.as_ref()?.as_error().downcast_ref::<E>()
    }

    /// This error followed by each of its causes, ending at the root cause.
    pub fn causes(&self) -> Causes<'_> {
        Causes { next: Some(self) }
    }

    pub fn root_cause(&self) -> &BridgedError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }

    /// Whether the failure, traced to its root, began inside the engine.
    pub fn is_engine_origin(&self) -> bool {
        self.root_cause().origin() == Origin::Engine
    }

    pub fn is_host_origin(&self) -> bool {
        !self.is_engine_origin()
    }

    /// Host and engine frames of the whole cause chain, innermost first.
    ///
    /// Returns `None` only when this error recorded no trace on either
    /// side, so callers can tell "not captured" apart from an empty trace.
    pub fn backtrace(&self, filters: &[BacktraceFilter]) -> Option<Vec<String>> {
        if self.host_backtrace().is_none() && self.engine_backtrace().is_none() {
            return None;
        }
        let selection = Selection::from_filters(filters);
        let links = self.causes().map(|error| TraceLink {
            host: error.host_backtrace().unwrap_or_default(),
            engine: error.engine_backtrace(),
        });
        let mut frames = bilingual_backtrace(links, selection.host, selection.engine);
        if !selection.internal {
            frames.retain(|frame| !is_internal_frame(frame));
        }
        Some(frames)
    }
}

impl fmt::Display for BridgedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.message)
    }
}

impl fmt::Debug for BridgedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgedError")
            .field("message", &self.inner.message)
            .field("origin", &self.inner.origin)
            .field("name", &self.inner.name)
            .field("value", &self.inner.value)
            .field("cause", &self.inner.cause)
            .finish_non_exhaustive()
    }
}

impl StdError for BridgedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match (&self.inner.cause, &self.inner.source) {
            (Some(cause), _) => Some(cause),
            (None, Some(source)) => Some(source.as_error()),
            (None, None) => None,
        }
    }
}

impl From<Box<dyn StdError + 'static>> for BridgedError {
    fn from(error: Box<dyn StdError + 'static>) -> Self {
        Self::from_host_error(error)
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for BridgedError {
    fn from(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        let error: Box<dyn StdError + 'static> = error;
        Self::from_host_error(error)
    }
}

/// Keeps the backtrace anyhow captured at the point of failure.
impl From<anyhow::Error> for BridgedError {
    fn from(error: anyhow::Error) -> Self {
        let frames = host_trace::render(error.backtrace());
        let builder = Self::builder(Origin::Host, error.to_string());
        let builder = match frames {
            Some(frames) => builder.host_backtrace(frames),
            None => builder.capture_host_backtrace(HostBacktraceMode::Env),
        };
        builder.source(HostSource::Anyhow(error)).build()
    }
}

/// Engine API failures other than script exceptions (conversions,
/// allocation) are host-side failures.
impl From<rquickjs::Error> for BridgedError {
    fn from(error: rquickjs::Error) -> Self {
        Self::builder(Origin::Host, error.to_string())
            .capture_host_backtrace(HostBacktraceMode::Env)
            .source(HostSource::Boxed(Box::new(error)))
            .build()
    }
}

impl From<String> for BridgedError {
    fn from(message: String) -> Self {
        Self::host(message)
    }
}

impl From<&str> for BridgedError {
    fn from(message: &str) -> Self {
        Self::host(message)
    }
}

/// Iterator over an error and its causes, see [`BridgedError::causes`].
#[derive(Debug, Clone)]
pub struct Causes<'a> {
    next: Option<&'a BridgedError>,
}

impl<'a> Iterator for Causes<'a> {
    type Item = &'a BridgedError;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.cause();
        Some(current)
    }
}

pub struct BridgedErrorBuilder {
    inner: Inner,
}

impl BridgedErrorBuilder {
    fn new(origin: Origin, message: String) -> Self {
        let engine_backtrace = match origin {
            Origin::Engine => Some(StackTrace::empty()),
            Origin::Host => None,
        };
        Self {
            inner: Inner {
                message,
                origin,
                name: None,
                value: None,
                cause: None,
                engine_backtrace,
                host_backtrace: None,
                syntax_error: false,
                source: None,
            },
        }
    }

    #[must_use]
    pub fn cause(mut self, cause: BridgedError) -> Self {
        self.inner.cause = Some(cause);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn engine_backtrace(mut self, trace: StackTrace) -> Self {
        self.inner.engine_backtrace = Some(trace);
        self
    }

    #[must_use]
    pub fn host_backtrace(mut self, frames: Vec<String>) -> Self {
        self.inner.host_backtrace = Some(frames);
        self
    }

    #[must_use]
    pub fn capture_host_backtrace(mut self, mode: HostBacktraceMode) -> Self {
        self.inner.host_backtrace = host_trace::capture(mode);
        self
    }

    #[must_use]
    pub(crate) fn value(mut self, value: ThrownValue) -> Self {
        self.inner.value = Some(value);
        self
    }

    #[must_use]
    pub(crate) fn syntax_error(mut self) -> Self {
        self.inner.syntax_error = true;
        self
    }

    #[must_use]
    fn source(mut self, source: HostSource) -> Self {
        self.inner.source = Some(source);
        self
    }

    pub fn build(self) -> BridgedError {
        BridgedError {
            inner: Rc::new(self.inner),
        }
    }
}
