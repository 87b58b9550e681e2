// Exception bridging between the Rust host and the QuickJS engine
// Errors keep their payload, cause chain and both stacks across crossings

mod backtrace;
mod boundary;
mod config;
mod error;
mod guard;
mod host_trace;
pub mod report;
mod stack_trace;
mod translate;

pub use backtrace::{BacktraceFilter, TraceLink, bilingual_backtrace, is_internal_frame};
pub use boundary::Boundary;
pub use config::{CaptureConfig, DEFAULT_FRAME_LIMIT, HostBacktraceMode, StackTraceDetail};
pub use error::{BridgedError, BridgedErrorBuilder, Causes, Origin, ThrownValue};
pub use guard::Bridge;
pub use host_trace::{parse_frames as parse_host_frames, render as render_host_backtrace};
pub use stack_trace::{StackFrame, StackTrace};
pub use translate::{MessageInfo, syntax_error_message, translate_caught_exception};

use rquickjs::{Ctx, Result};

/// Creates the bridge for the engine instance owning `ctx` and applies
/// `config` to it.
///
/// # Errors
/// Fails when the capture settings cannot be applied to the context.
pub fn init(ctx: &Ctx<'_>, config: CaptureConfig) -> Result<Bridge> {
    let bridge = Bridge::new(config);
    bridge.install(ctx)?;
    tracing::debug!(
        frame_limit = bridge.config().effective_frame_limit(),
        detail = ?bridge.config().detail,
        "installed exception bridge"
    );
    Ok(bridge)
}
