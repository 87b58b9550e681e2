use serde::Deserialize;

/// Frames recorded per throw unless configured otherwise.
pub const DEFAULT_FRAME_LIMIT: usize = 99;

/// How much of each engine frame is recorded at capture time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StackTraceDetail {
    /// Function name and script position only.
    #[default]
    Overview,
    /// Also keeps native frames, i.e. the points where script code called
    /// into host functions.
    Detailed,
}

/// When the host (Rust) side of a bridged error records its own backtrace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostBacktraceMode {
    Disabled,
    /// Follow `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`.
    #[default]
    Env,
    Always,
}

/// Stack capture settings for one engine instance.
///
/// Applied to a context with [`crate::Bridge::install`] and read-only
/// afterwards. Every engine instance gets its own value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfig {
    pub capture_uncaught: bool,
    pub frame_limit: usize,
    pub detail: StackTraceDetail,
    pub host_backtrace: HostBacktraceMode,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_uncaught: true,
            frame_limit: DEFAULT_FRAME_LIMIT,
            detail: StackTraceDetail::Overview,
            host_backtrace: HostBacktraceMode::Env,
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capture_uncaught(mut self, capture: bool) -> Self {
        self.capture_uncaught = capture;
        self
    }

    #[must_use]
    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = limit;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: StackTraceDetail) -> Self {
        self.detail = detail;
        self
    }

    #[must_use]
    pub fn with_host_backtrace(mut self, mode: HostBacktraceMode) -> Self {
        self.host_backtrace = mode;
        self
    }

    /// Number of engine frames to record per throw; zero when capture is off.
    pub fn effective_frame_limit(&self) -> usize {
        if self.capture_uncaught {
            self.frame_limit
        } else {
            0
        }
    }
}
