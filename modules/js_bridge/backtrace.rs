// Bilingual backtraces: host and engine frames of a whole cause chain merged
// into one innermost-first sequence.

use crate::stack_trace::StackTrace;

/// Namespace of this crate's own symbols in host frames.
const BRIDGE_NAMESPACE: &str = "js_bridge::";
/// Source directory of this crate in host frame locations.
const BRIDGE_SOURCE_DIR: &str = "modules/js_bridge/";

/// Selects which frames [`crate::BridgedError::backtrace`] returns.
///
/// With neither `Host` nor `Engine` given both sides are included.
/// Frames of the bridge itself are dropped unless `Internal` is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BacktraceFilter {
    Host,
    Engine,
    Both,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Selection {
    pub host: bool,
    pub engine: bool,
    pub internal: bool,
}

impl Selection {
    pub(crate) fn from_filters(filters: &[BacktraceFilter]) -> Self {
        let has = |filter| filters.contains(&filter);
        let sided = has(BacktraceFilter::Host) || has(BacktraceFilter::Engine);
        let both = has(BacktraceFilter::Both) || !sided;
        Self {
            host: both || has(BacktraceFilter::Host),
            engine: both || has(BacktraceFilter::Engine),
            internal: has(BacktraceFilter::Internal),
        }
    }
}

/// The frames one link of a cause chain contributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLink<'a> {
    pub host: &'a [String],
    pub engine: Option<&'a StackTrace>,
}

/// Merges the traces of a cause chain, given from the outermost error to
/// the root cause.
///
/// A deeper link's trace repeats the frames of every shallower link as its
/// outermost part, so for each side a running count of frames already
/// shown is kept and that many outermost frames are cut from each further
/// link. Each link's remaining frames are placed in front of everything
/// collected so far, host before engine, which yields one sequence
/// ordered innermost first and interleaved link by link.
pub fn bilingual_backtrace<'a, I>(links: I, host: bool, engine: bool) -> Vec<String>
where
    I: IntoIterator<Item = TraceLink<'a>>,
{
    let mut segments: Vec<Vec<String>> = Vec::new();
    let mut shown_host = 0;
    let mut shown_engine = 0;

    for link in links {
        if host {
            let frames = unshown(link.host, shown_host);
            shown_host += frames.len();
            segments.push(frames.to_vec());
        }
        if !engine {
            continue;
        }
        if let Some(trace) = link.engine {
            let frames = unshown(trace.frames(), shown_engine);
            shown_engine += frames.len();
            segments.push(frames.iter().map(ToString::to_string).collect());
        }
    }

    segments.into_iter().rev().flatten().collect()
}

fn unshown<T>(frames: &[T], shown: usize) -> &[T] {
    &frames[..frames.len().saturating_sub(shown)]
}

/// Whether a rendered frame is a call site inside this crate.
pub fn is_internal_frame(frame: &str) -> bool {
    let symbol = frame.split(" (").next().unwrap_or(frame);
    if symbol.starts_with(BRIDGE_NAMESPACE)
        || symbol.contains(&format!("<{BRIDGE_NAMESPACE}"))
        || symbol.contains(&format!(" as {BRIDGE_NAMESPACE}"))
    {
        return true;
    }
    frame.match_indices(BRIDGE_SOURCE_DIR).any(|(index, dir)| {
        let file = frame[index + dir.len()..].split(':').next().unwrap_or_default();
        file.ends_with(".rs") && !file.contains('/')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack_trace::StackFrame;

    fn frames(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn trace(names: &[&str]) -> StackTrace {
        StackTrace::from_frames(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| StackFrame::new(Some((*name).to_string()), "app.js", i as u32 + 1, 0))
                .collect(),
        )
    }

    #[test]
    fn test_selection_defaults_to_both_sides() {
        let selection = Selection::from_filters(&[]);
        assert!(selection.host && selection.engine && !selection.internal);

        let selection = Selection::from_filters(&[BacktraceFilter::Internal]);
        assert!(selection.host && selection.engine && selection.internal);

        let selection = Selection::from_filters(&[BacktraceFilter::Engine]);
        assert!(!selection.host && selection.engine);

        let selection = Selection::from_filters(&[BacktraceFilter::Host, BacktraceFilter::Both]);
        assert!(selection.host && selection.engine);
    }

    #[test]
    fn test_single_link_puts_engine_before_host() {
        let host = frames(&["host::eval", "host::main"]);
        let engine = trace(&["thrower", "<eval>"]);
        let merged = bilingual_backtrace(
            [TraceLink { host: &host, engine: Some(&engine) }],
            true,
            true,
        );
        assert_eq!(
            merged,
            vec![
                "thrower (app.js:1:1)",
                "<eval> (app.js:2:1)",
                "host::eval",
                "host::main",
            ]
        );
    }

    #[test]
    fn test_shared_outer_frames_are_shown_once() {
        // outer error raised at the top-level evaluation
        let outer_host = frames(&["host::try_site", "host::main"]);
        let outer_engine = trace(&["caller", "<eval>"]);
        // its cause was raised deeper, inside a host callback
        let inner_host = frames(&["host::callback", "host::protect", "host::try_site", "host::main"]);

        let merged = bilingual_backtrace(
            [
                TraceLink { host: &outer_host, engine: Some(&outer_engine) },
                TraceLink { host: &inner_host, engine: None },
            ],
            true,
            true,
        );
        assert_eq!(
            merged,
            vec![
                "host::callback",
                "host::protect",
                "caller (app.js:1:1)",
                "<eval> (app.js:2:1)",
                "host::try_site",
                "host::main",
            ]
        );
    }

    #[test]
    fn test_engine_only_chain_has_no_duplicates() {
        let outer = StackTrace::from_frames(vec![
            StackFrame::new(Some("level".into()), "app.js", 1, 10),
            StackFrame::new(Some("<eval>".into()), "app.js", 3, 0),
        ]);
        let inner = StackTrace::from_frames(vec![
            StackFrame::new(Some("level".into()), "app.js", 1, 10),
            StackFrame::new(Some("level".into()), "app.js", 1, 10),
            StackFrame::new(Some("<eval>".into()), "app.js", 3, 0),
        ]);
        let merged = bilingual_backtrace(
            [
                TraceLink { host: &[], engine: Some(&outer) },
                TraceLink { host: &[], engine: Some(&inner) },
            ],
            false,
            true,
        );
        assert_eq!(merged, inner.to_strings());
    }

    #[test]
    fn test_exhausted_budget_contributes_nothing() {
        let outer = frames(&["a", "b", "c"]);
        let inner = frames(&["c"]);
        let merged = bilingual_backtrace(
            [
                TraceLink { host: &outer, engine: None },
                TraceLink { host: &inner, engine: None },
            ],
            true,
            false,
        );
        assert_eq!(merged, outer);
    }

    #[test]
    fn test_host_only_ignores_engine_frames() {
        let host = frames(&["host::main"]);
        let engine = trace(&["thrower"]);
        let merged = bilingual_backtrace(
            [TraceLink { host: &host, engine: Some(&engine) }],
            true,
            false,
        );
        assert_eq!(merged, host);
    }

    #[test]
    fn test_internal_frames() {
        assert!(is_internal_frame("js_bridge::guard::Bridge::try_block"));
        assert!(is_internal_frame(
            "<js_bridge::error::BridgedError as core::fmt::Display>::fmt"
        ));
        assert!(is_internal_frame(
            "core::ops::function::FnOnce::call_once (./modules/js_bridge/guard.rs:80:9)"
        ));
        assert!(!is_internal_frame("app::main (./src/main.rs:5:5)"));
        assert!(!is_internal_frame("my_js_bridge::run"));
        assert!(!is_internal_frame(
            "bridge_test::chain (./modules/js_bridge/tests/bridge_test.rs:10:5)"
        ));
        assert!(!is_internal_frame("level (app.js:1:11)"));
    }
}
