// Engine exceptions seen from the host

#![allow(clippy::unwrap_used)] // Test code: unwrap is acceptable

use js_bridge::{BacktraceFilter, Bridge, CaptureConfig, Origin, StackTraceDetail};
use rquickjs::{Context, Ctx, Module, Runtime, Value};

fn with_bridge<F>(config: CaptureConfig, f: F)
where
    F: for<'js> FnOnce(&Ctx<'js>, &Bridge),
{
    let runtime = Runtime::new().unwrap();
    let context = Context::full(&runtime).unwrap();
    context.with(|ctx| {
        let bridge = js_bridge::init(&ctx, config).unwrap();
        f(&ctx, &bridge);
    });
}

#[test]
fn test_thrown_object_keeps_identity() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || {
                ctx.eval::<(), _>("globalThis.payload = { code: 7 }; throw payload;")
            })
            .unwrap_err();

        assert_eq!(error.origin(), Origin::Engine);
        assert!(error.cause().is_none());
        // Plain objects record no stack.
        assert!(error.engine_backtrace().unwrap().is_empty());

        let restored = error.value().unwrap().restore(ctx).unwrap();
        ctx.globals().set("restored", restored).unwrap();
        let same: bool = ctx.eval("restored === payload").unwrap();
        assert!(same);
    });
}

#[test]
fn test_thrown_primitives_keep_their_value() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || ctx.eval::<(), _>("throw 42;"))
            .unwrap_err();
        assert_eq!(error.message(), "42");
        let value = error.value().unwrap().restore(ctx).unwrap();
        assert_eq!(value.as_number(), Some(42.0));

        let error = bridge
            .try_block(ctx, || ctx.eval::<(), _>("throw 'oops';"))
            .unwrap_err();
        assert_eq!(error.message(), "oops");
        assert_eq!(error.value().unwrap().as_str(), "oops");

        let error = bridge
            .try_block(ctx, || ctx.eval::<(), _>("throw null;"))
            .unwrap_err();
        assert_eq!(error.message(), "null");
        let value: Value = error.value().unwrap().restore(ctx).unwrap();
        assert!(value.is_null());
    });
}

#[test]
fn test_plain_object_message_is_used() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || ctx.eval::<(), _>("throw { message: 'custom' };"))
            .unwrap_err();
        assert_eq!(error.message(), "custom");
        assert_eq!(error.name(), None);
    });
}

#[test]
fn test_error_name_and_frames() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || {
                ctx.eval::<(), _>("function read(o) {\n  return o.field;\n}\nread(null);\n")
            })
            .unwrap_err();
        assert_eq!(error.name(), Some("TypeError"));
        assert!(!error.is_syntax_error());

        let trace = error.engine_backtrace().unwrap();
        let top = &trace.frames()[0];
        assert_eq!(top.function_name(), Some("read"));
        assert_eq!(top.line_number(), 2);
    });
}

#[test]
fn test_syntax_error_points_at_source() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || {
                Module::declare(ctx.clone(), "main.js", "let x = ;").map(|_| ())
            })
            .unwrap_err();
        assert!(error.is_syntax_error());
        assert_eq!(error.name(), Some("SyntaxError"));
        assert!(error.message().contains(" at main.js:1:"), "{}", error.message());
        assert!(error.engine_backtrace().unwrap().is_empty());
    });
}

#[test]
fn test_syntax_error_reports_line_and_column() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        // Unexpected `)` at line 10, 0-based column 4.
        let source = format!("{}    )", "\n".repeat(9));
        let error = bridge
            .try_block(ctx, || Module::declare(ctx.clone(), "main.js", source).map(|_| ()))
            .unwrap_err();
        assert!(error.is_syntax_error());
        assert!(error.message().ends_with(" at main.js:10:5"), "{}", error.message());
    });
}

#[test]
fn test_default_config_has_engine_backtrace() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || {
                ctx.eval::<(), _>("function explode() {\n  throw new Error('boom');\n}\nexplode();\n")
            })
            .unwrap_err();

        let engine = error.backtrace(&[BacktraceFilter::Engine]).unwrap();
        assert_eq!(engine, error.engine_backtrace().unwrap().to_strings());
        assert!(engine[0].starts_with("explode ("), "{engine:?}");

        // Engine frames come before whatever host frames were captured.
        let both = error.backtrace(&[]).unwrap();
        assert_eq!(both[..engine.len()], engine[..]);
    });
}

#[test]
fn test_undefined_message_uses_string_form() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || {
                ctx.eval::<(), _>("const e = new RangeError('x');\ne.message = undefined;\nthrow e;")
            })
            .unwrap_err();
        assert_eq!(error.message(), "RangeError");
        assert_eq!(error.name(), Some("RangeError"));
    });
}

#[test]
fn test_frame_limit_truncates_innermost_first() {
    let config = CaptureConfig::new().with_frame_limit(20);
    with_bridge(config, |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || {
                ctx.eval::<(), _>(
                    "function recurse(n) {\n  if (n === 0) throw new Error('deep');\n  const value = recurse(n - 1);\n  return value;\n}\nrecurse(70);\n",
                )
            })
            .unwrap_err();
        let trace = error.engine_backtrace().unwrap();
        assert_eq!(trace.len(), 20);
        assert!(trace.iter().all(|frame| frame.function_name() == Some("recurse")));
        assert_eq!(trace.frames()[0].line_number(), 2);
        assert_eq!(trace.frames()[1].line_number(), 3);
    });
}

#[test]
fn test_disabled_capture_records_no_frames() {
    let config = CaptureConfig::new()
        .with_capture_uncaught(false)
        .with_detail(StackTraceDetail::Detailed);
    with_bridge(config, |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || ctx.eval::<(), _>("throw new Error('quiet');"))
            .unwrap_err();
        assert_eq!(error.message(), "quiet");
        assert!(error.engine_backtrace().unwrap().is_empty());
    });
}

#[test]
fn test_successful_block_returns_value() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let value = bridge.try_block(ctx, || ctx.eval::<i32, _>("6 * 7")).unwrap();
        assert_eq!(value, 42);
    });
}

#[test]
fn test_conversion_failure_is_host_error() {
    with_bridge(CaptureConfig::default(), |ctx, bridge| {
        let error = bridge
            .try_block(ctx, || ctx.eval::<i32, _>("'not a number'"))
            .unwrap_err();
        assert_eq!(error.origin(), Origin::Host);
        assert!(error.value().is_none());
        assert!(error.downcast_ref::<rquickjs::Error>().is_some());
    });
}
