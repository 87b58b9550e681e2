use crate::boundary::Boundary;
use crate::config::CaptureConfig;
use crate::error::BridgedError;
use crate::translate::translate_caught_exception;
use rquickjs::function::{Constructor, Rest};
use rquickjs::{Ctx, Exception, Function, IntoJs, Object, Value};
use std::rc::Rc;

/// Exception bridging for one engine instance.
///
/// Holds the instance's capture settings and its BoundaryTag map. Clones
/// share both; host functions exposed to scripts keep a clone. Must be
/// dropped before the runtime it was installed in.
#[derive(Clone)]
pub struct Bridge {
    inner: Rc<BridgeInner>,
}

struct BridgeInner {
    config: CaptureConfig,
    boundary: Boundary,
}

impl Bridge {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            inner: Rc::new(BridgeInner {
                config,
                boundary: Boundary::new(),
            }),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    pub fn boundary(&self) -> &Boundary {
        &self.inner.boundary
    }

    /// Applies the stack capture settings to `ctx` and prepares the
    /// BoundaryTag map. Call before running scripts.
    ///
    /// # Errors
    /// Fails when the context has no usable `Error` or `WeakMap`.
    pub fn install(&self, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let limit = i32::try_from(self.inner.config.effective_frame_limit()).unwrap_or(i32::MAX);
        let error_ctor: Object = ctx.globals().get("Error")?;
        error_ctor.set("stackTraceLimit", limit)?;
        self.inner.boundary.install(ctx)
    }

    /// Runs engine work, turning an exception it throws into a host error.
    ///
    /// Engine API failures that are not script exceptions become host
    /// errors wrapping the `rquickjs::Error`.
    ///
    /// # Errors
    /// Returns the translated exception.
    pub fn try_block<'js, T, F>(&self, ctx: &Ctx<'js>, f: F) -> Result<T, BridgedError>
    where
        F: FnOnce() -> rquickjs::Result<T>,
    {
        match f() {
            Ok(value) => Ok(value),
            Err(rquickjs::Error::Exception) => Err(self.translate(ctx, ctx.catch())),
            Err(error) => Err(BridgedError::from(error)),
        }
    }

    /// Runs host code called from the engine, raising its failure into the
    /// engine as a native `Error` that still refers to the host error.
    ///
    /// # Errors
    /// Returns `rquickjs::Error::Exception` with the raised error pending.
    pub fn protect<'js, T, E, F>(&self, ctx: &Ctx<'js>, f: F) -> rquickjs::Result<T>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<BridgedError>,
    {
        f().map_err(|error| self.throw(ctx, error.into()))
    }

    /// Raises `error` into the engine. The engine sees an `Error` with the
    /// same message; the next translation recovers `error` itself as cause.
    pub fn throw<'js>(&self, ctx: &Ctx<'js>, error: BridgedError) -> rquickjs::Error {
        tracing::debug!(error = %error, origin = %error.origin(), "raising host error into engine");
        let exception = match new_error(ctx, error.message()) {
            Ok(exception) => exception,
            Err(failure) => return failure,
        };
        if let Err(failure) = self.inner.boundary.attach(ctx, &exception, error) {
            return failure;
        }
        ctx.throw(exception.into_value())
    }

    /// Translates a value caught from the engine. See
    /// [`translate_caught_exception`].
    pub fn translate<'js>(&self, ctx: &Ctx<'js>, thrown: Value<'js>) -> BridgedError {
        translate_caught_exception(ctx, thrown, &self.inner.config, &self.inner.boundary)
    }

    /// A script-callable function whose body runs under [`Bridge::protect`].
    ///
    /// # Errors
    /// Fails when the function object cannot be created.
    pub fn host_fn<'js, F, R, E>(
        &self,
        ctx: &Ctx<'js>,
        name: &str,
        f: F,
    ) -> rquickjs::Result<Function<'js>>
    where
        F: Fn(Ctx<'js>, Rest<Value<'js>>) -> Result<R, E> + 'js,
        R: IntoJs<'js> + 'js,
        E: Into<BridgedError> + 'js,
    {
        let bridge = self.clone();
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<R> {
                bridge.protect(&ctx, || f(ctx.clone(), args))
            },
        )?
        .with_name(name)
    }
}

/// A fresh `Error` built by the engine's own constructor, so it records
/// the current script stack.
fn new_error<'js>(ctx: &Ctx<'js>, message: &str) -> rquickjs::Result<Object<'js>> {
    let constructed = ctx
        .globals()
        .get::<_, Constructor>("Error")
        .and_then(|error_ctor| error_ctor.construct::<_, Object>((message,)));
    match constructed {
        Ok(exception) => Ok(exception),
        Err(rquickjs::Error::Exception) => {
            let _ = ctx.catch();
            Ok(Exception::from_message(ctx.clone(), message)?.into_object())
        }
        Err(_) => Ok(Exception::from_message(ctx.clone(), message)?.into_object()),
    }
}
