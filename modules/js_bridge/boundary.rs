// BoundaryTag storage.
//
// A host error raised into the engine travels as a plain engine `Error`
// whose only visible content is the message. The link back to the host
// error lives in a `WeakMap` owned by the bridge and unreachable from
// scripts: the map's key is the engine error object, its value a class
// instance holding the host error. The entry lives exactly as long as the
// error object does, however scripts pass it around.

use crate::error::BridgedError;
use crate::translate::discard_exception;
use rquickjs::class::{Trace, Tracer};
use rquickjs::function::{Constructor, This};
use rquickjs::{Class, Ctx, Function, JsLifetime, Object, Persistent, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Engine-side holder of a host error. Never exposed to scripts.
#[derive(JsLifetime)]
#[rquickjs::class(rename = "BridgedCause")]
struct Tag {
    error: BridgedError,
    live: Rc<Cell<usize>>,
}

impl Trace<'_> for Tag {
    fn trace(&self, _tracer: Tracer<'_, '_>) {}
}

impl Drop for Tag {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// The private map and the `get`/`set` it was created with, so later
/// patches to `WeakMap.prototype` do not reach it.
struct Table {
    map: Persistent<Object<'static>>,
    get: Persistent<Function<'static>>,
    set: Persistent<Function<'static>>,
}

struct Handles<'js> {
    map: Object<'js>,
    get: Function<'js>,
    set: Function<'js>,
}

impl Table {
    fn restore<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Handles<'js>> {
        Ok(Handles {
            map: self.map.clone().restore(ctx)?,
            get: self.get.clone().restore(ctx)?,
            set: self.set.clone().restore(ctx)?,
        })
    }
}

/// Host errors currently travelling through one engine instance.
///
/// Must be dropped before the runtime it was installed in.
#[derive(Default)]
pub struct Boundary {
    table: RefCell<Option<Table>>,
    live: Rc<Cell<usize>>,
}

impl Boundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the private map in `ctx`. Done by `Bridge::install`, before
    /// scripts run, and otherwise on first use.
    ///
    /// # Errors
    /// Fails when the context has no usable `WeakMap`.
    pub fn install(&self, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        self.handles(ctx).map(|_| ())
    }

    /// Tags `exception` with a reference to `cause`.
    ///
    /// # Errors
    /// Fails when the map cannot be created or updated.
    pub fn attach<'js>(
        &self,
        ctx: &Ctx<'js>,
        exception: &Object<'js>,
        cause: BridgedError,
    ) -> rquickjs::Result<()> {
        let handles = self.handles(ctx)?;
        // Counted up front: a tag dropped on any failure below counts down.
        self.live.set(self.live.get() + 1);
        let tag = Class::instance(
            ctx.clone(),
            Tag {
                error: cause,
                live: self.live.clone(),
            },
        )?;
        handles
            .set
            .call::<_, Value>((This(handles.map), exception.clone(), tag))?;
        tracing::trace!(live = self.live.get(), "attached boundary tag");
        Ok(())
    }

    /// The host error `exception` was tagged with, if any.
    pub fn recover<'js>(&self, ctx: &Ctx<'js>, exception: &Object<'js>) -> Option<BridgedError> {
        let existing = self.table.borrow().as_ref().map(|table| table.restore(ctx));
        let lookup = existing?.and_then(|handles| {
            handles
                .get
                .call::<_, Option<Class<'js, Tag>>>((This(handles.map), exception.clone()))
        });
        match lookup {
            Ok(tag) => tag.map(|tag| tag.borrow().error.clone()),
            Err(error) => {
                discard_exception(ctx, &error);
                None
            }
        }
    }

    /// Number of host errors still referenced from live engine objects.
    /// Tags of collected objects are released by the engine's collector.
    pub fn len(&self) -> usize {
        self.live.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handles<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Handles<'js>> {
        let existing = self.table.borrow().as_ref().map(|table| table.restore(ctx));
        if let Some(handles) = existing {
            return handles;
        }

        let weak_map: Constructor = ctx.globals().get("WeakMap")?;
        let map: Object = weak_map.construct(())?;
        let get: Function = map.get("get")?;
        let set: Function = map.get("set")?;
        *self.table.borrow_mut() = Some(Table {
            map: Persistent::save(ctx, map.clone()),
            get: Persistent::save(ctx, get.clone()),
            set: Persistent::save(ctx, set.clone()),
        });
        Ok(Handles { map, get, set })
    }
}
