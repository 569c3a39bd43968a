//! Durable handles
//!
//! Transient handles are plain `rquickjs` values (`Value<'js>`, `Object<'js>`,
//! ...). Their `'js` lifetime ties them to the scope opened by
//! [`Environment::with`](super::Environment::with), so the compiler rejects any
//! attempt to keep one after the scope closes. Anything that has to outlive
//! the scope is promoted to one of the durable handles below.
//!
//! Durable handles never own engine values directly. Every pinned value lives
//! in the [`HandleStore`] of its environment and a handle is only a key into
//! that store. Tearing the environment down empties the store before the
//! runtime goes away; a handle that outlives it reports
//! [`BridgeError::EnvironmentReleased`] instead of keeping engine memory alive.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rquickjs::class::{Class, ClassId, JsClass, Trace, Tracer, Writable};
use rquickjs::function::Constructor;
use rquickjs::{qjs, Ctx, Function, Object, Persistent, Value};

use super::environment::Scope;
use super::marshal::type_name;
use crate::core::error::{BridgeError, BridgeResult};

/// Who owns a native value bound to a script object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The script object is the only owner; the native value is destroyed when
    /// the collector reclaims the script object.
    Owned,
    /// Native code keeps its own strong reference; the script object keeps the
    /// native value alive as well.
    BorrowedStrong,
    /// Native code owns the value; the script object only observes it and
    /// loses access once native code drops it.
    BorrowedWeak,
}

/// Attaches a guard object to a target under a fresh private name. Each call
/// declares new classes, so one target can carry any number of guards, and
/// the field is invisible to reflection and ignores `Object.freeze`.
const STAMP_SOURCE: &str = r#"
(function (target, guard) {
    class Base {
        constructor(object) {
            return object;
        }
    }
    class Stamp extends Base {
        #guard;
        constructor(object, value) {
            super(object);
            this.#guard = value;
        }
    }
    new Stamp(target, guard);
})
"#;

/// Environment-owned storage for every value pinned by a durable handle.
pub struct HandleStore {
    env_id: u64,
    slots: RefCell<Vec<Option<Persistent<Value<'static>>>>>,
    free: RefCell<Vec<usize>>,
    stamp: RefCell<Option<Persistent<Function<'static>>>>,
    finalizers: RefCell<Vec<Box<dyn FnOnce()>>>,
    released: Cell<bool>,
}

impl HandleStore {
    pub fn new(env_id: u64) -> Rc<Self> {
        Rc::new(Self {
            env_id,
            slots: RefCell::new(Vec::new()),
            free: RefCell::new(Vec::new()),
            stamp: RefCell::new(None),
            finalizers: RefCell::new(Vec::new()),
            released: Cell::new(false),
        })
    }

    /// Pins `value` and returns a strong handle to it.
    ///
    /// A released store pins nothing; the returned handle reads as released.
    pub fn save<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, value: Value<'js>) -> Durable {
        if self.released.get() {
            return Durable(Rc::new(DurableSlot {
                store: Rc::clone(self),
                key: None,
            }));
        }
        let persistent = Persistent::save(ctx, value);
        let mut slots = self.slots.borrow_mut();
        let key = match self.free.borrow_mut().pop() {
            Some(key) => {
                slots[key] = Some(persistent);
                key
            }
            None => {
                slots.push(Some(persistent));
                slots.len() - 1
            }
        };
        Durable(Rc::new(DurableSlot {
            store: Rc::clone(self),
            key: Some(key),
        }))
    }

    fn restore<'js>(&self, ctx: &Ctx<'js>, key: Option<usize>) -> BridgeResult<Value<'js>> {
        let persistent = {
            let slots = self.slots.borrow();
            key.and_then(|key| slots.get(key))
                .and_then(Option::as_ref)
                .cloned()
                .ok_or(BridgeError::EnvironmentReleased)?
        };
        persistent.restore(ctx).map_err(|error| match error {
            rquickjs::Error::UnrelatedRuntime => BridgeError::EnvironmentMismatch,
            error => error.into(),
        })
    }

    fn remove(&self, key: usize) {
        if self.released.get() {
            return;
        }
        // Drop outside the borrow: freeing a value can run class finalizers.
        let value = self.slots.borrow_mut().get_mut(key).and_then(Option::take);
        if value.is_some() {
            self.free.borrow_mut().push(key);
        }
        drop(value);
    }

    /// Number of values currently pinned.
    pub fn len(&self) -> usize {
        self.slots.borrow().iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    fn stamp<'js>(&self, ctx: &Ctx<'js>) -> BridgeResult<Function<'js>> {
        let cached = self.stamp.borrow().clone();
        if let Some(stamp) = cached {
            return Ok(stamp.restore(ctx)?);
        }
        let stamp: Function<'js> = ctx.eval(STAMP_SOURCE)?;
        *self.stamp.borrow_mut() = Some(Persistent::save(ctx, stamp.clone()));
        Ok(stamp)
    }

    fn queue_finalizer(&self, finalizer: Box<dyn FnOnce()>) {
        if !self.released.get() {
            self.finalizers.borrow_mut().push(finalizer);
        }
    }

    /// Runs the finalizers of weak handles whose referents have been
    /// collected. Returns how many ran.
    pub fn run_finalizers(&self) -> usize {
        let mut ran = 0;
        loop {
            let pending = std::mem::take(&mut *self.finalizers.borrow_mut());
            if pending.is_empty() {
                break;
            }
            for finalizer in pending {
                finalizer();
                ran += 1;
            }
        }
        ran
    }

    /// Unpins every value. Must run while the engine runtime is still alive.
    pub(crate) fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        let stamp = self.stamp.borrow_mut().take();
        let finalizers = std::mem::take(&mut *self.finalizers.borrow_mut());
        self.free.borrow_mut().clear();
        tracing::debug!(
            target: "cyder::bindings",
            id = self.env_id,
            pinned = slots.iter().filter(|slot| slot.is_some()).count(),
            discarded_finalizers = finalizers.len(),
            "handle store released"
        );
        drop(slots);
        drop(stamp);
        drop(finalizers);
    }
}

struct DurableSlot {
    store: Rc<HandleStore>,
    key: Option<usize>,
}

impl Drop for DurableSlot {
    fn drop(&mut self) {
        if let Some(key) = self.key {
            self.store.remove(key);
        }
    }
}

/// Strong durable handle. Pins its referent until the last clone is dropped
/// or the environment is torn down, whichever comes first.
#[derive(Clone)]
pub struct Durable(Rc<DurableSlot>);

impl Durable {
    pub fn new<'js>(scope: &Scope<'js>, value: Value<'js>) -> Self {
        scope.env().handles().save(scope.ctx(), value)
    }

    pub fn from_object<'js>(scope: &Scope<'js>, object: Object<'js>) -> Self {
        Self::new(scope, object.into_value())
    }

    pub fn from_function<'js>(scope: &Scope<'js>, function: Function<'js>) -> Self {
        Self::new(scope, function.into_value())
    }

    /// Materializes the referent as a transient handle in the current scope.
    pub fn to_local<'js>(&self, ctx: &Ctx<'js>) -> BridgeResult<Value<'js>> {
        self.0.store.restore(ctx, self.0.key)
    }

    pub fn to_object<'js>(&self, ctx: &Ctx<'js>) -> BridgeResult<Object<'js>> {
        let value = self.to_local(ctx)?;
        let found = type_name(&value);
        value.into_object().ok_or(BridgeError::TypeMismatch {
            expected: "object",
            found,
        })
    }

    pub fn to_function<'js>(&self, ctx: &Ctx<'js>) -> BridgeResult<Function<'js>> {
        let value = self.to_local(ctx)?;
        let found = type_name(&value);
        value.into_function().ok_or(BridgeError::TypeMismatch {
            expected: "function",
            found,
        })
    }

    pub fn is_released(&self) -> bool {
        self.0.key.is_none() || self.0.store.is_released()
    }
}

struct WeakCell {
    alive: Cell<bool>,
    finalizer: Cell<Option<Box<dyn FnOnce()>>>,
    store: Weak<HandleStore>,
}

impl WeakCell {
    fn mark_collected(&self) {
        self.alive.set(false);
        if let Some(finalizer) = self.finalizer.take() {
            if let Some(store) = self.store.upgrade() {
                store.queue_finalizer(finalizer);
            }
        }
    }
}

/// Hidden object stored on a weak handle's target. It can only die together
/// with the target, so its class finalizer marks the handle collected.
pub struct WeakGuard {
    cell: Rc<WeakCell>,
}

impl Drop for WeakGuard {
    fn drop(&mut self) {
        self.cell.mark_collected();
    }
}

impl<'js> Trace<'js> for WeakGuard {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl<'js> JsClass<'js> for WeakGuard {
    const NAME: &'static str = "WeakGuard";

    type Mutable = Writable;

    fn class_id() -> &'static ClassId {
        static ID: ClassId = ClassId::new();
        &ID
    }

    fn prototype(ctx: &Ctx<'js>) -> rquickjs::Result<Option<Object<'js>>> {
        Object::new(ctx.clone()).map(Some)
    }

    fn constructor(_ctx: &Ctx<'js>) -> rquickjs::Result<Option<Constructor<'js>>> {
        Ok(None)
    }
}

/// Weak durable handle.
///
/// Does not keep its referent alive. The optional finalizer runs at most
/// once, on the next [`Environment::run_gc`](super::Environment::run_gc) or
/// job drain after the referent has been reclaimed. Finalizers still pending
/// when the environment is torn down are discarded.
pub struct WeakHandle {
    // Not a counted reference; only dereferenced while `cell.alive` holds.
    raw: qjs::JSValue,
    runtime: *mut qjs::JSRuntime,
    cell: Rc<WeakCell>,
    store: Rc<HandleStore>,
}

impl WeakHandle {
    pub fn new<'js>(scope: &Scope<'js>, target: &Object<'js>) -> BridgeResult<Self> {
        Self::attach(scope, target, None)
    }

    pub fn with_finalizer<'js, F>(scope: &Scope<'js>, target: &Object<'js>, finalizer: F) -> BridgeResult<Self>
    where
        F: FnOnce() + 'static,
    {
        Self::attach(scope, target, Some(Box::new(finalizer)))
    }

    fn attach<'js>(
        scope: &Scope<'js>,
        target: &Object<'js>,
        finalizer: Option<Box<dyn FnOnce()>>,
    ) -> BridgeResult<Self> {
        let ctx = scope.ctx();
        let store = scope.env().handles();
        if store.is_released() {
            return Err(BridgeError::EnvironmentReleased);
        }
        let cell = Rc::new(WeakCell {
            alive: Cell::new(true),
            finalizer: Cell::new(None),
            store: Rc::downgrade(store),
        });
        let guard = Class::instance(ctx.clone(), WeakGuard { cell: Rc::clone(&cell) })?;
        let stamp = store.stamp(ctx)?;
        stamp.call::<_, ()>((target.clone(), guard.into_value()))?;
        // armed only once the guard sits on the target
        cell.finalizer.set(finalizer);

        Ok(Self {
            raw: target.as_value().as_raw(),
            runtime: runtime_of(ctx),
            cell,
            store: Rc::clone(store),
        })
    }

    /// Returns the referent, or `None` once it has been collected.
    pub fn upgrade<'js>(&self, ctx: &Ctx<'js>) -> BridgeResult<Option<Value<'js>>> {
        if self.store.is_released() {
            return Err(BridgeError::EnvironmentReleased);
        }
        if runtime_of(ctx) != self.runtime {
            return Err(BridgeError::EnvironmentMismatch);
        }
        if !self.cell.alive.get() {
            return Ok(None);
        }
        // SAFETY: the guard lives in a private field of the referent and is
        // freed in the same pass as the referent, so `alive` means `raw` still
        // points at a live object of this runtime. The dup gives the new
        // transient handle its own reference.
        let value = unsafe { Value::from_raw(ctx.clone(), qjs::JS_DupValue(self.raw)) };
        Ok(Some(value))
    }

    /// True once the collector has reclaimed the referent.
    pub fn is_collected(&self) -> bool {
        !self.cell.alive.get()
    }

    /// True while a finalizer is registered and has not been queued yet.
    pub fn has_finalizer(&self) -> bool {
        let finalizer = self.cell.finalizer.take();
        let present = finalizer.is_some();
        self.cell.finalizer.set(finalizer);
        present
    }
}

fn runtime_of(ctx: &Ctx<'_>) -> *mut qjs::JSRuntime {
    unsafe { qjs::JS_GetRuntime(ctx.as_raw().as_ptr()) }
}

/// A durable handle of either strength, as stored by the aligned registry.
pub enum DurableHandle {
    Strong(Durable),
    Weak(WeakHandle),
}

impl DurableHandle {
    pub fn is_weak(&self) -> bool {
        matches!(self, DurableHandle::Weak(_))
    }

    /// `None` only for a weak handle whose referent is gone.
    pub fn to_local<'js>(&self, ctx: &Ctx<'js>) -> BridgeResult<Option<Value<'js>>> {
        match self {
            DurableHandle::Strong(handle) => handle.to_local(ctx).map(Some),
            DurableHandle::Weak(handle) => handle.upgrade(ctx),
        }
    }
}

impl From<Durable> for DurableHandle {
    fn from(handle: Durable) -> Self {
        DurableHandle::Strong(handle)
    }
}

impl From<WeakHandle> for DurableHandle {
    fn from(handle: WeakHandle) -> Self {
        DurableHandle::Weak(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Environment;

    /// An object kept alive only by a reference cycle, so plain reference
    /// counting never frees it and only a collection does.
    fn make_cyclic<'js>(scope: &Scope<'js>) -> Object<'js> {
        let object = scope.make_object().unwrap();
        object.set("me", object.clone()).unwrap();
        object
    }

    #[test]
    fn test_durable_outlives_scope() {
        let env = Environment::new().unwrap();
        let handle = env.with(|scope| {
            let object = Object::new(scope.ctx().clone()).unwrap();
            object.set("answer", 42).unwrap();
            Durable::from_object(&scope, object)
        });

        let answer = env.with(|scope| {
            let object = handle.to_object(scope.ctx()).unwrap();
            object.get::<_, i32>("answer").unwrap()
        });
        assert_eq!(answer, 42);
    }

    #[test]
    fn test_durable_type_mismatch() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let handle = Durable::new(&scope, scope.make_int(7));
            let result = handle.to_function(scope.ctx());
            assert!(matches!(
                result,
                Err(BridgeError::TypeMismatch {
                    expected: "function",
                    found: "number"
                })
            ));
        });
    }

    #[test]
    fn test_dropping_durable_unpins_value() {
        let env = Environment::new().unwrap();
        let pinned_before = env.token().handles().len();
        let handle = env.with(|scope| Durable::new(&scope, scope.make_object().unwrap().into_value()));
        let copy = handle.clone();
        assert_eq!(env.token().handles().len(), pinned_before + 1);
        drop(handle);
        assert_eq!(env.token().handles().len(), pinned_before + 1);
        drop(copy);
        assert_eq!(env.token().handles().len(), pinned_before);
    }

    #[test]
    fn test_durable_outliving_environment_reports_release() {
        let handle = {
            let env = Environment::new().unwrap();
            env.with(|scope| {
                let object = scope.make_object().unwrap();
                object.set("answer", 42).unwrap();
                Durable::from_object(&scope, object)
            })
        };
        assert!(handle.is_released());

        let other = Environment::new().unwrap();
        other.with(|scope| {
            assert!(matches!(
                handle.to_local(scope.ctx()),
                Err(BridgeError::EnvironmentReleased)
            ));
        });
        drop(other);
        drop(handle);
    }

    #[test]
    fn test_durable_used_in_foreign_environment() {
        let first = Environment::new().unwrap();
        let second = Environment::new().unwrap();
        let handle = first.with(|scope| Durable::new(&scope, scope.make_int(1)));
        second.with(|scope| {
            assert!(matches!(
                handle.to_local(scope.ctx()),
                Err(BridgeError::EnvironmentMismatch)
            ));
        });
        let value = first.with(|scope| handle.to_local(scope.ctx()).unwrap().as_int());
        assert_eq!(value, Some(1));
    }

    #[test]
    fn test_weak_handle_while_referent_is_pinned() {
        let env = Environment::new().unwrap();
        let (strong, weak) = env.with(|scope| {
            let object = make_cyclic(&scope);
            object.set("tag", "pinned").unwrap();
            let strong = Durable::from_object(&scope, object.clone());
            let weak = WeakHandle::new(&scope, &object).unwrap();
            (strong, weak)
        });

        env.run_gc();
        env.with(|scope| {
            let value = weak.upgrade(scope.ctx()).unwrap().expect("referent still pinned");
            let object = value.into_object().unwrap();
            assert_eq!(object.get::<_, String>("tag").unwrap(), "pinned");
        });
        assert!(!weak.is_collected());
        drop(strong);
    }

    #[test]
    fn test_weak_handle_finalizer_runs_after_gc() {
        let env = Environment::new().unwrap();
        let fired = Rc::new(Cell::new(0));
        let weak = env.with(|scope| {
            let object = make_cyclic(&scope);
            let counter = Rc::clone(&fired);
            WeakHandle::with_finalizer(&scope, &object, move || counter.set(counter.get() + 1)).unwrap()
        });
        assert!(weak.has_finalizer());

        env.run_gc();
        assert_eq!(fired.get(), 1);
        assert!(weak.is_collected());
        assert!(!weak.has_finalizer());
        env.with(|scope| assert!(weak.upgrade(scope.ctx()).unwrap().is_none()));

        env.run_gc();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_weak_handle_released_by_refcount() {
        let env = Environment::new().unwrap();
        let fired = Rc::new(Cell::new(false));
        let weak = env.with(|scope| {
            let object = scope.make_object().unwrap();
            let flag = Rc::clone(&fired);
            WeakHandle::with_finalizer(&scope, &object, move || flag.set(true)).unwrap()
        });
        // the referent is already gone; its finalizer waits for the next drain
        assert!(weak.is_collected());
        assert!(!fired.get());
        env.run_gc();
        assert!(fired.get());
    }

    #[test]
    fn test_several_weak_handles_on_one_frozen_target() {
        let env = Environment::new().unwrap();
        let (first, second) = env.with(|scope| {
            let object: Object = scope.eval("Object.freeze({ shown: 1 })").unwrap();
            let first = WeakHandle::new(&scope, &object).unwrap();
            let second = WeakHandle::new(&scope, &object).unwrap();

            scope.global().set("frozen", object).unwrap();
            let keys: String = scope
                .eval("JSON.stringify(Reflect.ownKeys(frozen)) + JSON.stringify(frozen)")
                .unwrap();
            assert_eq!(keys, r#"["shown"]{"shown":1}"#);
            scope.eval::<()>("delete globalThis.frozen;").unwrap();
            (first, second)
        });

        env.run_gc();
        assert!(first.is_collected());
        assert!(second.is_collected());
    }

    #[test]
    fn test_weak_handle_outliving_environment() {
        let weak = {
            let env = Environment::new().unwrap();
            let pinned = env.with(|scope| {
                let object = scope.make_object().unwrap();
                scope.global().set("kept", object.clone()).unwrap();
                WeakHandle::with_finalizer(&scope, &object, || panic!("finalizer after teardown")).unwrap()
            });
            assert!(!pinned.is_collected());
            pinned
        };
        let other = Environment::new().unwrap();
        other.with(|scope| {
            assert!(matches!(
                weak.upgrade(scope.ctx()),
                Err(BridgeError::EnvironmentReleased)
            ));
        });
    }

    #[test]
    fn test_handle_enum_strength() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let handle: DurableHandle = Durable::new(&scope, scope.make_bool(true)).into();
            assert!(!handle.is_weak());
            let value = handle.to_local(scope.ctx()).unwrap().unwrap();
            assert_eq!(value.as_bool(), Some(true));
        });
    }
}
