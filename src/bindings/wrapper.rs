//! Object wrapper protocol
//!
//! A native value is exposed to scripts by binding it to a script object that
//! carries internal slots. Slot 0 holds the back-reference to the native
//! value; recovering the native side from the script object is a slot read
//! followed by a checked downcast.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rquickjs::class::{Class, ClassId, JsClass, Trace, Tracer, Writable};
use rquickjs::function::Constructor;
use rquickjs::{Ctx, Object, Value};

use super::environment::Scope;
use super::handle::Ownership;
use crate::core::error::{BridgeError, BridgeResult};

/// Slot index reserved for the native back-reference.
pub const BACK_REFERENCE_SLOT: usize = 0;

enum NativeRef {
    Strong(Rc<dyn Any>),
    Weak(Weak<dyn Any>),
}

/// One occupied internal slot.
pub struct NativeSlot {
    target: NativeRef,
    type_id: TypeId,
    type_name: &'static str,
    ownership: Ownership,
}

impl NativeSlot {
    fn new<T: Any>(native: Rc<RefCell<T>>, ownership: Ownership) -> Self {
        let native: Rc<dyn Any> = native;
        let target = match ownership {
            Ownership::Owned | Ownership::BorrowedStrong => NativeRef::Strong(native),
            Ownership::BorrowedWeak => NativeRef::Weak(Rc::downgrade(&native)),
        };
        Self {
            target,
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            ownership,
        }
    }

    fn upgrade(&self) -> Option<Rc<dyn Any>> {
        match &self.target {
            NativeRef::Strong(native) => Some(Rc::clone(native)),
            NativeRef::Weak(native) => native.upgrade(),
        }
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_alive(&self) -> bool {
        match &self.target {
            NativeRef::Strong(_) => true,
            NativeRef::Weak(native) => native.strong_count() > 0,
        }
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    match path.rfind("::") {
        Some(position) => &full[position + 2..],
        None => full,
    }
}

/// Engine class backing every wrapper object.
///
/// The collector drops the slots together with the script object, which
/// releases `Owned` and `BorrowedStrong` natives.
pub struct HostObject {
    slots: Vec<Option<NativeSlot>>,
}

impl HostObject {
    fn with_slots(count: usize) -> Self {
        let mut slots = Vec::with_capacity(count.max(1));
        slots.resize_with(count.max(1), || None);
        Self { slots }
    }

    /// Creates a script object with `max(slot_count, 1)` internal slots.
    pub fn instantiate<'js>(ctx: &Ctx<'js>, slot_count: usize) -> rquickjs::Result<Object<'js>> {
        Ok(Class::instance(ctx.clone(), Self::with_slots(slot_count))?.into_inner())
    }

    /// Binds `native` to slot 0 of `object`.
    pub fn bind<T: Any>(object: &Object<'_>, native: Rc<RefCell<T>>, ownership: Ownership) -> BridgeResult<()> {
        Self::set_slot(object, BACK_REFERENCE_SLOT, native, ownership)
    }

    /// Moves `value` into a fresh `Rc` owned by the script object and returns
    /// a handle to it.
    pub fn wrap<T: Any>(object: &Object<'_>, value: T) -> BridgeResult<Rc<RefCell<T>>> {
        let native = Rc::new(RefCell::new(value));
        Self::bind(object, Rc::clone(&native), Ownership::Owned)?;
        Ok(native)
    }

    /// Recovers the native value bound to `object`.
    pub fn unwrap<T: Any>(object: &Object<'_>) -> BridgeResult<Rc<RefCell<T>>> {
        Self::slot::<T>(object, BACK_REFERENCE_SLOT)
    }

    /// Native-initiated destruction: clears the back-reference so later
    /// unwraps fail with [`BridgeError::DetachedObject`].
    pub fn detach(object: &Object<'_>) -> BridgeResult<()> {
        let class = Self::downcast(object)?;
        let mut host = class.borrow_mut();
        host.slots[BACK_REFERENCE_SLOT] = None;
        tracing::trace!(target: "cyder::bindings", "wrapper detached");
        Ok(())
    }

    pub fn is_wrapper(value: &Value<'_>) -> bool {
        value.get::<Class<HostObject>>().is_ok()
    }

    pub fn internal_field_count(object: &Object<'_>) -> BridgeResult<usize> {
        Ok(Self::downcast(object)?.borrow().slots.len())
    }

    pub fn set_internal_field<T: Any>(
        object: &Object<'_>,
        index: usize,
        native: Rc<RefCell<T>>,
    ) -> BridgeResult<()> {
        Self::set_slot(object, index, native, Ownership::BorrowedStrong)
    }

    pub fn internal_field<T: Any>(object: &Object<'_>, index: usize) -> BridgeResult<Rc<RefCell<T>>> {
        Self::slot::<T>(object, index)
    }

    /// Ownership and liveness of the back-reference, if one is bound.
    pub fn back_reference(object: &Object<'_>) -> BridgeResult<Option<(Ownership, bool)>> {
        let class = Self::downcast(object)?;
        let host = class.borrow();
        Ok(host.slots[BACK_REFERENCE_SLOT]
            .as_ref()
            .map(|slot| (slot.ownership(), slot.is_alive())))
    }

    fn downcast<'js>(object: &Object<'js>) -> BridgeResult<Class<'js, HostObject>> {
        object
            .as_value()
            .get::<Class<'js, HostObject>>()
            .map_err(|_| BridgeError::NotAWrapper)
    }

    fn set_slot<T: Any>(
        object: &Object<'_>,
        index: usize,
        native: Rc<RefCell<T>>,
        ownership: Ownership,
    ) -> BridgeResult<()> {
        let class = Self::downcast(object)?;
        let mut host = class.borrow_mut();
        let count = host.slots.len();
        let slot = host
            .slots
            .get_mut(index)
            .ok_or(BridgeError::InvalidInternalField { index, count })?;
        *slot = Some(NativeSlot::new(native, ownership));
        Ok(())
    }

    fn slot<T: Any>(object: &Object<'_>, index: usize) -> BridgeResult<Rc<RefCell<T>>> {
        let class = Self::downcast(object)?;
        let host = class.borrow();
        let count = host.slots.len();
        let slot = host
            .slots
            .get(index)
            .ok_or(BridgeError::InvalidInternalField { index, count })?;
        let detached = BridgeError::DetachedObject {
            class: short_type_name::<T>(),
        };
        let slot = slot.as_ref().ok_or(detached)?;
        if slot.type_id != TypeId::of::<T>() {
            return Err(BridgeError::TypeMismatch {
                expected: short_type_name::<T>(),
                found: slot.type_name,
            });
        }
        let native = slot.upgrade().ok_or(BridgeError::DetachedObject {
            class: slot.type_name,
        })?;
        native
            .downcast::<RefCell<T>>()
            .map_err(|_| BridgeError::TypeMismatch {
                expected: short_type_name::<T>(),
                found: slot.type_name,
            })
    }
}

impl<'js> Trace<'js> for HostObject {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

impl<'js> JsClass<'js> for HostObject {
    const NAME: &'static str = "HostObject";

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

/// A constant exported on a wrapped class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Number(f64),
    Int(i32),
    Text(&'static str),
}

impl ConstantValue {
    /// Produces the script value. Evaluated lazily, once per installation.
    pub fn export<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match *self {
            ConstantValue::Number(number) => Ok(Value::new_float(ctx.clone(), number)),
            ConstantValue::Int(int) => Ok(Value::new_int(ctx.clone(), int)),
            ConstantValue::Text(text) => {
                rquickjs::String::from_str(ctx.clone(), text).map(|text| text.into_value())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantDescriptor {
    pub name: &'static str,
    pub value: ConstantValue,
}

/// Per-type wrapper metadata: class name and exported constants.
#[derive(Debug)]
pub struct WrapperTypeInfo {
    pub class_name: &'static str,
    pub constants: &'static [ConstantDescriptor],
}

impl WrapperTypeInfo {
    pub const fn new(class_name: &'static str, constants: &'static [ConstantDescriptor]) -> Self {
        Self {
            class_name,
            constants,
        }
    }

    /// Defines every constant on `target`.
    pub fn install_constants<'js>(&self, ctx: &Ctx<'js>, target: &Object<'js>) -> rquickjs::Result<()> {
        for constant in self.constants {
            target.set(constant.name, constant.value.export(ctx)?)?;
        }
        Ok(())
    }
}

impl<'js> Scope<'js> {
    /// Recovers the native value behind `object`. Inside a callback, turn the
    /// error into a script exception with [`BridgeError::throw`].
    pub fn unwrap<T: Any>(&self, object: &Object<'js>) -> BridgeResult<Rc<RefCell<T>>> {
        HostObject::unwrap::<T>(object)
    }

    /// Same as [`unwrap`](Self::unwrap), for the receiver of a callback.
    pub fn unwrap_value<T: Any>(&self, value: &Value<'js>) -> BridgeResult<Rc<RefCell<T>>> {
        let object = value.as_object().ok_or(BridgeError::NotAWrapper)?;
        HostObject::unwrap::<T>(object)
    }

    /// Unwraps a callback receiver, raising the failure as a script
    /// exception.
    pub fn unwrap_this<T: Any>(&self, this: &Value<'js>) -> rquickjs::Result<Rc<RefCell<T>>> {
        self.unwrap_value::<T>(this).map_err(|error| error.throw(self.ctx()))
    }

    pub fn bind<T: Any>(&self, object: &Object<'js>, native: Rc<RefCell<T>>, ownership: Ownership) -> BridgeResult<()> {
        HostObject::bind(object, native, ownership)
    }

    pub fn detach(&self, object: &Object<'js>) -> BridgeResult<()> {
        HostObject::detach(object)
    }
}
