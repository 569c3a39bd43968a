//! Class installer
//!
//! Installs a native-backed script class from a static [`ClassDescriptor`]:
//! a constructor function, a prototype carrying accessors and methods, and
//! the constants of the class's [`WrapperTypeInfo`].

use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Function, Object, Value};

use super::dispatch::{CallArgs, CallInfo, ErrorType, NativeCallback};
use super::environment::{EnvToken, Scope};
use super::wrapper::{HostObject, WrapperTypeInfo};

/// Initializes a freshly created instance; `info.this()` is the instance.
pub type ConstructorCallback = for<'js> fn(&Scope<'js>, &CallInfo<'js>) -> rquickjs::Result<()>;

/// Reads an accessor; receives the receiver.
pub type GetterCallback = for<'js> fn(&Scope<'js>, &Value<'js>) -> rquickjs::Result<Value<'js>>;

/// Writes an accessor; receives the receiver and the assigned value.
pub type SetterCallback = for<'js> fn(&Scope<'js>, &Value<'js>, Value<'js>) -> rquickjs::Result<()>;

#[derive(Clone, Copy)]
pub struct AccessorDescriptor {
    pub name: &'static str,
    pub getter: GetterCallback,
    /// `None` makes the accessor read-only.
    pub setter: Option<SetterCallback>,
}

#[derive(Clone, Copy)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub callback: NativeCallback,
}

/// Static description of a script class backed by a native type.
pub struct ClassDescriptor {
    pub constructor: ConstructorCallback,
    pub accessors: &'static [AccessorDescriptor],
    pub methods: &'static [MethodDescriptor],
    /// Internal slots per instance; slot 0 is the native back-reference.
    pub internal_field_count: usize,
    pub type_info: Option<&'static WrapperTypeInfo>,
}

impl<'js> Scope<'js> {
    /// Builds the class described by `descriptor`, sets it on `parent` as
    /// `class_name` and returns the constructor.
    pub fn attach_class(
        &self,
        parent: &Object<'js>,
        class_name: &str,
        descriptor: &'static ClassDescriptor,
    ) -> rquickjs::Result<Function<'js>> {
        let ctx = self.ctx();
        let env = self.env().clone();
        let name = class_name.to_string();
        let constructor = Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, new_target: This<Value<'js>>, args: Rest<Value<'js>>| {
                construct(&env, ctx, new_target.0, args.0, descriptor, &name)
            },
        )?
        .with_name(class_name)?;
        constructor.set_constructor(true);

        let prototype = Object::new(ctx.clone())?;
        for accessor in descriptor.accessors {
            self.define_accessor(&prototype, accessor)?;
        }
        for method in descriptor.methods {
            let function = self.make_function(method.name, method.callback)?;
            prototype.set(method.name, function)?;
        }
        if let Some(info) = descriptor.type_info {
            info.install_constants(ctx, &prototype)?;
            info.install_constants(ctx, &constructor)?;
        }

        constructor.set("prototype", prototype.clone())?;
        prototype.set("constructor", constructor.clone())?;
        parent.set(class_name, constructor.clone())?;

        tracing::debug!(
            target: "cyder::bindings",
            class = class_name,
            accessors = descriptor.accessors.len(),
            methods = descriptor.methods.len(),
            "class attached"
        );
        Ok(constructor)
    }

    /// Constructs an instance of a class from native code.
    pub fn new_instance<A: CallArgs<'js>>(&self, constructor: &Function<'js>, args: A) -> rquickjs::Result<Object<'js>> {
        let instance = args.construct_with(constructor)?;
        match instance.into_object() {
            Some(object) => Ok(object),
            None => Err(self.throw_error(ErrorType::TypeError, "constructor did not return an object")),
        }
    }

    fn define_accessor(&self, prototype: &Object<'js>, accessor: &'static AccessorDescriptor) -> rquickjs::Result<()> {
        let ctx = self.ctx();
        let descriptor = Object::new(ctx.clone())?;

        let env = self.env().clone();
        let getter = accessor.getter;
        let get = Function::new(ctx.clone(), move |ctx: Ctx<'js>, this: This<Value<'js>>| {
            let scope = Scope::new(ctx, env.clone());
            getter(&scope, &this.0)
        })?
        .with_name(&format!("get {}", accessor.name))?;
        descriptor.set("get", get)?;

        if let Some(setter) = accessor.setter {
            let env = self.env().clone();
            let set = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| {
                    let value = args
                        .0
                        .into_iter()
                        .next()
                        .unwrap_or_else(|| Value::new_undefined(ctx.clone()));
                    let scope = Scope::new(ctx, env.clone());
                    setter(&scope, &this.0, value)
                },
            )?
            .with_name(&format!("set {}", accessor.name))?;
            descriptor.set("set", set)?;
        }
        descriptor.set("enumerable", true)?;
        descriptor.set("configurable", true)?;

        let object_class: Object<'js> = ctx.globals().get("Object")?;
        let define_property: Function<'js> = object_class.get("defineProperty")?;
        define_property.call::<_, Value<'js>>((prototype.clone(), accessor.name, descriptor))?;
        Ok(())
    }
}

/// Body of every class constructor. A constructor invoked with `new`
/// receives `new.target` as its receiver.
fn construct<'js>(
    env: &EnvToken,
    ctx: Ctx<'js>,
    new_target: Value<'js>,
    args: Vec<Value<'js>>,
    descriptor: &'static ClassDescriptor,
    class_name: &str,
) -> rquickjs::Result<Value<'js>> {
    let scope = Scope::new(ctx.clone(), env.clone());
    let Some(new_target) = new_target.into_function() else {
        let message = format!("Class constructor {} cannot be invoked without 'new'", class_name);
        return Err(scope.throw_error(ErrorType::TypeError, &message));
    };

    let instance = HostObject::instantiate(&ctx, descriptor.internal_field_count)?;
    let prototype: Option<Object<'js>> = new_target.get("prototype")?;
    if let Some(prototype) = prototype.as_ref() {
        instance.set_prototype(Some(prototype))?;
    }

    let info = CallInfo::new(ctx, instance.clone().into_value(), args);
    (descriptor.constructor)(&scope, &info)?;
    Ok(instance.into_value())
}
