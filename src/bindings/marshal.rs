//! Value marshaling between script values and native scalars.
//!
//! Conversions from script values never fail: anything that cannot be
//! converted falls back to the type's default, and an exception raised by the
//! conversion itself (a throwing `valueOf`, a Symbol operand) is cleared.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Function, Object, Value};

use super::environment::Scope;

/// Script type name of a value, as used in mismatch diagnostics.
pub fn type_name(value: &Value<'_>) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_bool() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_symbol() {
        "symbol"
    } else if value.is_function() {
        "function"
    } else if value.is_array() {
        "array"
    } else {
        "object"
    }
}

fn clear_pending_exception(ctx: &Ctx<'_>) {
    let _ = ctx.catch();
}

/// ECMAScript `ToNumber`. Yields `NaN` for non-numeric text and `0.0` when
/// the conversion throws.
pub fn to_number<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> f64 {
    if let Some(number) = value.as_number() {
        return number;
    }
    match value.get::<Coerced<f64>>() {
        Ok(Coerced(number)) => number,
        Err(_) => {
            clear_pending_exception(ctx);
            0.0
        }
    }
}

/// ECMAScript `ToInt32` applied to an already converted number.
pub fn to_int32(number: f64) -> i32 {
    to_uint32(number) as i32
}

/// ECMAScript `ToUint32` applied to an already converted number.
pub fn to_uint32(number: f64) -> u32 {
    if !number.is_finite() {
        return 0;
    }
    let truncated = number.trunc();
    let modulo = truncated.rem_euclid(4_294_967_296.0);
    modulo as u32
}

/// Conversion between a native scalar and a script value.
pub trait Marshal<'js>: Sized {
    /// Never fails; see the module documentation for fallback rules.
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self;

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>>;
}

impl<'js> Marshal<'js> for i32 {
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self {
        match value.as_int() {
            Some(int) => int,
            None => to_int32(to_number(ctx, value)),
        }
    }

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_int(ctx.clone(), *self))
    }
}

impl<'js> Marshal<'js> for u32 {
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self {
        to_uint32(to_number(ctx, value))
    }

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match i32::try_from(*self) {
            Ok(int) => Ok(Value::new_int(ctx.clone(), int)),
            Err(_) => Ok(Value::new_float(ctx.clone(), f64::from(*self))),
        }
    }
}

/// Values beyond 2^53 lose precision on the way to the script side.
impl<'js> Marshal<'js> for i64 {
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self {
        let number = to_number(ctx, value);
        if number.is_finite() {
            number.trunc() as i64
        } else {
            0
        }
    }

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match i32::try_from(*self) {
            Ok(int) => Ok(Value::new_int(ctx.clone(), int)),
            Err(_) => Ok(Value::new_float(ctx.clone(), *self as f64)),
        }
    }
}

impl<'js> Marshal<'js> for f32 {
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self {
        to_number(ctx, value) as f32
    }

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_float(ctx.clone(), f64::from(*self)))
    }
}

impl<'js> Marshal<'js> for f64 {
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self {
        to_number(ctx, value)
    }

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_float(ctx.clone(), *self))
    }
}

impl<'js> Marshal<'js> for bool {
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self {
        if let Some(flag) = value.as_bool() {
            return flag;
        }
        match value.get::<Coerced<bool>>() {
            Ok(Coerced(flag)) => flag,
            Err(_) => {
                clear_pending_exception(ctx);
                false
            }
        }
    }

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(Value::new_bool(ctx.clone(), *self))
    }
}

impl<'js> Marshal<'js> for String {
    /// Only string values convert; anything else is `""`.
    fn to_native(ctx: &Ctx<'js>, value: &Value<'js>) -> Self {
        match value.as_string().map(|text| text.to_string()) {
            Some(Ok(text)) => text,
            Some(Err(_)) => {
                clear_pending_exception(ctx);
                String::new()
            }
            None => String::new(),
        }
    }

    fn to_script(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        rquickjs::String::from_str(ctx.clone(), self).map(|text| text.into_value())
    }
}

/// Anything that can be stored as an object property through
/// [`Scope::set_property`].
pub trait PropertyValue<'js> {
    fn into_property(self, scope: &Scope<'js>, name: &str) -> rquickjs::Result<Value<'js>>;
}

macro_rules! impl_scalar_property {
    ($($ty:ty),*) => {
        $(
            impl<'js> PropertyValue<'js> for $ty {
                fn into_property(self, scope: &Scope<'js>, _name: &str) -> rquickjs::Result<Value<'js>> {
                    self.to_script(scope.ctx())
                }
            }
        )*
    };
}

impl_scalar_property!(i32, u32, i64, f32, f64, bool, String);

impl<'js> PropertyValue<'js> for &str {
    fn into_property(self, scope: &Scope<'js>, _name: &str) -> rquickjs::Result<Value<'js>> {
        scope.make_string(self)
    }
}

impl<'js> PropertyValue<'js> for Value<'js> {
    fn into_property(self, _scope: &Scope<'js>, _name: &str) -> rquickjs::Result<Value<'js>> {
        Ok(self)
    }
}

impl<'js> PropertyValue<'js> for Object<'js> {
    fn into_property(self, _scope: &Scope<'js>, _name: &str) -> rquickjs::Result<Value<'js>> {
        Ok(self.into_value())
    }
}

impl<'js> PropertyValue<'js> for Function<'js> {
    fn into_property(self, _scope: &Scope<'js>, _name: &str) -> rquickjs::Result<Value<'js>> {
        Ok(self.into_value())
    }
}

impl<'js> Scope<'js> {
    //==================================== To Methods ====================================

    pub fn to_int(&self, value: &Value<'js>) -> i32 {
        i32::to_native(self.ctx(), value)
    }

    pub fn to_uint(&self, value: &Value<'js>) -> u32 {
        u32::to_native(self.ctx(), value)
    }

    pub fn to_float(&self, value: &Value<'js>) -> f32 {
        f32::to_native(self.ctx(), value)
    }

    pub fn to_double(&self, value: &Value<'js>) -> f64 {
        f64::to_native(self.ctx(), value)
    }

    pub fn to_bool(&self, value: &Value<'js>) -> bool {
        bool::to_native(self.ctx(), value)
    }

    pub fn to_string(&self, value: &Value<'js>) -> String {
        String::to_native(self.ctx(), value)
    }

    //==================================== Make Methods ====================================

    pub fn make_int(&self, value: i32) -> Value<'js> {
        Value::new_int(self.ctx().clone(), value)
    }

    pub fn make_uint(&self, value: u32) -> Value<'js> {
        match i32::try_from(value) {
            Ok(int) => self.make_int(int),
            Err(_) => self.make_number(f64::from(value)),
        }
    }

    pub fn make_number(&self, value: f64) -> Value<'js> {
        Value::new_float(self.ctx().clone(), value)
    }

    pub fn make_bool(&self, value: bool) -> Value<'js> {
        Value::new_bool(self.ctx().clone(), value)
    }

    /// String construction can fail (out of memory); the caller must check.
    pub fn make_string(&self, value: &str) -> rquickjs::Result<Value<'js>> {
        rquickjs::String::from_str(self.ctx().clone(), value).map(|text| text.into_value())
    }

    pub fn make_null(&self) -> Value<'js> {
        Value::new_null(self.ctx().clone())
    }

    pub fn make_undefined(&self) -> Value<'js> {
        Value::new_undefined(self.ctx().clone())
    }

    pub fn make_object(&self) -> rquickjs::Result<Object<'js>> {
        Object::new(self.ctx().clone())
    }

    //==================================== Get Methods ====================================

    /// Reads a property; an absent key (or a throwing getter) is `None`.
    pub fn get_value(&self, object: &Object<'js>, key: &str) -> Option<Value<'js>> {
        match object.get::<_, Value<'js>>(key) {
            Ok(value) if value.is_undefined() => None,
            Ok(value) => Some(value),
            Err(_) => {
                clear_pending_exception(self.ctx());
                None
            }
        }
    }

    pub fn get_object(&self, object: &Object<'js>, key: &str) -> Option<Object<'js>> {
        self.get_value(object, key).and_then(Value::into_object)
    }

    pub fn get_function(&self, object: &Object<'js>, key: &str) -> Option<Function<'js>> {
        self.get_value(object, key).and_then(Value::into_function)
    }

    pub fn get_int(&self, object: &Object<'js>, key: &str) -> i32 {
        self.get_scalar(object, key)
    }

    pub fn get_uint(&self, object: &Object<'js>, key: &str) -> u32 {
        self.get_scalar(object, key)
    }

    pub fn get_float(&self, object: &Object<'js>, key: &str) -> f32 {
        self.get_scalar(object, key)
    }

    pub fn get_double(&self, object: &Object<'js>, key: &str) -> f64 {
        self.get_scalar(object, key)
    }

    pub fn get_bool(&self, object: &Object<'js>, key: &str) -> bool {
        self.get_scalar(object, key)
    }

    pub fn get_string(&self, object: &Object<'js>, key: &str) -> String {
        self.get_scalar(object, key)
    }

    fn get_scalar<T: Marshal<'js> + Default>(&self, object: &Object<'js>, key: &str) -> T {
        match self.get_value(object, key) {
            Some(value) => T::to_native(self.ctx(), &value),
            None => T::default(),
        }
    }

    //==================================== Set Methods ====================================

    pub fn set_property<V: PropertyValue<'js>>(
        &self,
        object: &Object<'js>,
        name: &str,
        value: V,
    ) -> rquickjs::Result<()> {
        let value = value.into_property(self, name)?;
        object.set(name, value)
    }
}
