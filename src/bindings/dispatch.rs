//! Call and error dispatch
//!
//! Native code calls script functions through [`Scope::call`] and raises or
//! captures script errors through [`Scope::throw_error`] and
//! [`Scope::catch`]. Script code calls native code through functions built
//! with [`Scope::make_function`].

use rquickjs::function::{Constructor, Rest, This};
use rquickjs::{Ctx, Exception, Function, Object, Value};

use super::environment::{EnvToken, Scope};
use super::marshal::PropertyValue;
use crate::core::error::{BridgeError, ScriptException};

/// Native function callable from script.
///
/// An `Err` return propagates as a script exception; build one with
/// [`Scope::throw_error`] or [`BridgeError::throw`].
pub type NativeCallback = for<'js> fn(&Scope<'js>, &CallInfo<'js>) -> rquickjs::Result<Value<'js>>;

/// A native callback stored as an object property. The property name becomes
/// the function's script-visible `name`.
#[derive(Clone, Copy)]
pub struct NativeFn(pub NativeCallback);

/// Receiver and arguments of one native callback invocation.
pub struct CallInfo<'js> {
    ctx: Ctx<'js>,
    this: Value<'js>,
    args: Vec<Value<'js>>,
}

impl<'js> CallInfo<'js> {
    pub fn new(ctx: Ctx<'js>, this: Value<'js>, args: Vec<Value<'js>>) -> Self {
        Self { ctx, this, args }
    }

    pub fn this(&self) -> &Value<'js> {
        &self.this
    }

    pub fn this_object(&self) -> Option<&Object<'js>> {
        self.this.as_object()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `index`, or `undefined` when the caller passed fewer.
    pub fn arg(&self, index: usize) -> Value<'js> {
        self.args
            .get(index)
            .cloned()
            .unwrap_or_else(|| Value::new_undefined(self.ctx.clone()))
    }

    pub fn args(&self) -> &[Value<'js>] {
        &self.args
    }
}

/// Script error constructors native code can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Error = 1,
    TypeError = 2,
    RangeError = 3,
    ReferenceError = 4,
    SyntaxError = 5,
}

impl ErrorType {
    pub fn name(self) -> &'static str {
        match self {
            ErrorType::Error => "Error",
            ErrorType::TypeError => "TypeError",
            ErrorType::RangeError => "RangeError",
            ErrorType::ReferenceError => "ReferenceError",
            ErrorType::SyntaxError => "SyntaxError",
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Argument lists accepted by [`Scope::call`]: zero to three values.
pub trait CallArgs<'js>: sealed::Sealed {
    fn call_with(self, function: &Function<'js>, receiver: Value<'js>) -> rquickjs::Result<Value<'js>>;

    fn construct_with(self, constructor: &Function<'js>) -> rquickjs::Result<Value<'js>>;
}

fn as_constructor<'js>(function: &Function<'js>) -> rquickjs::Result<Constructor<'js>> {
    function.as_value().get::<Constructor<'js>>()
}

impl sealed::Sealed for () {}
impl<'js> sealed::Sealed for (Value<'js>,) {}
impl<'js> sealed::Sealed for (Value<'js>, Value<'js>) {}
impl<'js> sealed::Sealed for (Value<'js>, Value<'js>, Value<'js>) {}

impl<'js> CallArgs<'js> for () {
    fn call_with(self, function: &Function<'js>, receiver: Value<'js>) -> rquickjs::Result<Value<'js>> {
        function.call((This(receiver),))
    }

    fn construct_with(self, constructor: &Function<'js>) -> rquickjs::Result<Value<'js>> {
        as_constructor(constructor)?.construct(())
    }
}

impl<'js> CallArgs<'js> for (Value<'js>,) {
    fn call_with(self, function: &Function<'js>, receiver: Value<'js>) -> rquickjs::Result<Value<'js>> {
        function.call((This(receiver), self.0))
    }

    fn construct_with(self, constructor: &Function<'js>) -> rquickjs::Result<Value<'js>> {
        as_constructor(constructor)?.construct((self.0,))
    }
}

impl<'js> CallArgs<'js> for (Value<'js>, Value<'js>) {
    fn call_with(self, function: &Function<'js>, receiver: Value<'js>) -> rquickjs::Result<Value<'js>> {
        function.call((This(receiver), self.0, self.1))
    }

    fn construct_with(self, constructor: &Function<'js>) -> rquickjs::Result<Value<'js>> {
        as_constructor(constructor)?.construct((self.0, self.1))
    }
}

impl<'js> CallArgs<'js> for (Value<'js>, Value<'js>, Value<'js>) {
    fn call_with(self, function: &Function<'js>, receiver: Value<'js>) -> rquickjs::Result<Value<'js>> {
        function.call((This(receiver), self.0, self.1, self.2))
    }

    fn construct_with(self, constructor: &Function<'js>) -> rquickjs::Result<Value<'js>> {
        as_constructor(constructor)?.construct((self.0, self.1, self.2))
    }
}

/// A script error captured in native code.
pub enum CaughtException<'js> {
    /// The value thrown by script code.
    Thrown(Value<'js>),
    /// An engine failure with no script value attached.
    Engine(rquickjs::Error),
}

impl<'js> CaughtException<'js> {
    /// Owned copy that can outlive the scope.
    pub fn to_exception(&self) -> ScriptException {
        match self {
            CaughtException::Thrown(value) => exception_from_value(value),
            CaughtException::Engine(error) => ScriptException::new(None, error.to_string(), None),
        }
    }

    pub fn into_bridge_error(self) -> BridgeError {
        match self {
            CaughtException::Thrown(value) => BridgeError::Exception(exception_from_value(&value)),
            CaughtException::Engine(error) => BridgeError::Engine(error),
        }
    }

    pub fn value(&self) -> Option<&Value<'js>> {
        match self {
            CaughtException::Thrown(value) => Some(value),
            CaughtException::Engine(_) => None,
        }
    }
}

fn exception_from_value(value: &Value<'_>) -> ScriptException {
    if let Some(exception) = value.as_exception() {
        let message = exception.message().unwrap_or_default();
        let name = value
            .as_object()
            .and_then(|object| object.get::<_, Option<String>>("name").ok().flatten());
        return ScriptException::new(name, message, exception.stack());
    }
    let message = match value.as_string() {
        Some(text) => text.to_string().unwrap_or_default(),
        None => describe(value),
    };
    ScriptException::new(None, message, None)
}

fn describe(value: &Value<'_>) -> String {
    if let Some(flag) = value.as_bool() {
        flag.to_string()
    } else if let Some(number) = value.as_number() {
        number.to_string()
    } else if value.is_null() {
        "null".to_string()
    } else if value.is_undefined() {
        "undefined".to_string()
    } else {
        format!("[{}]", super::marshal::type_name(value))
    }
}

impl<'js> PropertyValue<'js> for NativeFn {
    fn into_property(self, scope: &Scope<'js>, name: &str) -> rquickjs::Result<Value<'js>> {
        Ok(scope.make_function(name, self.0)?.into_value())
    }
}

impl<'js> Scope<'js> {
    /// Wraps a native callback in a script function named `name`. The
    /// function captures the environment token only, never script values.
    pub fn make_function(&self, name: &str, callback: NativeCallback) -> rquickjs::Result<Function<'js>> {
        let env = self.env().clone();
        let function = Function::new(
            self.ctx().clone(),
            move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| {
                invoke(&env, ctx, this.0, args.0, callback)
            },
        )?;
        function.with_name(name)
    }

    /// Calls `function` with `receiver` as `this`. An `Err` means the call
    /// threw; the exception is pending until [`catch`](Self::catch).
    pub fn call<A: CallArgs<'js>>(
        &self,
        function: &Function<'js>,
        receiver: Value<'js>,
        args: A,
    ) -> rquickjs::Result<Value<'js>> {
        args.call_with(function, receiver)
    }

    /// Raises a script error. Return the result from the callback as its
    /// `Err` value.
    pub fn throw_error(&self, kind: ErrorType, message: &str) -> rquickjs::Error {
        let ctx = self.ctx();
        match kind {
            ErrorType::Error => Exception::throw_message(ctx, message),
            ErrorType::TypeError => Exception::throw_type(ctx, message),
            ErrorType::RangeError => Exception::throw_range(ctx, message),
            ErrorType::ReferenceError => Exception::throw_reference(ctx, message),
            ErrorType::SyntaxError => Exception::throw_syntax(ctx, message),
        }
    }

    /// Raises `error` as a script exception of the fitting kind.
    pub fn throw(&self, error: BridgeError) -> rquickjs::Error {
        error.throw(self.ctx())
    }

    /// Takes the pending exception behind `error` off the engine.
    pub fn catch(&self, error: rquickjs::Error) -> CaughtException<'js> {
        match error {
            rquickjs::Error::Exception => CaughtException::Thrown(self.ctx().catch()),
            other => CaughtException::Engine(other),
        }
    }

    /// Writes the trace of `caught` to stderr. Never rethrows.
    pub fn print_stack_trace(&self, caught: &CaughtException<'js>) {
        let exception = caught.to_exception();
        tracing::error!(target: "cyder::bindings", "{}", exception);
        eprintln!("{}", exception.trace());
    }
}

/// Runs one native callback invocation inside a fresh [`Scope`].
pub(crate) fn invoke<'js>(
    env: &EnvToken,
    ctx: Ctx<'js>,
    this: Value<'js>,
    args: Vec<Value<'js>>,
    callback: NativeCallback,
) -> rquickjs::Result<Value<'js>> {
    let scope = Scope::new(ctx.clone(), env.clone());
    let info = CallInfo::new(ctx, this, args);
    callback(&scope, &info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Environment;
    use proptest::prelude::*;

    fn count_args<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(scope.make_uint(info.len() as u32))
    }

    fn fail_with_range<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
        let message = scope.to_string(&info.arg(0));
        Err(scope.throw_error(ErrorType::RangeError, &message))
    }

    fn echo_this<'js>(_scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
        Ok(info.this().clone())
    }

    #[test]
    fn test_native_function_is_named() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let global = scope.global();
            scope.set_property(&global, "countArgs", NativeFn(count_args)).unwrap();
            let name: String = scope.eval("countArgs.name").unwrap();
            assert_eq!(name, "countArgs");
            let count: u32 = scope.eval("countArgs(1, 'two', null)").unwrap();
            assert_eq!(count, 3);
        });
    }

    #[test]
    fn test_native_throw_is_catchable() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let global = scope.global();
            scope.set_property(&global, "fail", NativeFn(fail_with_range)).unwrap();
            let caught: String = scope
                .eval("try { fail('too far'); 'no' } catch (e) { `${e instanceof RangeError}:${e.message}` }")
                .unwrap();
            assert_eq!(caught, "true:too far");
        });
    }

    #[test]
    fn test_callback_receives_receiver() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let global = scope.global();
            scope.set_property(&global, "echoThis", NativeFn(echo_this)).unwrap();
            let same: bool = scope
                .eval("var holder = { echoThis }; holder.echoThis() === holder")
                .unwrap();
            assert!(same);
        });
    }

    #[test]
    fn test_call_order_and_receiver() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let function: Function = scope
                .eval("(function (a, b, c) { return [this.tag, a, b, c].join(','); })")
                .unwrap();
            let receiver = scope.make_object().unwrap();
            receiver.set("tag", "r").unwrap();

            let result = scope
                .call(
                    &function,
                    receiver.into_value(),
                    (scope.make_int(1), scope.make_int(2), scope.make_int(3)),
                )
                .unwrap();
            assert_eq!(scope.to_string(&result), "r,1,2,3");
        });
    }

    #[test]
    fn test_call_that_throws_is_caught() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let function: Function = scope
                .eval("(function () { throw new TypeError('bad receiver'); })")
                .unwrap();
            let error = scope.call(&function, scope.make_null(), ()).unwrap_err();
            let exception = scope.catch(error).to_exception();
            assert_eq!(exception.name.as_deref(), Some("TypeError"));
            assert_eq!(exception.message, "bad receiver");
            assert!(exception.trace().starts_with("Uncaught TypeError: bad receiver"));
        });
    }

    #[test]
    fn test_thrown_primitive() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let function: Function = scope.eval("(function () { throw 'plain'; })").unwrap();
            let error = scope.call(&function, scope.make_undefined(), ()).unwrap_err();
            let caught = scope.catch(error);
            assert!(caught.value().is_some());
            let exception = caught.to_exception();
            assert_eq!(exception.name, None);
            assert_eq!(exception.trace(), "Uncaught plain");
        });
    }

    #[test]
    fn test_every_error_type() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            for kind in [
                ErrorType::Error,
                ErrorType::TypeError,
                ErrorType::RangeError,
                ErrorType::ReferenceError,
                ErrorType::SyntaxError,
            ] {
                let error = scope.throw_error(kind, "raised");
                let exception = scope.catch(error).to_exception();
                assert_eq!(exception.name.as_deref(), Some(kind.name()));
                assert_eq!(exception.message, "raised");
            }
        });
    }

    #[test]
    fn test_bridge_error_maps_to_reference_error() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let error = scope.throw(BridgeError::DetachedObject { class: "Widget" });
            let exception = scope.catch(error).to_exception();
            assert_eq!(exception.name.as_deref(), Some("ReferenceError"));
        });
    }

    #[test]
    fn test_missing_argument_is_undefined() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let info = CallInfo::new(scope.ctx().clone(), scope.make_undefined(), vec![scope.make_int(1)]);
            assert_eq!(info.arg(0).as_int(), Some(1));
            assert!(info.arg(1).is_undefined());
        });
    }

    proptest! {
        #[test]
        fn test_call_arity_and_order(a in any::<i32>(), b in any::<i32>(), c in any::<i32>(), arity in 0usize..=3) {
            let env = Environment::new().unwrap();
            let observed = env.with(|scope| {
                let function: Function = scope
                    .eval("(function () { return Array.prototype.join.call(arguments, ','); })")
                    .unwrap();
                let receiver = scope.make_null();
                let result = match arity {
                    0 => scope.call(&function, receiver, ()),
                    1 => scope.call(&function, receiver, (scope.make_int(a),)),
                    2 => scope.call(&function, receiver, (scope.make_int(a), scope.make_int(b))),
                    _ => scope.call(
                        &function,
                        receiver,
                        (scope.make_int(a), scope.make_int(b), scope.make_int(c)),
                    ),
                }
                .unwrap();
                scope.to_string(&result)
            });
            let expected = [a, b, c][..arity]
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            prop_assert_eq!(observed, expected);
        }
    }
}
