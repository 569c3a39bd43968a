//! `console` 全局对象
//!
//! 各级别输出转发到 `tracing`，目标为 `script.console`。

use rquickjs::convert::Coerced;
use rquickjs::Value;

use crate::bindings::marshal::type_name;
use crate::bindings::{CallInfo, NativeFn, Scope};

/// 把参数列表格式化为一行文本，参数之间以空格分隔
pub fn format_arguments<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> String {
    info.args()
        .iter()
        .map(|value| display(scope, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn display<'js>(scope: &Scope<'js>, value: &Value<'js>) -> String {
    if value.is_string() {
        return scope.to_string(value);
    }
    match value.get::<Coerced<String>>() {
        Ok(Coerced(text)) => text,
        Err(_) => {
            let _ = scope.ctx().catch();
            format!("[{}]", type_name(value))
        }
    }
}

fn log<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    tracing::info!(target: "script.console", "{}", format_arguments(scope, info));
    Ok(scope.make_undefined())
}

fn debug<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    tracing::debug!(target: "script.console", "{}", format_arguments(scope, info));
    Ok(scope.make_undefined())
}

fn warn<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    tracing::warn!(target: "script.console", "{}", format_arguments(scope, info));
    Ok(scope.make_undefined())
}

fn error<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    tracing::error!(target: "script.console", "{}", format_arguments(scope, info));
    Ok(scope.make_undefined())
}

pub fn install(scope: &Scope<'_>) -> rquickjs::Result<()> {
    let console = scope.make_object()?;
    scope.set_property(&console, "log", NativeFn(log))?;
    scope.set_property(&console, "info", NativeFn(log))?;
    scope.set_property(&console, "debug", NativeFn(debug))?;
    scope.set_property(&console, "warn", NativeFn(warn))?;
    scope.set_property(&console, "error", NativeFn(error))?;
    scope.set_property(&scope.global(), "console", console)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::Environment;

    fn joined<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
        let text = format_arguments(scope, info);
        scope.make_string(&text)
    }

    #[test]
    fn test_console_methods_installed() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            install(&scope).unwrap();
            let result: Value = scope
                .eval("console.log('a', 1); console.info('b'); console.warn('c'); console.error('d'); console.debug('e')")
                .unwrap();
            assert!(result.is_undefined());
        });
    }

    #[test]
    fn test_argument_formatting() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let global = scope.global();
            scope.set_property(&global, "joined", NativeFn(joined)).unwrap();
            let text: String = scope
                .eval("joined('frame', 3, true, null, undefined, [1, 2])")
                .unwrap();
            assert_eq!(text, "frame 3 true null undefined 1,2");
        });
    }

    #[test]
    fn test_unprintable_argument() {
        let env = Environment::new().unwrap();
        env.with(|scope| {
            let global = scope.global();
            scope.set_property(&global, "joined", NativeFn(joined)).unwrap();
            let text: String = scope.eval("joined(Symbol('s'))").unwrap();
            assert_eq!(text, "[symbol]");
        });
    }
}
