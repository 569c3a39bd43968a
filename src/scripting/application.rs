//! `nativeApplication` 全局对象
//!
//! 提供进程标准输出与标准错误的原始写入，不追加换行。

use std::io::{self, Write};

use rquickjs::Value;

use crate::bindings::{CallInfo, NativeFn, Scope};

fn write_to<'js, W: Write>(mut stream: W, scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    let text = scope.to_string(&info.arg(0));
    // 写入失败不影响脚本执行
    if let Err(error) = stream.write_all(text.as_bytes()).and_then(|_| stream.flush()) {
        tracing::warn!(target: "cyder::host", "stream write failed: {}", error);
    }
    Ok(scope.make_undefined())
}

fn stdout_write<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    write_to(io::stdout().lock(), scope, info)
}

fn stderr_write<'js>(scope: &Scope<'js>, info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    write_to(io::stderr().lock(), scope, info)
}

pub fn install(scope: &Scope<'_>) -> rquickjs::Result<()> {
    let application = scope.make_object()?;

    let standard_output = scope.make_object()?;
    scope.set_property(&standard_output, "write", NativeFn(stdout_write))?;
    scope.set_property(&application, "standardOutput", standard_output)?;

    let standard_error = scope.make_object()?;
    scope.set_property(&standard_error, "write", NativeFn(stderr_write))?;
    scope.set_property(&application, "standardError", standard_error)?;

    scope.set_property(&scope.global(), "nativeApplication", application)
}
