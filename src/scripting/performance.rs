//! `performance` 全局对象

use rquickjs::Value;

use crate::bindings::{CallInfo, NativeFn, Scope};

/// `performance.now()`：自环境创建以来的毫秒数
fn now<'js>(scope: &Scope<'js>, _info: &CallInfo<'js>) -> rquickjs::Result<Value<'js>> {
    Ok(scope.make_number(scope.env().timer().elapsed_ms()))
}

pub fn install(scope: &Scope<'_>) -> rquickjs::Result<()> {
    let performance = scope.make_object()?;
    scope.set_property(&performance, "now", NativeFn(now))?;
    scope.set_property(&scope.global(), "performance", performance)
}
