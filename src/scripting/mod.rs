//! 脚本运行时模块
//!
//! - `frame_driver` - 入口脚本加载与逐帧调用
//! - `performance` / `application` / `console` - 入口脚本执行前安装的内置全局对象

pub mod application;
pub mod console;
pub mod frame_driver;
pub mod performance;

pub use frame_driver::{FrameDriver, FrameState, NAMESPACE, UPDATE_FRAME};

use crate::bindings::Scope;

/// 在全局对象上安装内置脚本接口
pub fn install_builtins(scope: &Scope<'_>) -> rquickjs::Result<()> {
    performance::install(scope)?;
    application::install(scope)?;
    console::install(scope)?;
    tracing::debug!(target: "cyder::bindings", "builtins installed");
    Ok(())
}
