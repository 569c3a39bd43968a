//! 统一错误处理模块
//!
//! 提供宿主与绑定层的错误类型定义
//!
//! ## 错误类型分层
//!
//! - **绑定层错误** (`BridgeError`): 环境、句柄、包装对象、类安装与帧驱动产生的错误
//! - **宿主层错误** (`EngineError`): 可执行程序启动与运行阶段的错误
//!
//! 回调内部的 `BridgeError` 通过 [`BridgeError::throw`] 转换为脚本异常，
//! 绝不静默吞掉。

use std::fmt;
use std::path::PathBuf;

use rquickjs::{Ctx, Exception};
use thiserror::Error;

use crate::config::ConfigError;

/// 已捕获脚本异常的自有副本
///
/// 可以离开创建它的句柄作用域继续存在，用于启动失败报告与帧失败报告。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptException {
    /// 错误类名，例如 `TypeError`；抛出的不是错误对象时为 `None`
    pub name: Option<String>,
    /// 错误消息
    pub message: String,
    /// 引擎提供的调用栈文本
    pub stack: Option<String>,
}

impl ScriptException {
    pub fn new(name: Option<String>, message: impl Into<String>, stack: Option<String>) -> Self {
        Self {
            name,
            message: message.into(),
            stack,
        }
    }

    /// 渲染为诊断输出格式：`Uncaught <Name>: <message>` 后接调用栈
    pub fn trace(&self) -> String {
        let mut text = format!("Uncaught {}", self);
        if let Some(stack) = self.stack.as_deref() {
            let stack = stack.trim_end();
            if !stack.is_empty() {
                text.push('\n');
                text.push_str(stack);
            }
        }
        text
    }
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => write!(f, "{}: {}", name, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ScriptException {}

/// 绑定层错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Script engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("Failed to load script {path}: {source}")]
    ScriptLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script exception: {0}")]
    Exception(#[from] ScriptException),

    #[error("Missing script binding: {0}")]
    MissingBinding(String),

    #[error("Aligned registry index {index} out of range (registered: {len})")]
    RegistryIndexOutOfRange { index: usize, len: usize },

    #[error("Aligned registry entry {index} refers to a collected value")]
    RegistryCollected { index: usize },

    #[error("Durable handle outlived the environment that created it")]
    EnvironmentReleased,

    #[error("Durable handle belongs to a different environment")]
    EnvironmentMismatch,

    #[error("Object is not backed by a native wrapper")]
    NotAWrapper,

    #[error("Native object of {class} has been destroyed or detached")]
    DetachedObject { class: &'static str },

    #[error("Native object type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Internal field {index} out of range (field count: {count})")]
    InvalidInternalField { index: usize, count: usize },

    #[error("Frame driver aborted after an uncaught exception")]
    Aborted,
}

impl BridgeError {
    /// 在原生回调中把错误抛给脚本
    ///
    /// 返回的 `rquickjs::Error` 应直接作为回调的 `Err` 返回。
    pub fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        let message = self.to_string();
        match self {
            // 异常已经挂起在引擎上，原样传递
            BridgeError::Engine(error) => error,
            BridgeError::DetachedObject { .. } | BridgeError::EnvironmentReleased => {
                Exception::throw_reference(ctx, &message)
            }
            BridgeError::NotAWrapper | BridgeError::TypeMismatch { .. } => {
                Exception::throw_type(ctx, &message)
            }
            BridgeError::RegistryIndexOutOfRange { .. }
            | BridgeError::InvalidInternalField { .. } => Exception::throw_range(ctx, &message),
            _ => Exception::throw_message(ctx, &message),
        }
    }
}

/// 宿主错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rquickjs::Error> for EngineError {
    fn from(error: rquickjs::Error) -> Self {
        EngineError::Bridge(BridgeError::Engine(error))
    }
}

/// 结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
pub type EngineResult<T> = Result<T, EngineError>;
