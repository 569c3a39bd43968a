//! 核心模块
//!
//! 包含宿主的核心功能：
//! - `engine` - 宿主入口和帧循环
//! - `error` - 错误类型定义
//! - `utils` - 单调时钟

pub mod engine;
pub mod error;
pub mod utils;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{BridgeError, BridgeResult, EngineError, EngineResult, ScriptException};

// 重新导出主要类型
pub use engine::Engine;
pub use utils::Timer;
