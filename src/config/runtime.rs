use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 脚本引擎运行时配置
///
/// 所有数值为 0 时表示沿用引擎默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 堆内存上限（字节）
    pub memory_limit: usize,

    /// 最大栈深度（字节）
    pub max_stack_size: usize,

    /// 触发垃圾回收的分配阈值（字节）
    pub gc_threshold: usize,
}

impl_default!(RuntimeConfig {
    memory_limit: 0,
    max_stack_size: 0,
    gc_threshold: 0,
});

impl RuntimeConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.memory_limit != 0 && self.memory_limit < 1024 * 1024 {
            return Err(ConfigError::ValidationError(
                "Memory limit must be at least 1 MiB".to_string(),
            ));
        }
        if self.max_stack_size != 0 && self.max_stack_size < 64 * 1024 {
            return Err(ConfigError::ValidationError(
                "Max stack size must be at least 64 KiB".to_string(),
            ));
        }
        Ok(())
    }
}
