//! 核心工具函数
//!
//! 单调时钟：脚本侧 `performance.now()` 与每帧时间戳共用同一个起点

use std::time::{Duration, Instant};

/// 单调计时器
///
/// 记录创建时刻，之后的读数都是相对该时刻的毫秒数，不受系统时间调整影响。
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    origin: Instant,
}

impl Timer {
    /// 以当前时刻为起点创建计时器
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// 自起点以来经过的时间
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// 自起点以来经过的毫秒数（浮点，亚毫秒精度）
    ///
    /// # 示例
    ///
    /// ```rust
    /// use cyder::core::utils::Timer;
    ///
    /// let timer = Timer::start();
    /// assert!(timer.elapsed_ms() >= 0.0);
    /// ```
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
