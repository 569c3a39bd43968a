use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 帧循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// 目标帧率
    pub target_fps: u32,

    /// 运行的最大帧数，0 表示一直运行
    pub max_frames: u64,
}

impl_default!(FrameConfig {
    target_fps: 60,
    max_frames: 0,
});

impl FrameConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.target_fps == 0 || self.target_fps > 1000 {
            return Err(ConfigError::ValidationError(
                "Invalid target FPS".to_string(),
            ));
        }
        Ok(())
    }

    /// 每帧的目标时长
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        let config = FrameConfig {
            target_fps: 50,
            max_frames: 0,
        };
        assert_eq!(config.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_fps() {
        let config = FrameConfig {
            target_fps: 0,
            max_frames: 0,
        };
        assert!(config.validate().is_err());
    }
}
