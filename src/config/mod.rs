/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量覆盖和命令行覆盖
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod frame;
pub mod runtime;

pub use frame::FrameConfig;
pub use runtime::RuntimeConfig;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 宿主主配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// 入口脚本路径
    pub entry_script: PathBuf,

    /// 帧循环配置
    pub frame: FrameConfig,

    /// 脚本引擎运行时配置
    pub runtime: RuntimeConfig,

    /// 日志配置
    pub logging: LoggingConfig,
}

use crate::impl_default;

impl_default!(HostConfig {
    entry_script: PathBuf::from("main.js"),
    frame: FrameConfig::default(),
    runtime: RuntimeConfig::default(),
    logging: LoggingConfig::default(),
});

impl HostConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 按扩展名加载配置文件（`.json` 走JSON，其余走TOML）
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CYDER_ENTRY") {
            if !val.is_empty() {
                self.entry_script = PathBuf::from(val);
            }
        }
        if let Ok(val) = env::var("CYDER_TARGET_FPS") {
            if let Ok(fps) = val.parse() {
                self.frame.target_fps = fps;
            }
        }
        if let Ok(val) = env::var("CYDER_MAX_FRAMES") {
            if let Ok(frames) = val.parse() {
                self.frame.max_frames = frames;
            }
        }
        if let Ok(val) = env::var("CYDER_MEMORY_LIMIT") {
            if let Ok(limit) = val.parse() {
                self.runtime.memory_limit = limit;
            }
        }
        if let Ok(val) = env::var("CYDER_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.entry_script.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "Entry script path is empty".to_string(),
            ));
        }
        self.frame.validate()?;
        self.runtime.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./cyder.toml
    /// 2. ./cyder.json
    /// 3. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file("cyder.toml") {
            tracing::info!(target: "cyder::host", "Loaded config from cyder.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("cyder.json") {
            tracing::info!(target: "cyder::host", "Loaded config from cyder.json");
            return config;
        }

        Self::default()
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出日志目标
    pub with_target: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    with_target: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// 从字符串解析（大小写不敏感）
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// `EnvFilter` 指令
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame.target_fps, 60);
    }

    #[test]
    fn test_toml_partial_config() {
        let config = HostConfig::from_toml_str(
            r#"
entry_script = "game/main.js"

[frame]
max_frames = 10

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.entry_script, PathBuf::from("game/main.js"));
        assert_eq!(config.frame.max_frames, 10);
        assert_eq!(config.frame.target_fps, 60);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_toml_serialization() {
        let config = HostConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = HostConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config.entry_script, parsed.entry_script);
        assert_eq!(config.frame.target_fps, parsed.frame.target_fps);
    }

    #[test]
    fn test_json_config() {
        let config =
            HostConfig::from_json_str(r#"{ "runtime": { "memory_limit": 33554432 } }"#).unwrap();
        assert_eq!(config.runtime.memory_limit, 32 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cyder.toml");
        let mut config = HostConfig::default();
        config.frame.max_frames = 3;
        config.save_toml(&path).unwrap();

        let loaded = HostConfig::from_file(&path).unwrap();
        assert_eq!(loaded.frame.max_frames, 3);
    }

    #[test]
    fn test_invalid_memory_limit() {
        let mut config = HostConfig::default();
        config.runtime.memory_limit = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
    }
}
