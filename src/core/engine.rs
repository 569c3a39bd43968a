//! 宿主主入口
//!
//! 定义Engine结构和帧循环

use std::thread;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use super::error::EngineResult;
use crate::bindings::Environment;
use crate::config::{FrameConfig, HostConfig, LoggingConfig};
use crate::scripting::FrameDriver;

/// 宿主主结构
///
/// `Engine` 负责：
/// - 初始化日志
/// - 创建脚本环境并加载入口脚本
/// - 按目标帧率驱动 `cyder.updateFrame`
///
/// # 示例
///
/// ```no_run
/// use cyder::config::HostConfig;
/// use cyder::core::Engine;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     Engine::run(HostConfig::load_or_default())?;
///     Ok(())
/// }
/// ```
///
/// # 生命周期
///
/// 1. **初始化阶段**：校验配置、创建环境、执行入口脚本、解析帧回调
/// 2. **运行阶段**：逐帧调用帧回调，直到达到 `max_frames`
/// 3. **失败处理**：启动失败以错误返回；帧回调抛出未捕获异常时打印调用栈并终止进程
pub struct Engine;

impl Engine {
    /// 运行宿主
    ///
    /// # 错误
    ///
    /// 配置无效、环境创建失败或入口脚本未就绪时返回错误。
    pub fn run(config: HostConfig) -> EngineResult<()> {
        Self::initialize_logging(&config.logging);
        config.validate()?;

        let mut driver = Self::initialize_driver(&config)?;
        Self::run_frame_loop(&mut driver, &config.frame);

        tracing::info!(target: "cyder::host", frames = driver.frame_count(), "Host stopped");
        Ok(())
    }

    /// 初始化日志系统
    ///
    /// `RUST_LOG` 优先于配置文件中的级别。输出写到标准错误。
    pub fn initialize_logging(logging: &LoggingConfig) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logging.level.as_directive()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(logging.with_target)
            .with_writer(std::io::stderr)
            .try_init();
        tracing::info!(target: "cyder::host", "Host starting");
    }

    /// 创建脚本环境并附加入口脚本
    pub fn initialize_driver(config: &HostConfig) -> EngineResult<FrameDriver> {
        let env = Environment::with_config(&config.runtime)?;
        let driver = FrameDriver::new(env, &config.entry_script)?;
        Ok(driver)
    }

    /// 帧循环
    ///
    /// 每帧结束后睡眠到下一个帧间隔；`max_frames` 为 0 时一直运行。
    /// 帧回调失败时进程终止，不会返回。
    pub fn run_frame_loop(driver: &mut FrameDriver, frame: &FrameConfig) {
        let interval = frame.frame_interval();
        loop {
            let started = Instant::now();
            driver.update();

            if frame.max_frames > 0 && driver.frame_count() >= frame.max_frames {
                break;
            }
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
    }
}
