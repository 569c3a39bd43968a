//! 帧驱动
//!
//! 启动时执行入口脚本，解析全局 `cyder.updateFrame` 并缓存到对齐注册表；
//! 之后每帧以 `null` 为接收者、毫秒时间戳为参数调用它。

use std::path::Path;

use super::install_builtins;
use crate::bindings::Environment;
use crate::core::error::{BridgeError, BridgeResult};

/// 脚本约定的全局命名空间
pub const NAMESPACE: &str = "cyder";

/// 每帧回调在命名空间上的属性名
pub const UPDATE_FRAME: &str = "updateFrame";

/// 帧驱动状态
///
/// `Uninitialized → Ready → Running → Ready | Aborted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// 入口脚本尚未就绪
    Uninitialized,
    /// 可以执行下一帧
    Ready,
    /// 正在执行帧回调
    Running,
    /// 帧回调抛出了未捕获的异常，不再执行
    Aborted,
}

/// 帧驱动
///
/// 持有脚本环境；帧回调只通过注册表索引读取，不做名称查找。
pub struct FrameDriver {
    env: Environment,
    update_index: usize,
    state: FrameState,
    frame_count: u64,
}

impl FrameDriver {
    /// 安装内置脚本接口、执行入口脚本并解析帧回调
    ///
    /// # 错误
    ///
    /// - 入口脚本无法读取：[`BridgeError::ScriptLoad`]
    /// - 入口脚本或其排队的任务抛出异常：[`BridgeError::Exception`]
    /// - 缺少 `cyder` 或 `cyder.updateFrame`：[`BridgeError::MissingBinding`]
    pub fn new<P: AsRef<Path>>(env: Environment, entry: P) -> BridgeResult<Self> {
        let entry = entry.as_ref();
        let mut state = FrameState::Uninitialized;
        tracing::debug!(target: "cyder::frame", entry = %entry.display(), ?state, "attaching entry script");

        let update_index = env.with(|scope| -> BridgeResult<usize> {
            install_builtins(&scope)?;
            scope.execute_script(entry)?;

            let namespace = scope
                .get_object(&scope.global(), NAMESPACE)
                .ok_or_else(|| BridgeError::MissingBinding(NAMESPACE.to_string()))?;
            let update = scope
                .get_function(&namespace, UPDATE_FRAME)
                .ok_or_else(|| BridgeError::MissingBinding(format!("{}.{}", NAMESPACE, UPDATE_FRAME)))?;
            Ok(scope.save_aligned_value(update.into_value()))
        })?;
        env.execute_pending_jobs()?;

        state = FrameState::Ready;
        tracing::info!(target: "cyder::frame", entry = %entry.display(), update_index, ?state, "frame driver ready");
        Ok(Self {
            env,
            update_index,
            state,
            frame_count: 0,
        })
    }

    /// 执行一帧
    ///
    /// 帧回调或本帧排队的任务抛出异常时打印调用栈、进入 [`FrameState::Aborted`]
    /// 并返回该异常；已中止的驱动返回 [`BridgeError::Aborted`]。
    pub fn try_update(&mut self) -> BridgeResult<()> {
        if self.state == FrameState::Aborted {
            return Err(BridgeError::Aborted);
        }
        self.state = FrameState::Running;

        let index = self.update_index;
        let result = self.env.with(|scope| -> BridgeResult<()> {
            let update = scope.read_aligned_function(index)?;
            let timestamp = scope.make_number(scope.env().timer().elapsed_ms());
            match scope.call(&update, scope.make_null(), (timestamp,)) {
                Ok(_) => Ok(()),
                Err(error) => {
                    let caught = scope.catch(error);
                    scope.print_stack_trace(&caught);
                    Err(caught.into_bridge_error())
                }
            }
        });
        // 任务异常已在排空时打印
        let result = result.and_then(|()| self.env.execute_pending_jobs().map(|_| ()));

        match result {
            Ok(()) => {
                self.frame_count += 1;
                self.state = FrameState::Ready;
                tracing::trace!(target: "cyder::frame", frame = self.frame_count, "frame complete");
                Ok(())
            }
            Err(error) => {
                self.state = FrameState::Aborted;
                tracing::error!(target: "cyder::frame", frame = self.frame_count, "frame aborted: {}", error);
                Err(error)
            }
        }
    }

    /// 执行一帧；失败时终止进程
    pub fn update(&mut self) {
        if self.try_update().is_err() {
            std::process::abort();
        }
    }

    /// 已成功完成的帧数
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }
}
