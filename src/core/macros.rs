//! 核心宏定义
//!
//! 配置结构体的默认值统一通过宏声明

/// 为结构体实现Default trait的宏
///
/// 使用示例:
/// ```rust
/// use cyder::impl_default;
///
/// struct FrameLimits {
///     target_fps: u32,
///     max_frames: u64,
/// }
///
/// impl_default!(FrameLimits {
///     target_fps: 60,
///     max_frames: 0,
/// });
///
/// assert_eq!(FrameLimits::default().target_fps, 60);
/// ```
#[macro_export]
macro_rules! impl_default {
    ($struct_name:ident {
        $($field:ident: $value:expr),* $(,)?
    }) => {
        impl Default for $struct_name {
            fn default() -> Self {
                Self {
                    $($field: $value),*
                }
            }
        }
    };
}
