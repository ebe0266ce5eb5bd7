// 数据模型模块 - 定义截屏请求、窗口快照与状态类型

pub mod config;
pub mod geometry;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::capture::ImageBuffer;

pub use config::{CaptureToolSettings, SettingsUpdate};
pub use geometry::{Rect, Vec2};

/// 宿主GUI中窗口的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u32);

/// 视口ID（目前只有主视口 0）
pub type ViewportId = u32;

/// 主视口
pub const MAIN_VIEWPORT: ViewportId = 0;

bitflags! {
    /// 窗口类型标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowFlags: u8 {
        /// 子窗口，由父窗口一同绘制
        const CHILD = 1 << 0;
        const POPUP = 1 << 1;
        const TOOLTIP = 1 << 2;
    }
}

bitflags! {
    /// 截屏标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CaptureFlags: u32 {
        /// 拉伸窗口到完整内容高度，分块截取后拼接（仅限单窗口）
        const STITCH_ALL = 1 << 0;
        /// 不隐藏目标以外的窗口
        const INCLUDE_OTHER_WINDOWS = 1 << 1;
        /// 截取范围包含工具提示和弹出窗口
        const INCLUDE_TOOLTIPS_AND_POPUPS = 1 << 2;
        /// 截屏期间隐藏软件鼠标光标
        const HIDE_MOUSE_CURSOR = 1 << 3;
        /// 不保存文件（不写图片，也不写视频帧）
        const NO_SAVE = 1 << 4;
        /// 单帧完成截取，只能用于显式矩形
        const INSTANT = 1 << 5;
    }
}

/// 某一帧中窗口的快照
#[derive(Debug, Clone, PartialEq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub name: String,
    pub flags: WindowFlags,
    /// 父窗口，顶层窗口为 None
    pub parent: Option<WindowId>,
    pub pos: Vec2,
    pub size: Vec2,
    /// 完整显示全部内容所需的窗口高度（含标题栏、菜单栏、内边距和边框）
    pub content_full_height: f32,
    pub scroll: Vec2,
    /// 本帧或上一帧处于活动状态
    pub active: bool,
    pub hidden: bool,
}

impl WindowInfo {
    pub fn rect(&self) -> Rect {
        Rect::from_pos_size(self.pos, self.size)
    }

    pub fn is_popup_or_tooltip(&self) -> bool {
        self.flags.intersects(WindowFlags::POPUP | WindowFlags::TOOLTIP)
    }
}

/// 样式中影响窗口可摆放范围的两个内边距
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StylePadding {
    pub display_window_padding: Vec2,
    pub display_safe_area_padding: Vec2,
}

impl StylePadding {
    /// 全部为 0，允许窗口完全移出可见视口
    pub const NONE: Self = Self {
        display_window_padding: Vec2::ZERO,
        display_safe_area_padding: Vec2::ZERO,
    };
}

/// 每次调用 `capture_update` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    InProgress,
    Done,
    Error,
}

impl CaptureStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// 截屏请求
///
/// 调用方持有，截屏过程中会被上下文修改（补全目标窗口、写入输出尺寸）。
/// 一次截屏的每一帧都必须传入同一个请求。
#[derive(Debug, Clone)]
pub struct CaptureArgs {
    id: Uuid,
    /// 目标窗口，空表示整个视口
    pub windows: Vec<WindowId>,
    /// 显式截取矩形（屏幕绝对坐标）
    pub capture_rect: Option<Rect>,
    pub flags: CaptureFlags,
    /// 截取区域四周额外留白
    pub padding: f32,
    /// 输出宽高对齐到该值的倍数，0 表示自动（视频：gif 为 1，其它为 2）
    pub size_align: u32,
    pub record_fps_target: u32,
    /// 视频编码质量（CRF，越小越好）
    pub record_quality: u32,
    /// 调用方提供的输出缓冲区，设置后不会写文件
    pub output_buffer: Option<ImageBuffer>,
    pub output_file: Option<PathBuf>,
    /// 输出：最终图像尺寸
    pub out_image_size: Vec2,
    /// 输出：锁定后的截取矩形
    pub out_capture_rect: Rect,
}

impl Default for CaptureArgs {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            windows: Vec::new(),
            capture_rect: None,
            flags: CaptureFlags::empty(),
            padding: 10.0,
            size_align: 0,
            record_fps_target: 30,
            record_quality: 20,
            output_buffer: None,
            output_file: None,
            out_image_size: Vec2::ZERO,
            out_capture_rect: Rect::INVERTED,
        }
    }
}

impl CaptureArgs {
    /// 截取指定窗口并保存到文件
    pub fn for_windows(windows: Vec<WindowId>, output_file: impl Into<PathBuf>) -> Self {
        Self {
            windows,
            output_file: Some(output_file.into()),
            ..Default::default()
        }
    }

    /// 按工具设置生成默认请求（标志、留白、帧率和质量）
    pub fn from_settings(settings: &CaptureToolSettings) -> Self {
        Self {
            flags: settings.default_flags,
            padding: settings.padding,
            record_fps_target: settings.video_fps,
            record_quality: settings.video_quality,
            ..Default::default()
        }
    }

    /// 截取显式矩形到调用方缓冲区
    pub fn for_rect_into_buffer(rect: Rect) -> Self {
        Self {
            capture_rect: Some(rect),
            output_buffer: Some(ImageBuffer::default()),
            ..Default::default()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 显式矩形且宽高为正
    pub fn is_capturing_explicit_rect(&self) -> bool {
        self.capture_rect.map(|r| r.has_area()).unwrap_or(false)
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn has_output(&self) -> bool {
        self.output_buffer.is_some()
            || self
                .output_file
                .as_ref()
                .map(|p| !p.as_os_str().is_empty())
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_args_default() {
        let args = CaptureArgs::default();
        assert_eq!(args.record_fps_target, 30);
        assert_eq!(args.size_align, 0);
        assert!(!args.has_output());
        assert!(!args.is_capturing_explicit_rect());
    }

    #[test]
    fn test_explicit_rect_requires_area() {
        let mut args = CaptureArgs::for_rect_into_buffer(Rect::new(Vec2::ZERO, Vec2::new(0.0, 10.0)));
        assert!(!args.is_capturing_explicit_rect());
        assert!(args.has_output());

        args.capture_rect = Some(Rect::new(Vec2::ZERO, Vec2::new(5.0, 10.0)));
        assert!(args.is_capturing_explicit_rect());
    }

    #[test]
    fn test_capture_flags_serde() {
        let flags = CaptureFlags::STITCH_ALL | CaptureFlags::HIDE_MOUSE_CURSOR;
        let json = serde_json::to_string(&flags).unwrap();
        let back: CaptureFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!CaptureStatus::InProgress.is_terminal());
        assert!(CaptureStatus::Done.is_terminal());
        assert!(CaptureStatus::Error.is_terminal());
    }
}
