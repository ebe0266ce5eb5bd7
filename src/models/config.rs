// 配置模型 - 截屏工具的持久化设置

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::CaptureFlags;

/// 截屏工具设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureToolSettings {
    /// 输出目录
    pub output_dir: PathBuf,
    /// 输出文件名前缀，文件名为 `{prefix}_{序号:04}.png`
    pub file_prefix: String,
    /// 视频文件扩展名（含点）
    pub video_ext: String,
    /// 指定 ffmpeg 路径，为空时自动查找
    pub ffmpeg_path: Option<PathBuf>,
    /// 截取区域四周留白（像素）
    pub padding: f32,
    /// 视频帧率
    pub video_fps: u32,
    /// 视频质量（CRF）
    pub video_quality: u32,
    /// 新截屏请求的默认标志
    pub default_flags: CaptureFlags,
}

impl Default for CaptureToolSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output/captures"),
            file_prefix: "capture".to_string(),
            video_ext: ".mp4".to_string(),
            ffmpeg_path: None,
            padding: 10.0,
            video_fps: 30,
            video_quality: 20,
            default_flags: CaptureFlags::empty(),
        }
    }
}

impl CaptureToolSettings {
    pub const PADDING_RANGE: (f32, f32) = (0.0, 32.0);
    pub const FPS_RANGE: (u32, u32) = (1, 100);

    /// 把数值限制在截屏可接受的范围内
    ///
    /// 手动编辑的配置文件可能带有越界值，进入截屏流程前必须先修正。
    pub fn sanitized(mut self) -> Self {
        let (min_padding, max_padding) = Self::PADDING_RANGE;
        self.padding = if self.padding.is_finite() {
            self.padding.clamp(min_padding, max_padding)
        } else {
            min_padding
        };
        let (min_fps, max_fps) = Self::FPS_RANGE;
        self.video_fps = self.video_fps.clamp(min_fps, max_fps);
        self
    }
}

/// 设置的部分更新
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub output_dir: Option<PathBuf>,
    pub file_prefix: Option<String>,
    pub video_ext: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
    pub padding: Option<f32>,
    pub video_fps: Option<u32>,
    pub video_quality: Option<u32>,
    pub default_flags: Option<CaptureFlags>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_clamps_out_of_range_values() {
        let settings = CaptureToolSettings {
            padding: -5.0,
            video_fps: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(settings.padding, 0.0);
        assert_eq!(settings.video_fps, 1);

        let settings = CaptureToolSettings {
            padding: f32::NAN,
            video_fps: 240,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(settings.padding, 0.0);
        assert_eq!(settings.video_fps, 100);

        assert_eq!(CaptureToolSettings::default().sanitized(), CaptureToolSettings::default());
    }
}
