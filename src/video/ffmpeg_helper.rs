// FFmpeg辅助模块 - 查找和检测FFmpeg可执行文件

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 常见的 ffmpeg 安装路径
const COMMON_PATHS: &[&str] = &[
    "/opt/homebrew/bin/ffmpeg", // Apple Silicon Homebrew
    "/usr/local/bin/ffmpeg",    // Intel Homebrew
    "/opt/local/bin/ffmpeg",    // MacPorts
    "/usr/bin/ffmpeg",
];

/// Windows下隐藏控制台窗口
pub fn hide_console_window(command: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = command;
}

/// 执行 `-version` 验证可用
fn probe(path: &Path) -> bool {
    let mut command = std::process::Command::new(path);
    command.arg("-version");
    hide_console_window(&mut command);

    matches!(command.output(), Ok(output) if output.status.success())
}

/// 获取FFmpeg可执行文件的路径
///
/// 优先使用配置中指定的路径，其次是常见安装路径，最后是 PATH 中的 ffmpeg。
pub fn get_ffmpeg_path(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if probe(path) {
            info!("使用配置的FFmpeg: {:?}", path);
            return Ok(path.to_path_buf());
        }
        warn!("配置的FFmpeg不可用: {:?}", path);
    }

    for path_str in COMMON_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() && probe(&path) {
            info!("使用系统FFmpeg: {:?}", path);
            return Ok(path);
        }
    }

    if probe(Path::new("ffmpeg")) {
        info!("使用PATH中的FFmpeg");
        return Ok(PathBuf::from("ffmpeg"));
    }

    Err(anyhow!("未找到FFmpeg，请安装 ffmpeg 或在配置中指定 ffmpeg_path"))
}

/// 检查FFmpeg是否可用
pub async fn check_ffmpeg_available(configured: Option<PathBuf>) -> bool {
    let path = match tokio::task::spawn_blocking(move || get_ffmpeg_path(configured.as_deref()))
        .await
    {
        Ok(Ok(path)) => path,
        Ok(Err(e)) => {
            warn!("FFmpeg不可用: {}", e);
            return false;
        }
        Err(e) => {
            warn!("FFmpeg检测任务失败: {}", e);
            return false;
        }
    };

    let mut command = tokio::process::Command::new(&path);
    command.arg("-version");

    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    match command.output().await {
        Ok(output) if output.status.success() => {
            debug!("FFmpeg可用: {:?}", path);
            true
        }
        Ok(_) => {
            warn!("FFmpeg执行失败: {:?}", path);
            false
        }
        Err(e) => {
            warn!("无法执行FFmpeg: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configured_path_falls_through() {
        // 不存在的路径不会被采用，结果取决于系统是否安装了 ffmpeg
        let bogus = Path::new("/nonexistent/dir/ffmpeg");
        if let Ok(path) = get_ffmpeg_path(Some(bogus)) {
            assert_ne!(path, bogus);
        }
    }
}
