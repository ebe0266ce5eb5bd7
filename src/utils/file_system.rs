//! 文件系统操作工具
//!
//! 提供输出目录创建、跨平台打开文件/文件夹、日志目录定位等功能

use std::path::{Path, PathBuf};
use tracing::info;

/// 为输出文件创建完整的上级目录链
pub fn create_parent_dirs(file: &Path) -> Result<(), String> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| format!("无法为文件 {:?} 创建目录: {}", file, e)),
        _ => Ok(()),
    }
}

/// 用系统默认程序打开文件或文件夹
///
/// 根据不同操作系统使用对应的命令：
/// - Windows: explorer
/// - macOS: open
/// - Linux: xdg-open
pub fn open_in_shell(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("路径不存在: {:?}", path));
    }

    let program = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    info!("打开: {:?}", path);
    std::process::Command::new(program)
        .arg(path)
        .spawn()
        .map_err(|e| format!("无法打开 {:?}: {}", path, e))?;

    Ok(())
}

/// 在系统文件管理器中打开文件夹，不存在时先创建
pub fn open_folder_in_explorer(path: &Path) -> Result<(), String> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| format!("创建目录失败: {}", e))?;
    }

    open_in_shell(path)
}

/// 获取日志目录路径（跨平台）
///
/// - macOS: ~/Library/Logs/capture-tool
/// - Windows: %APPDATA%/capture-tool/logs
/// - Linux: ~/.local/share/capture-tool/logs
pub fn get_log_dir() -> PathBuf {
    if cfg!(target_os = "macos") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join("Library/Logs/capture-tool")
    } else if cfg!(target_os = "windows") {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("capture-tool").join("logs")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".local/share/capture-tool/logs")
    }
}
