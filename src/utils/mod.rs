//! 工具函数模块
//!
//! 目前只有文件系统操作：输出目录创建、打开文件/文件夹、日志目录定位

pub mod file_system;

pub use file_system::*;
