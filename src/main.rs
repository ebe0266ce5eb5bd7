use std::path::PathBuf;

/// 用法: capture-demo [配置文件路径]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("capture-tool.json"));

    capture_tool_lib::run(config_path).await
}
