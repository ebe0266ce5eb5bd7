use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::{CaptureToolSettings, SettingsUpdate};

pub struct SettingsManager {
    path: PathBuf,
    data: RwLock<CaptureToolSettings>,
}

impl SettingsManager {
    pub async fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }

        let initial = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                match serde_json::from_slice::<CaptureToolSettings>(&bytes) {
                    Ok(settings) => {
                        let sanitized = settings.clone().sanitized();
                        if sanitized != settings {
                            warn!("配置文件中的数值越界，已修正: {:?}", path);
                        }
                        sanitized
                    }
                    Err(e) => {
                        warn!("配置文件解析失败，使用默认配置: {}", e);
                        CaptureToolSettings::default()
                    }
                }
            }
            _ => {
                let default = CaptureToolSettings::default();
                let json = serde_json::to_string_pretty(&default)?;
                tokio::fs::write(&path, json).await?;
                info!("已创建默认配置: {:?}", path);
                default
            }
        };

        Ok(Self {
            path,
            data: RwLock::new(initial),
        })
    }

    pub async fn get(&self) -> CaptureToolSettings {
        self.data.read().await.clone()
    }

    pub async fn update(&self, update: SettingsUpdate) -> Result<CaptureToolSettings> {
        let mut config = self.data.write().await;

        if let Some(dir) = update.output_dir {
            config.output_dir = dir;
        }
        if let Some(prefix) = update.file_prefix {
            config.file_prefix = prefix;
        }
        if let Some(ext) = update.video_ext {
            config.video_ext = ext;
        }
        if let Some(path) = update.ffmpeg_path {
            config.ffmpeg_path = Some(path);
        }
        if let Some(padding) = update.padding {
            config.padding = padding;
        }
        if let Some(fps) = update.video_fps {
            config.video_fps = fps;
        }
        if let Some(quality) = update.video_quality {
            config.video_quality = quality;
        }
        if let Some(flags) = update.default_flags {
            config.default_flags = flags;
        }

        *config = config.clone().sanitized();
        self.save(&config).await?;
        Ok(config.clone())
    }

    async fn save(&self, config: &CaptureToolSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("保存配置失败: {:?}", self.path))?;
        Ok(())
    }
}
