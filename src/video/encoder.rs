// FFmpeg编码器 - 通过标准输入管道把原始 RGBA 帧送入 ffmpeg 进程

use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use tracing::{debug, info, warn};

use super::ffmpeg_helper::hide_console_window;
use super::{FrameSink, VideoParams};

/// 外部 ffmpeg 进程作为帧接收端
pub struct FfmpegSink {
    ffmpeg_path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames_written: u64,
}

impl FfmpegSink {
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            child: None,
            stdin: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// 构建FFmpeg命令
    pub fn build_command(&self, params: &VideoParams) -> Command {
        let mut command = Command::new(&self.ffmpeg_path);

        // 输入：标准输入上的原始 RGBA
        command
            .arg("-r")
            .arg(params.fps.to_string())
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgba")
            .arg("-s")
            .arg(format!("{}x{}", params.width, params.height))
            .arg("-i")
            .arg("-");

        // 编码参数
        command
            .arg("-threads")
            .arg("0")
            .arg("-vsync")
            .arg("0")
            .arg("-preset")
            .arg("ultrafast")
            .arg("-y") // 覆盖输出文件
            .arg("-pix_fmt")
            .arg("yuv420p") // 兼容性
            .arg("-crf")
            .arg(params.quality.to_string())
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg(&params.output_path);

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        hide_console_window(&mut command);

        command
    }
}

impl FrameSink for FfmpegSink {
    fn start(&mut self, params: &VideoParams) -> Result<()> {
        if self.child.is_some() {
            return Err(anyhow!("FFmpeg进程已在运行"));
        }

        let mut command = self.build_command(params);
        debug!("FFmpeg命令: {:?}", command);

        let mut child = command
            .spawn()
            .with_context(|| format!("启动FFmpeg失败: {:?}", self.ffmpeg_path))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("无法获取FFmpeg标准输入"))?;

        info!(
            "开始录制视频: {:?} ({}x{} @ {}fps)",
            params.output_path, params.width, params.height, params.fps
        );

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.frames_written = 0;
        Ok(())
    }

    fn push_frame(&mut self, rgba: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("FFmpeg进程未启动"))?;

        stdin.write_all(rgba).context("写入视频帧失败")?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // 关闭标准输入，ffmpeg 收到 EOF 后写完文件退出
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait().context("等待FFmpeg退出失败")?;
        if !status.success() {
            warn!("FFmpeg异常退出: {}", status);
            return Err(anyhow!("FFmpeg异常退出: {}", status));
        }

        info!("视频录制完成，共 {} 帧", self.frames_written);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.finish() {
                warn!("关闭FFmpeg失败: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_arguments() {
        let sink = FfmpegSink::new(PathBuf::from("ffmpeg"));
        let params = VideoParams {
            width: 640,
            height: 480,
            fps: 30,
            quality: 20,
            output_path: PathBuf::from("out/capture.mp4"),
        };

        let command = sink.build_command(&params);
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(command.get_program(), "ffmpeg");
        assert_eq!(&args[..10], &["-r", "30", "-f", "rawvideo", "-pix_fmt", "rgba", "-s", "640x480", "-i", "-"]);
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "20");
        assert_eq!(args.last().unwrap(), "out/capture.mp4");
    }

    #[test]
    fn test_push_before_start_fails() {
        let mut sink = FfmpegSink::new(PathBuf::from("ffmpeg"));
        assert!(!sink.is_started());
        assert!(sink.push_frame(&[0u8; 4]).is_err());
        assert!(sink.finish().is_ok());
    }

    #[test]
    fn test_spawn_failure_is_error() {
        let mut sink = FfmpegSink::new(PathBuf::from("/nonexistent/ffmpeg-binary"));
        let params = VideoParams {
            width: 2,
            height: 2,
            fps: 30,
            quality: 20,
            output_path: PathBuf::from("unused.mp4"),
        };
        assert!(sink.start(&params).is_err());
        assert!(!sink.is_started());
    }
}
