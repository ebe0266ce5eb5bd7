// 视频模块 - 接收逐帧 RGBA 数据的帧接收端

pub mod encoder;
pub mod ffmpeg_helper;

pub use encoder::FfmpegSink;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// 开始录制时确定的视频参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// CRF 值，越小质量越好
    pub quality: u32,
    pub output_path: PathBuf,
}

/// 帧接收端
///
/// 录制视频时，第一帧截取后才知道尺寸，因此 `start` 延迟到第一帧调用。
/// 每帧数据长度为 `width * height * 4`。
pub trait FrameSink {
    fn start(&mut self, params: &VideoParams) -> Result<()>;

    fn push_frame(&mut self, rgba: &[u8]) -> Result<()>;

    /// 结束录制并等待输出完成
    fn finish(&mut self) -> Result<()>;

    fn is_started(&self) -> bool;
}

/// 根据输出文件扩展名决定尺寸对齐：gif 为 1，其余编码器要求偶数宽高
pub fn default_size_align(output: &Path) -> u32 {
    let is_gif = output
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gif"))
        .unwrap_or(false);

    if is_gif {
        1
    } else {
        2
    }
}

/// 内存中的帧接收端，保存收到的全部帧
#[derive(Debug, Default)]
pub struct MemorySink {
    params: Option<VideoParams>,
    frames: Vec<Vec<u8>>,
    finished_sessions: Vec<(VideoParams, usize)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前录制中已收到的帧
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    pub fn params(&self) -> Option<&VideoParams> {
        self.params.as_ref()
    }

    /// 已结束的录制：参数和帧数
    pub fn finished_sessions(&self) -> &[(VideoParams, usize)] {
        &self.finished_sessions
    }
}

impl FrameSink for MemorySink {
    fn start(&mut self, params: &VideoParams) -> Result<()> {
        if self.params.is_some() {
            return Err(anyhow!("录制已经开始"));
        }
        self.params = Some(params.clone());
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, rgba: &[u8]) -> Result<()> {
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| anyhow!("录制尚未开始"))?;

        let expected = params.width as usize * params.height as usize * 4;
        if rgba.len() != expected {
            return Err(anyhow!(
                "帧大小不匹配: 期望 {} 字节, 实际 {} 字节",
                expected,
                rgba.len()
            ));
        }

        self.frames.push(rgba.to_vec());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(params) = self.params.take() {
            self.finished_sessions.push((params, self.frames.len()));
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.params.is_some()
    }
}

/// 可在多处共享的接收端句柄，便于调用方在录制结束后检查结果
impl<S: FrameSink> FrameSink for std::rc::Rc<std::cell::RefCell<S>> {
    fn start(&mut self, params: &VideoParams) -> Result<()> {
        self.borrow_mut().start(params)
    }

    fn push_frame(&mut self, rgba: &[u8]) -> Result<()> {
        self.borrow_mut().push_frame(rgba)
    }

    fn finish(&mut self) -> Result<()> {
        self.borrow_mut().finish()
    }

    fn is_started(&self) -> bool {
        self.borrow().is_started()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(w: u32, h: u32) -> VideoParams {
        VideoParams {
            width: w,
            height: h,
            fps: 30,
            quality: 20,
            output_path: PathBuf::from("out.mp4"),
        }
    }

    #[test]
    fn test_default_size_align() {
        assert_eq!(default_size_align(Path::new("a/b/capture.gif")), 1);
        assert_eq!(default_size_align(Path::new("capture.GIF")), 1);
        assert_eq!(default_size_align(Path::new("capture.mp4")), 2);
        assert_eq!(default_size_align(Path::new("capture")), 2);
    }

    #[test]
    fn test_memory_sink_lifecycle() {
        let mut sink = MemorySink::new();
        assert!(!sink.is_started());
        assert!(sink.push_frame(&[0u8; 4]).is_err());

        sink.start(&params(2, 1)).unwrap();
        assert!(sink.is_started());
        sink.push_frame(&[0u8; 8]).unwrap();
        assert!(sink.push_frame(&[0u8; 4]).is_err());
        sink.finish().unwrap();

        assert!(!sink.is_started());
        assert_eq!(sink.finished_sessions().len(), 1);
        assert_eq!(sink.finished_sessions()[0].1, 1);
    }
}
