// 截屏阶段 - 把帧计数映射为每帧要执行的步骤

use serde::Serialize;

/// 第 0 帧调整窗口尺寸后，等到该帧才信任窗口几何并锁定截取矩形
pub const LOCK_RECT_FRAME: u32 = 2;

/// 静态截图每隔多少帧截取一个分块，保证窗口移动后至少完整渲染过一次
pub const CHUNK_INTERVAL: u32 = 4;

/// 隐藏非目标窗口时设置的跳过绘制帧数
pub const HIDE_FRAMES: u32 = 2;

/// 截屏状态机所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStage {
    /// 没有进行中的截屏
    Idle,
    /// 校验请求、备份状态、确定目标窗口
    Init,
    /// 空等一帧，让第 0 帧的尺寸调整完成布局
    SettleLayout,
    /// 摆放窗口、锁定截取矩形、分配输出缓冲区
    LockRect,
    /// 等待移动后的窗口被渲染
    WaitRender,
    /// 读取一个分块（或一帧视频）
    CaptureChunk,
}

/// 某一帧需要执行的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramePlan {
    pub init: bool,
    pub lock_rect: bool,
    pub capture_chunk: bool,
}

impl FramePlan {
    pub fn for_frame(frame_no: u32, recording_video: bool, instant: bool) -> Self {
        let after_lock = frame_no > LOCK_RECT_FRAME;
        Self {
            init: frame_no == 0,
            lock_rect: frame_no == LOCK_RECT_FRAME || instant,
            capture_chunk: instant
                || (after_lock && (recording_video || frame_no % CHUNK_INTERVAL == 0)),
        }
    }

    /// 该帧最靠后的阶段，用于日志和查询
    pub fn stage(&self, frame_no: u32) -> CaptureStage {
        if self.capture_chunk {
            CaptureStage::CaptureChunk
        } else if self.lock_rect {
            CaptureStage::LockRect
        } else if self.init {
            CaptureStage::Init
        } else if frame_no < LOCK_RECT_FRAME {
            CaptureStage::SettleLayout
        } else {
            CaptureStage::WaitRender
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_still_capture_schedule() {
        let stages: Vec<CaptureStage> = (0..9)
            .map(|n| FramePlan::for_frame(n, false, false).stage(n))
            .collect();

        assert_eq!(
            stages,
            vec![
                CaptureStage::Init,
                CaptureStage::SettleLayout,
                CaptureStage::LockRect,
                CaptureStage::WaitRender,
                CaptureStage::CaptureChunk,
                CaptureStage::WaitRender,
                CaptureStage::WaitRender,
                CaptureStage::WaitRender,
                CaptureStage::CaptureChunk,
            ]
        );
    }

    #[test]
    fn test_video_captures_every_frame_after_lock() {
        assert!(!FramePlan::for_frame(2, true, false).capture_chunk);
        for n in 3..10 {
            assert!(FramePlan::for_frame(n, true, false).capture_chunk);
        }
    }

    #[test]
    fn test_instant_does_everything_in_frame_zero() {
        let plan = FramePlan::for_frame(0, false, true);
        assert_eq!(
            plan,
            FramePlan {
                init: true,
                lock_rect: true,
                capture_chunk: true,
            }
        );
    }
}
