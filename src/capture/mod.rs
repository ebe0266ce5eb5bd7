// 截屏模块 - 多帧截屏状态机（静态截图、长窗口拼接、视频录制）
//
// 宿主每帧先调用 post_new_frame，截屏进行中再调用一次 capture_update。
// 状态机在同一线程内随帧推进，从不阻塞渲染循环（结束录制时等待编码器退出除外）。

pub mod host;
pub mod image_buf;
pub mod stage;
pub mod tool;

pub use host::{GuiHost, ScreenReader};
pub use image_buf::{ImageBuffer, BYTES_PER_PIXEL};
pub use stage::{CaptureStage, FramePlan, CHUNK_INTERVAL, HIDE_FRAMES, LOCK_RECT_FRAME};
pub use tool::CaptureTool;

use anyhow::{anyhow, Result};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::models::{
    CaptureArgs, CaptureFlags, CaptureStatus, Rect, StylePadding, Vec2, WindowFlags, WindowId,
    MAIN_VIEWPORT,
};
use crate::video::{default_size_align, FrameSink, VideoParams};

/// 截屏前窗口的位置和尺寸
#[derive(Debug, Clone, Copy)]
struct WindowBackup {
    id: WindowId,
    rect: Rect,
}

/// 进行中的请求
#[derive(Debug, Clone, Copy)]
struct ActiveRequest {
    id: Uuid,
    flags: CaptureFlags,
}

/// 拼接期间每帧强制的输入状态
///
/// 窗口被移动后，真实鼠标位置会命中错误的窗口，因此在宿主解析输入之后用它覆盖。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputOverride {
    pub mouse_pos: Vec2,
    pub hovered_window: Option<WindowId>,
}

/// 截屏上下文
pub struct CaptureContext {
    screen_reader: Option<Box<dyn ScreenReader>>,
    frame_sink: Option<Box<dyn FrameSink>>,

    frame_no: u32,
    chunk_no: u32,
    capture_rect: Rect,
    captured_window_rect: Rect,
    capture_buf: ImageBuffer,
    active: Option<ActiveRequest>,

    backup_windows: Vec<WindowBackup>,
    backup_style_padding: Option<StylePadding>,
    backup_mouse_draw_cursor: Option<bool>,

    stitch_window: Option<WindowId>,
    mouse_relative_to_window: Option<Vec2>,
    hovered_window: Option<WindowId>,

    video_recording: bool,
    video_last_frame_time: Option<f64>,
}

impl Default for CaptureContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureContext {
    pub fn new() -> Self {
        Self {
            screen_reader: None,
            frame_sink: None,
            frame_no: 0,
            chunk_no: 0,
            capture_rect: Rect::INVERTED,
            captured_window_rect: Rect::INVERTED,
            capture_buf: ImageBuffer::default(),
            active: None,
            backup_windows: Vec::new(),
            backup_style_padding: None,
            backup_mouse_draw_cursor: None,
            stitch_window: None,
            mouse_relative_to_window: None,
            hovered_window: None,
            video_recording: false,
            video_last_frame_time: None,
        }
    }

    pub fn with_screen_reader(mut self, reader: impl ScreenReader + 'static) -> Self {
        self.set_screen_reader(reader);
        self
    }

    pub fn set_screen_reader(&mut self, reader: impl ScreenReader + 'static) {
        self.screen_reader = Some(Box::new(reader));
    }

    pub fn has_screen_reader(&self) -> bool {
        self.screen_reader.is_some()
    }

    /// 设置视频帧接收端，录制中不能更换
    pub fn set_frame_sink(&mut self, sink: impl FrameSink + 'static) {
        assert!(
            !self.frame_sink.as_ref().map(|s| s.is_started()).unwrap_or(false),
            "录制视频时不能更换帧接收端"
        );
        self.frame_sink = Some(Box::new(sink));
    }

    pub fn frame_no(&self) -> u32 {
        self.frame_no
    }

    pub fn is_capturing(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_capturing_video(&self) -> bool {
        self.video_recording
    }

    /// 当前帧所处阶段
    pub fn stage(&self) -> CaptureStage {
        match self.active {
            None => CaptureStage::Idle,
            Some(active) => {
                let instant = active.flags.contains(CaptureFlags::INSTANT);
                FramePlan::for_frame(self.frame_no, self.video_recording, instant)
                    .stage(self.frame_no)
            }
        }
    }

    /// 开始录制视频，之后每帧用同一请求调用 `capture_update`
    pub fn begin_video_capture(&mut self, args: &CaptureArgs) {
        assert!(!self.video_recording, "已在录制视频");
        assert!(self.active.is_none(), "已有截屏在进行中");
        assert!(
            !self.frame_sink.as_ref().map(|s| s.is_started()).unwrap_or(false),
            "上一段视频尚未结束"
        );
        assert!(
            (1..=100).contains(&args.record_fps_target),
            "视频帧率必须在 1-100 之间: {}",
            args.record_fps_target
        );

        info!("开始录制视频: {:?}", args.output_file);
        self.video_recording = true;
        self.active = Some(ActiveRequest {
            id: args.id(),
            flags: args.flags,
        });
    }

    /// 结束录制，之后的 `capture_update` 会完成视频文件
    pub fn end_video_capture(&mut self) {
        assert!(self.active.is_some(), "没有进行中的截屏");
        assert!(self.video_recording, "没有在录制视频");

        info!("结束录制视频");
        self.video_recording = false;
    }

    /// 拼接期间需要强制的输入状态
    pub fn input_override(&self, host: &dyn GuiHost) -> Option<InputOverride> {
        let active = self.active?;
        if self.frame_no <= LOCK_RECT_FRAME || !active.flags.contains(CaptureFlags::STITCH_ALL) {
            return None;
        }

        let window = host.window(self.stitch_window?)?;
        let offset = self.mouse_relative_to_window?;
        Some(InputOverride {
            mouse_pos: window.pos + offset,
            hovered_window: self.hovered_window,
        })
    }

    /// 每帧在宿主处理完输入之后调用，无论是否在截屏
    pub fn post_new_frame(&mut self, host: &mut dyn GuiHost) {
        let Some(active) = self.active else {
            return;
        };

        if active.flags.contains(CaptureFlags::HIDE_MOUSE_CURSOR) {
            if self.backup_mouse_draw_cursor.is_none() {
                self.backup_mouse_draw_cursor = Some(host.mouse_draw_cursor());
            }
            host.set_mouse_draw_cursor(false);
        }

        if let Some(input) = self.input_override(host) {
            host.set_mouse_pos(input.mouse_pos);
            host.set_hovered_window(input.hovered_window);
        }
    }

    /// 推进一帧
    ///
    /// 截屏进行中每个渲染帧调用一次。返回 `Done`/`Error` 时上下文已复位，
    /// 窗口、样式内边距和光标设置都已恢复。
    pub fn capture_update(&mut self, args: &mut CaptureArgs, host: &mut dyn GuiHost) -> CaptureStatus {
        assert!(self.screen_reader.is_some(), "未设置截屏函数");
        assert!(args.has_output(), "必须指定输出缓冲区或输出文件");
        assert!(args.record_fps_target != 0, "视频帧率不能为 0");
        if self.video_recording {
            assert!(args.output_file.is_some(), "录制视频必须指定输出文件");
            assert!(args.output_buffer.is_none(), "录制视频不能输出到缓冲区");
            assert!(
                !args.flags.contains(CaptureFlags::STITCH_ALL),
                "录制视频不支持拼接"
            );
        }

        // 隐藏其它窗口，避免出现在目标窗口背后
        if !args.flags.contains(CaptureFlags::INCLUDE_OTHER_WINDOWS) && !args.windows.is_empty() {
            hide_other_windows(args, host);
        }

        let is_recording_video = self.video_recording;
        let now = host.time();
        if is_recording_video {
            if let Some(last) = self.video_last_frame_time {
                if now - last < 1.0 / args.record_fps_target as f64 {
                    return CaptureStatus::InProgress;
                }
            }
        }

        let instant = args.flags.contains(CaptureFlags::INSTANT);
        let explicit_rect = args.is_capturing_explicit_rect();
        if instant {
            assert!(args.windows.is_empty(), "单帧截屏不能指定窗口");
            assert!(explicit_rect, "单帧截屏必须指定截取矩形");
            assert!(!is_recording_video, "单帧截屏不能用于录制视频");
            assert!(
                !args.flags.contains(CaptureFlags::STITCH_ALL),
                "单帧截屏不支持拼接"
            );
        }

        let plan = FramePlan::for_frame(self.frame_no, is_recording_video, instant);
        trace!("截屏第 {} 帧: {:?}", self.frame_no, plan.stage(self.frame_no));

        if plan.init {
            self.init_capture(args, host, explicit_rect, instant, is_recording_video);
        } else {
            assert!(
                self.active.map(|a| a.id) == Some(args.id()),
                "截屏过程中不能更换请求"
            );
        }

        if plan.lock_rect {
            if let Err(e) = self.lock_capture_rect(args, host, explicit_rect) {
                error!("锁定截取区域失败: {}", e);
                return self.abort_capture(args, host);
            }
        }

        if plan.capture_chunk {
            let chunk_height = match self.capture_chunk(args, host, now) {
                Ok(h) => h,
                Err(e) => {
                    error!("截取分块失败: {}", e);
                    return self.abort_capture(args, host);
                }
            };

            // 不拼接时截完即结束；拼接时直到没有剩余高度
            let stitching = args.flags.contains(CaptureFlags::STITCH_ALL);
            if !self.video_recording && (!stitching || chunk_height <= 0) {
                let result = self.finalize_output(args);
                self.restore_and_reset(host);
                return match result {
                    Ok(()) => {
                        info!(
                            "截屏完成: {}x{} {:?}",
                            args.out_image_size.x, args.out_image_size.y, args.output_file
                        );
                        CaptureStatus::Done
                    }
                    Err(e) => {
                        error!("保存截屏结果失败: {}", e);
                        CaptureStatus::Error
                    }
                };
            }
        }

        self.frame_no += 1;
        CaptureStatus::InProgress
    }

    /// 第 0 帧：备份状态、确定目标窗口
    fn init_capture(
        &mut self,
        args: &mut CaptureArgs,
        host: &mut dyn GuiHost,
        explicit_rect: bool,
        instant: bool,
        recording_video: bool,
    ) {
        if recording_video && args.size_align == 0 {
            if let Some(path) = args.output_file.as_deref() {
                args.size_align = default_size_align(path);
            }
        }

        if let Some(active) = self.active {
            assert!(
                active.id == args.id(),
                "录制视频时必须传入 begin_video_capture 时的同一请求"
            );
        }
        self.active = Some(ActiveRequest {
            id: args.id(),
            flags: args.flags,
        });

        debug!(
            "开始截屏: {} 个窗口, 矩形 {:?}, 标志 {:?}",
            args.windows.len(),
            args.capture_rect,
            args.flags
        );

        self.chunk_no = 0;
        self.capture_rect = Rect::INVERTED;
        self.captured_window_rect = Rect::INVERTED;
        self.backup_windows.clear();

        // 清零内边距，允许窗口完全移出可见视口
        self.backup_style_padding = Some(host.style_padding());
        host.set_style_padding(StylePadding::NONE);

        if args.flags.contains(CaptureFlags::HIDE_MOUSE_CURSOR) && self.backup_mouse_draw_cursor.is_none() {
            self.backup_mouse_draw_cursor = Some(host.mouse_draw_cursor());
        }

        let windows = host.windows();
        if explicit_rect {
            if let Some(rect) = args.capture_rect {
                self.capture_rect = rect;
            }

            // 没有指定窗口时收集所有顶层窗口，截取超出视口的区域时需要移动它们
            if args.windows.is_empty() && !instant {
                let include_popups = args.flags.contains(CaptureFlags::INCLUDE_TOOLTIPS_AND_POPUPS);
                args.windows = windows
                    .iter()
                    .filter(|w| w.parent.is_none())
                    .filter(|w| include_popups || !w.is_popup_or_tooltip())
                    .map(|w| w.id)
                    .collect();
            }
        }

        for id in &args.windows {
            match windows.iter().find(|w| w.id == *id) {
                Some(window) => {
                    self.captured_window_rect.add_rect(window.rect());
                    self.backup_windows.push(WindowBackup {
                        id: *id,
                        rect: window.rect(),
                    });
                }
                None => warn!("截屏目标窗口不存在: {:?}", id),
            }
        }

        if args.flags.contains(CaptureFlags::STITCH_ALL) {
            assert!(!explicit_rect, "指定截取矩形时不能拼接完整窗口内容");
            assert!(args.windows.len() == 1, "只能拼接单个窗口的完整内容");

            let id = args.windows[0];
            if let Some(window) = windows.iter().find(|w| w.id == id) {
                // 只调整高度；改变宽度可能让换行的文字改变内容高度
                let full_height = window.size.y.max(window.content_full_height);
                host.set_window_size(id, Vec2::new(window.size.x, full_height));

                self.stitch_window = Some(id);
                self.mouse_relative_to_window = Some(host.mouse_pos() - window.pos + window.scroll);
                self.hovered_window = host.hovered_window();
            }
        } else {
            self.stitch_window = None;
            self.mouse_relative_to_window = None;
            self.hovered_window = None;
        }
    }

    /// 第 2 帧（或单帧截屏）：摆放窗口、锁定截取矩形、分配输出缓冲区
    fn lock_capture_rect(
        &mut self,
        args: &mut CaptureArgs,
        host: &mut dyn GuiHost,
        explicit_rect: bool,
    ) -> Result<()> {
        let viewport = host.viewport_rect();
        let stitching = args.flags.contains(CaptureFlags::STITCH_ALL);

        // 把窗口组的左上角移到视口左上角加留白处
        if stitching {
            let move_offset =
                Vec2::new(args.padding, args.padding) - self.captured_window_rect.min + viewport.min;
            for id in &args.windows {
                if let Some(window) = host.window(*id) {
                    host.set_window_pos(*id, window.pos + move_offset);
                }
            }
        }

        if !explicit_rect {
            if args.windows.is_empty() {
                self.capture_rect = viewport;
            } else {
                let mut rect = Rect::INVERTED;
                for id in &args.windows {
                    if let Some(window) = host.window(*id) {
                        rect.add_rect(window.rect());
                    }
                }
                rect.expand(args.padding);
                self.capture_rect = rect;
            }
        }

        if !stitching {
            // 只能截取屏幕上可见的部分
            self.capture_rect.clip_with(viewport);

            if args.size_align > 1 {
                assert!(
                    args.size_align.is_power_of_two(),
                    "尺寸对齐必须是 2 的幂: {}",
                    args.size_align
                );
                let align = args.size_align as i32;
                let size = self.capture_rect.size();
                let mut width = align_up(size.x as i32, align);
                let mut height = align_up(size.y as i32, align);

                // 向上取整会超出视口时改为向下取整
                if self.capture_rect.min.x + width as f32 >= viewport.max.x {
                    width -= align;
                }
                if self.capture_rect.min.y + height as f32 >= viewport.max.y {
                    height -= align;
                }
                if width <= 0 || height <= 0 {
                    return Err(anyhow!("对齐后的截取尺寸无效: {}x{}", width, height));
                }

                self.capture_rect.max =
                    self.capture_rect.min + Vec2::new(width as f32, height as f32);
            }
        }

        if self.capture_rect.is_inverted() || !self.capture_rect.has_area() {
            return Err(anyhow!("截取区域无效或不在视口内: {:?}", self.capture_rect));
        }

        let width = self.capture_rect.width() as u32;
        let height = self.capture_rect.height() as u32;
        if width == 0 || height == 0 {
            return Err(anyhow!("截取区域不足一个像素: {:?}", self.capture_rect));
        }

        args.out_image_size = Vec2::new(width as f32, height as f32);
        args.out_capture_rect = self.capture_rect;

        let output = match args.output_buffer.as_mut() {
            Some(buf) => buf,
            None => &mut self.capture_buf,
        };
        output.create_empty(width, height);

        debug!("截取区域已锁定: {:?} -> {}x{}", self.capture_rect, width, height);
        Ok(())
    }

    /// 截取一个分块，返回分块高度（小于等于 0 表示已没有剩余内容）
    fn capture_chunk(&mut self, args: &mut CaptureArgs, host: &mut dyn GuiHost, now: f64) -> Result<i64> {
        // 只截取视口内的部分，多视口拼接尚未实现
        let viewport = host.viewport_rect();
        let mut clipped = self.capture_rect;
        clipped.clip_with(viewport);

        let capture_height = viewport.height().min(self.capture_rect.height()) as i64;
        let x = (clipped.min.x - viewport.min.x) as i32;
        let y = (clipped.min.y - viewport.min.y) as i32;
        let width = clipped.width().max(0.0) as u32;
        let stitching = args.flags.contains(CaptureFlags::STITCH_ALL);

        let output = match args.output_buffer.as_mut() {
            Some(buf) => buf,
            None => &mut self.capture_buf,
        };
        let height = (output.height as i64 - self.chunk_no as i64 * capture_height).min(capture_height);

        if height > 0 {
            if width != output.width {
                return Err(anyhow!(
                    "截取宽度 {} 与输出宽度 {} 不一致（暂不支持超出视口宽度的截取）",
                    width,
                    output.width
                ));
            }
            if !stitching && height != output.height as i64 {
                return Err(anyhow!("截屏过程中视口尺寸发生了变化"));
            }

            let first_row = self.chunk_no * capture_height as u32;
            let dst = output.rows_mut(first_row, height as u32);
            let reader = self
                .screen_reader
                .as_mut()
                .ok_or_else(|| anyhow!("未设置截屏函数"))?;
            reader.read_pixels(MAIN_VIEWPORT, x, y, width, height as u32, dst)?;
            trace!("已截取分块 #{}: ({}, {}) {}x{}", self.chunk_no, x, y, width, height);

            if stitching {
                // 窗口上移，露出下一段内容
                for id in &args.windows {
                    if let Some(window) = host.window(*id) {
                        host.set_window_pos(*id, window.pos - Vec2::new(0.0, height as f32));
                    }
                }
                self.capture_rect.translate_y(-(height as f32));
                self.chunk_no += 1;
            }

            if self.video_recording && !args.flags.contains(CaptureFlags::NO_SAVE) {
                let sink = self
                    .frame_sink
                    .as_mut()
                    .ok_or_else(|| anyhow!("未设置视频帧接收端"))?;

                // 第一帧才知道视频尺寸
                if !sink.is_started() {
                    let output_path = args
                        .output_file
                        .clone()
                        .ok_or_else(|| anyhow!("录制视频必须指定输出文件"))?;
                    sink.start(&VideoParams {
                        width,
                        height: clipped.height() as u32,
                        fps: args.record_fps_target,
                        quality: args.record_quality,
                        output_path,
                    })?;
                }
                sink.push_frame(&output.data)?;
            }

            if self.video_recording {
                self.video_last_frame_time = Some(now);
            }
        }

        Ok(height)
    }

    /// 去除 alpha，结束视频或保存图片
    fn finalize_output(&mut self, args: &mut CaptureArgs) -> Result<()> {
        let output = match args.output_buffer.as_mut() {
            Some(buf) => buf,
            None => &mut self.capture_buf,
        };
        output.remove_alpha();

        let sink_started = self.frame_sink.as_ref().map(|s| s.is_started()).unwrap_or(false);
        let result = match self.frame_sink.as_mut() {
            Some(sink) if sink_started => sink.finish(),
            _ if args.output_buffer.is_some() || args.flags.contains(CaptureFlags::NO_SAVE) => Ok(()),
            _ => match args.output_file.as_deref() {
                Some(path) => self.capture_buf.save(path),
                None => Ok(()),
            },
        };

        if args.output_buffer.is_none() {
            self.capture_buf.clear();
        }
        result
    }

    /// 失败时结束录制、释放缓冲区并复位
    fn abort_capture(&mut self, args: &mut CaptureArgs, host: &mut dyn GuiHost) -> CaptureStatus {
        if let Some(sink) = self.frame_sink.as_mut() {
            if sink.is_started() {
                if let Err(e) = sink.finish() {
                    warn!("结束视频录制失败: {}", e);
                }
            }
        }
        if args.output_buffer.is_none() {
            self.capture_buf.clear();
        }

        self.restore_and_reset(host);
        CaptureStatus::Error
    }

    /// 恢复窗口、光标和样式内边距，清空所有临时状态
    fn restore_and_reset(&mut self, host: &mut dyn GuiHost) {
        for backup in self.backup_windows.drain(..) {
            match host.window(backup.id) {
                Some(window) if !window.hidden => {
                    host.set_window_pos(backup.id, backup.rect.min);
                    host.set_window_size(backup.id, backup.rect.size());
                }
                _ => {}
            }
        }

        if let Some(draw_cursor) = self.backup_mouse_draw_cursor.take() {
            host.set_mouse_draw_cursor(draw_cursor);
        }
        if let Some(padding) = self.backup_style_padding.take() {
            host.set_style_padding(padding);
        }

        self.frame_no = 0;
        self.chunk_no = 0;
        self.capture_rect = Rect::INVERTED;
        self.captured_window_rect = Rect::INVERTED;
        self.stitch_window = None;
        self.mouse_relative_to_window = None;
        self.hovered_window = None;
        self.video_recording = false;
        self.video_last_frame_time = None;
        self.active = None;
    }
}

/// 隐藏目标以外的顶层窗口
///
/// 只设置跳过绘制的帧数，不影响布局缓存。
fn hide_other_windows(args: &CaptureArgs, host: &mut dyn GuiHost) {
    let include_popups = args.flags.contains(CaptureFlags::INCLUDE_TOOLTIPS_AND_POPUPS);
    for window in host.windows() {
        if window.flags.contains(WindowFlags::CHILD) {
            continue;
        }
        if include_popups && window.is_popup_or_tooltip() {
            continue;
        }
        if args.windows.contains(&window.id) {
            continue;
        }
        if window.active {
            host.hide_window_for_render(window.id, HIDE_FRAMES);
        }
    }
}

fn align_up(value: i32, align: i32) -> i32 {
    (value + align - 1) & !(align - 1)
}
