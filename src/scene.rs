// 软件场景 - 进程内的GUI宿主实现，把纯色窗口光栅化到帧缓冲
//
// 供演示程序和测试使用：实现 GuiHost，并通过 FramebufferReader 实现 ScreenReader。

use anyhow::{anyhow, Result};
use std::cell::RefCell;
use std::rc::Rc;

use crate::capture::{GuiHost, ImageBuffer, ScreenReader, BYTES_PER_PIXEL};
use crate::models::{
    Rect, StylePadding, Vec2, ViewportId, WindowFlags, WindowId, WindowInfo, MAIN_VIEWPORT,
};

/// 背景色，alpha 故意不是 0xFF，模拟读回的无意义 alpha
pub const BACKGROUND: [u8; 4] = [20, 20, 20, 0];

/// 窗口像素的 alpha
pub const WINDOW_ALPHA: u8 = 0x80;

/// 场景中的一个窗口
#[derive(Debug, Clone)]
pub struct SceneWindow {
    pub id: WindowId,
    pub name: String,
    pub flags: WindowFlags,
    pub parent: Option<WindowId>,
    pub pos: Vec2,
    pub size: Vec2,
    pub content_full_height: f32,
    pub scroll: Vec2,
    /// 窗口的 R、G 分量，B 分量为内容行号
    pub color: [u8; 2],
    pub active: bool,
    pub hidden: bool,
    pub hidden_frames_for_render: u32,
}

impl SceneWindow {
    pub fn rect(&self) -> Rect {
        Rect::from_pos_size(self.pos, self.size)
    }

    /// 内容第 `row` 行的像素
    pub fn content_pixel(&self, row: i64) -> [u8; 4] {
        [self.color[0], self.color[1], row.rem_euclid(256) as u8, WINDOW_ALPHA]
    }

    fn is_drawn(&self) -> bool {
        !self.hidden && self.hidden_frames_for_render == 0
    }
}

/// 内存中的GUI场景
pub struct SoftwareScene {
    viewport: Rect,
    windows: Vec<SceneWindow>,
    style_padding: StylePadding,
    mouse_pos: Vec2,
    hovered: Option<WindowId>,
    mouse_draw_cursor: bool,
    time: f64,
    framebuffer: Rc<RefCell<ImageBuffer>>,
    next_id: u32,
}

impl SoftwareScene {
    /// 创建原点在 (0, 0) 的视口
    pub fn new(width: u32, height: u32) -> Self {
        let mut framebuffer = ImageBuffer::default();
        framebuffer.create_empty(width, height);

        Self {
            viewport: Rect::from_pos_size(Vec2::ZERO, Vec2::new(width as f32, height as f32)),
            windows: Vec::new(),
            style_padding: StylePadding {
                display_window_padding: Vec2::new(19.0, 19.0),
                display_safe_area_padding: Vec2::new(3.0, 3.0),
            },
            mouse_pos: Vec2::new(-f32::MAX, -f32::MAX),
            hovered: None,
            mouse_draw_cursor: false,
            time: 0.0,
            framebuffer: Rc::new(RefCell::new(framebuffer)),
            next_id: 1,
        }
    }

    /// 添加顶层窗口，内容高度等于窗口高度
    pub fn add_window(&mut self, name: &str, pos: Vec2, size: Vec2) -> WindowId {
        self.add_window_with_flags(name, pos, size, WindowFlags::empty(), None)
    }

    pub fn add_window_with_flags(
        &mut self,
        name: &str,
        pos: Vec2,
        size: Vec2,
        flags: WindowFlags,
        parent: Option<WindowId>,
    ) -> WindowId {
        let id = WindowId(self.next_id);
        self.next_id += 1;

        let seed = id.0.wrapping_mul(67);
        self.windows.push(SceneWindow {
            id,
            name: name.to_string(),
            flags,
            parent,
            pos,
            size,
            content_full_height: size.y,
            scroll: Vec2::ZERO,
            color: [(40 + seed % 200) as u8, (200 - seed % 150) as u8],
            active: true,
            hidden: false,
            hidden_frames_for_render: 0,
        });
        id
    }

    pub fn scene_window(&self, id: WindowId) -> Option<&SceneWindow> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn scene_window_mut(&mut self, id: WindowId) -> Option<&mut SceneWindow> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// 新的一帧：推进时钟、递减跳过绘制计数、根据鼠标位置计算悬停窗口
    pub fn begin_frame(&mut self, dt: f64) {
        self.time += dt;
        for window in &mut self.windows {
            window.hidden_frames_for_render = window.hidden_frames_for_render.saturating_sub(1);
        }

        let mouse = self.mouse_pos;
        self.hovered = self
            .windows
            .iter()
            .rev()
            .filter(|w| !w.hidden)
            .find(|w| {
                let r = w.rect();
                mouse.x >= r.min.x && mouse.x < r.max.x && mouse.y >= r.min.y && mouse.y < r.max.y
            })
            .map(|w| w.id);
    }

    /// 按绘制顺序把窗口光栅化到帧缓冲
    pub fn render(&mut self) {
        let mut fb = self.framebuffer.borrow_mut();
        for px in fb.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&BACKGROUND);
        }

        let stride = fb.stride();
        let vp = self.viewport;
        for window in self.windows.iter().filter(|w| w.is_drawn()) {
            let mut r = window.rect();
            r.clip_with(vp);
            if !r.has_area() {
                continue;
            }

            let x0 = (r.min.x - vp.min.x) as usize;
            let x1 = (r.max.x - vp.min.x) as usize;
            let y0 = (r.min.y - vp.min.y) as usize;
            let y1 = (r.max.y - vp.min.y) as usize;
            for y in y0..y1 {
                let content_row =
                    (y as f32 + vp.min.y - window.pos.y + window.scroll.y).floor() as i64;
                let px = window.content_pixel(content_row);
                let row = &mut fb.data[y * stride..(y + 1) * stride];
                for x in x0..x1 {
                    row[x * BYTES_PER_PIXEL..(x + 1) * BYTES_PER_PIXEL].copy_from_slice(&px);
                }
            }
        }
    }

    /// 最近一次渲染结果的拷贝
    pub fn framebuffer_snapshot(&self) -> ImageBuffer {
        self.framebuffer.borrow().clone()
    }

    pub fn screen_reader(&self) -> FramebufferReader {
        FramebufferReader {
            framebuffer: Rc::clone(&self.framebuffer),
        }
    }

    /// 内边距不为 0 时，窗口至少要有 `display_window_padding` 留在视口内
    fn clamp_window_pos(&self, pos: Vec2, size: Vec2) -> Vec2 {
        let pad = self.style_padding.display_window_padding;
        if pad == Vec2::ZERO {
            return pos;
        }

        let vp = self.viewport;
        Vec2::new(
            pos.x.clamp(vp.min.x + pad.x - size.x, (vp.max.x - pad.x).max(vp.min.x + pad.x - size.x)),
            pos.y.clamp(vp.min.y + pad.y - size.y, (vp.max.y - pad.y).max(vp.min.y + pad.y - size.y)),
        )
    }
}

impl GuiHost for SoftwareScene {
    fn viewport_rect(&self) -> Rect {
        self.viewport
    }

    fn windows(&self) -> Vec<WindowInfo> {
        self.windows
            .iter()
            .map(|w| WindowInfo {
                id: w.id,
                name: w.name.clone(),
                flags: w.flags,
                parent: w.parent,
                pos: w.pos,
                size: w.size,
                content_full_height: w.content_full_height,
                scroll: w.scroll,
                active: w.active,
                hidden: w.hidden,
            })
            .collect()
    }

    fn set_window_pos(&mut self, id: WindowId, pos: Vec2) {
        let Some(size) = self.scene_window(id).map(|w| w.size) else {
            return;
        };
        let clamped = self.clamp_window_pos(pos, size);
        if let Some(window) = self.scene_window_mut(id) {
            window.pos = clamped;
        }
    }

    fn set_window_size(&mut self, id: WindowId, size: Vec2) {
        if let Some(window) = self.scene_window_mut(id) {
            window.size = size;
        }
    }

    fn hide_window_for_render(&mut self, id: WindowId, frames: u32) {
        if let Some(window) = self.scene_window_mut(id) {
            window.hidden_frames_for_render = frames;
        }
    }

    fn style_padding(&self) -> StylePadding {
        self.style_padding
    }

    fn set_style_padding(&mut self, padding: StylePadding) {
        self.style_padding = padding;
    }

    fn mouse_pos(&self) -> Vec2 {
        self.mouse_pos
    }

    fn set_mouse_pos(&mut self, pos: Vec2) {
        self.mouse_pos = pos;
    }

    fn hovered_window(&self) -> Option<WindowId> {
        self.hovered
    }

    fn set_hovered_window(&mut self, id: Option<WindowId>) {
        self.hovered = id;
    }

    fn mouse_draw_cursor(&self) -> bool {
        self.mouse_draw_cursor
    }

    fn set_mouse_draw_cursor(&mut self, draw: bool) {
        self.mouse_draw_cursor = draw;
    }

    fn time(&self) -> f64 {
        self.time
    }
}

/// 从场景帧缓冲读取像素
pub struct FramebufferReader {
    framebuffer: Rc<RefCell<ImageBuffer>>,
}

impl ScreenReader for FramebufferReader {
    fn read_pixels(
        &mut self,
        viewport: ViewportId,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        if viewport != MAIN_VIEWPORT {
            return Err(anyhow!("不支持的视口: {}", viewport));
        }

        let fb = self.framebuffer.borrow();
        let fits = |start: i32, len: u32, limit: u32| {
            u32::try_from(start)
                .ok()
                .and_then(|start| start.checked_add(len))
                .map(|end| end <= limit)
                .unwrap_or(false)
        };
        if !fits(x, width, fb.width) || !fits(y, height, fb.height) {
            return Err(anyhow!(
                "读取区域超出帧缓冲: ({}, {}) {}x{}，帧缓冲 {}x{}",
                x,
                y,
                width,
                height,
                fb.width,
                fb.height
            ));
        }

        let row_len = width as usize * BYTES_PER_PIXEL;
        if dst.len() != row_len * height as usize {
            return Err(anyhow!("目标缓冲区大小不匹配"));
        }

        let stride = fb.stride();
        for (i, dst_row) in dst.chunks_exact_mut(row_len).enumerate() {
            let start = (y as usize + i) * stride + x as usize * BYTES_PER_PIXEL;
            dst_row.copy_from_slice(&fb.data[start..start + row_len]);
        }
        Ok(())
    }
}
