// 宿主接口 - 截屏状态机对GUI系统和帧缓冲读取的全部依赖

use anyhow::{anyhow, Result};

use crate::models::{Rect, StylePadding, Vec2, ViewportId, WindowId, WindowInfo};

/// GUI宿主的帧快照
///
/// 截屏上下文只通过该接口读取/修改窗口几何和输入状态，不直接接触宿主的全局状态。
/// `set_window_pos`/`set_window_size` 需在下一次 `windows()` 中可见。
pub trait GuiHost {
    /// 主视口的屏幕矩形
    fn viewport_rect(&self) -> Rect;

    /// 当前帧所有窗口，按绘制顺序（后面的在上层）
    fn windows(&self) -> Vec<WindowInfo>;

    fn window(&self, id: WindowId) -> Option<WindowInfo> {
        self.windows().into_iter().find(|w| w.id == id)
    }

    fn set_window_pos(&mut self, id: WindowId, pos: Vec2);

    fn set_window_size(&mut self, id: WindowId, size: Vec2);

    /// 接下来 `frames` 帧不绘制该窗口，但照常参与布局
    fn hide_window_for_render(&mut self, id: WindowId, frames: u32);

    fn style_padding(&self) -> StylePadding;

    fn set_style_padding(&mut self, padding: StylePadding);

    fn mouse_pos(&self) -> Vec2;

    fn set_mouse_pos(&mut self, pos: Vec2);

    fn hovered_window(&self) -> Option<WindowId>;

    fn set_hovered_window(&mut self, id: Option<WindowId>);

    /// 是否由GUI自己绘制鼠标光标
    fn mouse_draw_cursor(&self) -> bool;

    fn set_mouse_draw_cursor(&mut self, draw: bool);

    /// 单调时钟（秒）
    fn time(&self) -> f64;
}

/// 帧缓冲读取
///
/// 把视口内 `(x, y, width, height)` 区域（相对视口左上角）的 RGBA 像素写入 `dst`，
/// `dst` 长度恰好为 `width * height * 4`。
pub trait ScreenReader {
    fn read_pixels(
        &mut self,
        viewport: ViewportId,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        dst: &mut [u8],
    ) -> Result<()>;
}

/// 回调形式的读取函数，返回 false 表示失败
impl<F> ScreenReader for F
where
    F: FnMut(ViewportId, i32, i32, u32, u32, &mut [u8]) -> bool,
{
    fn read_pixels(
        &mut self,
        viewport: ViewportId,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        dst: &mut [u8],
    ) -> Result<()> {
        if self(viewport, x, y, width, height, dst) {
            Ok(())
        } else {
            Err(anyhow!(
                "截屏函数返回失败: viewport={} ({}, {}) {}x{}",
                viewport,
                x,
                y,
                width,
                height
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_reader() {
        let mut calls = 0;
        let mut reader = |_vp: ViewportId, _x: i32, _y: i32, w: u32, h: u32, dst: &mut [u8]| {
            calls += 1;
            assert_eq!(dst.len(), (w * h * 4) as usize);
            dst.fill(1);
            w > 1
        };

        let mut buf = vec![0u8; 2 * 2 * 4];
        assert!(reader.read_pixels(0, 0, 0, 2, 2, &mut buf).is_ok());
        assert!(buf.iter().all(|b| *b == 1));

        let mut small = vec![0u8; 4];
        assert!(reader.read_pixels(0, 0, 0, 1, 1, &mut small).is_err());
        drop(reader);
        assert_eq!(calls, 2);
    }
}
