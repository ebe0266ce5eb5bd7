// 几何类型 - 屏幕坐标系下的点与矩形

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// 二维向量（屏幕坐标，单位像素）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// 轴对齐矩形，`min` 为左上角，`max` 为右下角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Default for Rect {
    fn default() -> Self {
        Self::INVERTED
    }
}

impl Rect {
    /// 空的累加起点，`add_rect` 第一次调用后即为该矩形
    pub const INVERTED: Self = Self {
        min: Vec2::new(f32::MAX, f32::MAX),
        max: Vec2::new(-f32::MAX, -f32::MAX),
    };

    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_pos_size(pos: Vec2, size: Vec2) -> Self {
        Self::new(pos, pos + size)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width(), self.height())
    }

    pub fn is_inverted(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// 宽高均为正
    pub fn has_area(&self) -> bool {
        self.width() > 0.0 && self.height() > 0.0
    }

    /// 扩展为包含另一个矩形
    pub fn add_rect(&mut self, other: Rect) {
        self.min.x = self.min.x.min(other.min.x);
        self.min.y = self.min.y.min(other.min.y);
        self.max.x = self.max.x.max(other.max.x);
        self.max.y = self.max.y.max(other.max.y);
    }

    /// 四边各向外扩展 `amount`
    pub fn expand(&mut self, amount: f32) {
        self.min.x -= amount;
        self.min.y -= amount;
        self.max.x += amount;
        self.max.y += amount;
    }

    /// 裁剪到 `clip` 内
    pub fn clip_with(&mut self, clip: Rect) {
        self.min.x = self.min.x.max(clip.min.x);
        self.min.y = self.min.y.max(clip.min.y);
        self.max.x = self.max.x.min(clip.max.x);
        self.max.y = self.max.y.min(clip.max.y);
    }

    pub fn translate_y(&mut self, dy: f32) {
        self.min.y += dy;
        self.max.y += dy;
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min.x >= self.min.x
            && other.min.y >= self.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_starts_from_inverted() {
        let mut r = Rect::INVERTED;
        assert!(r.is_inverted());

        r.add_rect(Rect::new(Vec2::new(10.0, 20.0), Vec2::new(30.0, 40.0)));
        r.add_rect(Rect::new(Vec2::new(5.0, 25.0), Vec2::new(15.0, 60.0)));

        assert_eq!(r, Rect::new(Vec2::new(5.0, 20.0), Vec2::new(30.0, 60.0)));
    }

    #[test]
    fn test_expand_and_clip() {
        let mut r = Rect::new(Vec2::new(0.0, 10.0), Vec2::new(50.0, 50.0));
        r.expand(10.0);
        assert_eq!(r.size(), Vec2::new(70.0, 60.0));

        r.clip_with(Rect::new(Vec2::ZERO, Vec2::new(40.0, 100.0)));
        assert_eq!(r, Rect::new(Vec2::new(0.0, 0.0), Vec2::new(40.0, 60.0)));
    }
}
