// 图像缓冲区 - 一帧/一张画布的 RGBA 像素

use anyhow::{anyhow, Context, Result};
use image::{ColorType, ImageFormat};
use std::path::Path;
use tracing::trace;

/// 每像素字节数（RGBA8）
pub const BYTES_PER_PIXEL: usize = 4;

/// RGBA8 像素缓冲区，按行紧密排列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageBuffer {
    /// 释放像素数据
    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.width = 0;
        self.height = 0;
    }

    /// 重新分配 `w*h*4` 字节并清零
    pub fn create_empty(&mut self, width: u32, height: u32) {
        assert!(width > 0 && height > 0, "图像尺寸无效: {}x{}", width, height);

        self.clear();
        self.width = width;
        self.height = height;
        self.data = vec![0u8; self.byte_len()];
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    /// 从 `first_row` 开始的 `rows` 行，拼接时用于写入单个分块
    pub fn rows_mut(&mut self, first_row: u32, rows: u32) -> &mut [u8] {
        let stride = self.stride();
        let start = first_row as usize * stride;
        let end = start + rows as usize * stride;
        &mut self.data[start..end]
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[offset..offset + BYTES_PER_PIXEL]);
        px
    }

    /// 强制所有像素完全不透明
    ///
    /// 从帧缓冲读回的 alpha 通道可能是无意义的值。
    pub fn remove_alpha(&mut self) {
        for px in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            px[3] = 0xFF;
        }
    }

    /// 无损保存为 PNG
    pub fn save(&self, path: &Path) -> Result<()> {
        if self.is_empty() {
            return Err(anyhow!("图像缓冲区为空，无法保存: {:?}", path));
        }

        image::save_buffer_with_format(
            path,
            &self.data,
            self.width,
            self.height,
            ColorType::Rgba8,
            ImageFormat::Png,
        )
        .with_context(|| format!("保存图像失败: {:?}", path))?;

        trace!("图像已保存: {:?} ({}x{})", path, self.width, self.height);
        Ok(())
    }

    /// 读取图片并转换为 RGBA8
    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("读取图像失败: {:?}", path))?
            .to_rgba8();

        Ok(Self {
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_empty_zero_fills() {
        let mut buf = ImageBuffer::default();
        buf.create_empty(3, 2);
        assert_eq!(buf.data.len(), 3 * 2 * 4);
        assert!(buf.data.iter().all(|b| *b == 0));

        buf.data[0] = 7;
        buf.create_empty(1, 1);
        assert_eq!(buf.data, vec![0u8; 4]);
    }

    #[test]
    #[should_panic]
    fn test_create_empty_rejects_zero_size() {
        ImageBuffer::default().create_empty(0, 4);
    }

    #[test]
    fn test_remove_alpha_forces_opaque() {
        let mut buf = ImageBuffer::default();
        buf.create_empty(4, 4);
        for (i, b) in buf.data.iter_mut().enumerate() {
            *b = (i * 37 % 256) as u8;
        }
        let before = buf.clone();

        buf.remove_alpha();

        for (px, old) in buf.data.chunks_exact(4).zip(before.data.chunks_exact(4)) {
            assert_eq!(px[3], 0xFF);
            assert_eq!(&px[..3], &old[..3]);
        }
    }

    #[test]
    fn test_rows_mut_targets_chunk() {
        let mut buf = ImageBuffer::default();
        buf.create_empty(2, 4);
        buf.rows_mut(2, 2).fill(9);

        assert_eq!(buf.pixel(1, 1), [0, 0, 0, 0]);
        assert_eq!(buf.pixel(0, 2), [9, 9, 9, 9]);
        assert_eq!(buf.pixel(1, 3), [9, 9, 9, 9]);
    }

    #[test]
    fn test_save_and_load_png() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("frame.png");

        let mut buf = ImageBuffer::default();
        buf.create_empty(5, 3);
        for (i, b) in buf.data.iter_mut().enumerate() {
            *b = (i * 11 % 251) as u8;
        }
        buf.remove_alpha();
        buf.save(&path).unwrap();

        let loaded = ImageBuffer::load(&path).unwrap();
        assert_eq!(loaded, buf);
    }

    #[test]
    fn test_save_empty_fails() {
        let temp_dir = tempdir().unwrap();
        let buf = ImageBuffer::default();
        assert!(buf.save(&temp_dir.path().join("empty.png")).is_err());
    }

    #[test]
    fn test_clear_releases_pixels() {
        let mut buf = ImageBuffer::default();
        buf.create_empty(8, 8);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!((buf.width, buf.height), (0, 0));
    }
}
