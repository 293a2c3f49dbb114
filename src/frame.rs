// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::Arc;

use image::DynamicImage;

use crate::error::DetectionError;

/// 输入帧 (采集端 → 检测工作线程)
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba: Arc::new(rgba),
        }
    }

    pub fn from_image(img: &DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(width, height, rgba.into_raw())
    }

    /// 检查缓冲区长度是否为 width * height * 4
    pub fn validate(&self) -> Result<(), DetectionError> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.rgba.len() != expected {
            return Err(DetectionError::InvalidFrame {
                width: self.width,
                height: self.height,
                len: self.rgba.len(),
                expected,
            });
        }
        Ok(())
    }
}
