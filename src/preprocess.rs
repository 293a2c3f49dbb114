// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 预处理: RGBA 帧 → [1, 3, S, S] 平面 RGB 张量
// 同时返回 FrameGeometry, 解码时用它把坐标还原到原图

use fast_image_resize as fr;
use ndarray::{s, Array, IxDyn};

use crate::error::DetectionError;
use crate::frame::Frame;
use crate::models::{ModelDescriptor, ResizePolicy};

/// 原图与模型输入之间的几何变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub frame_width: u32,
    pub frame_height: u32,
    pub input_size: u32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl FrameGeometry {
    pub fn stretch(frame_width: u32, frame_height: u32, input_size: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            input_size,
            resized_width: input_size,
            resized_height: input_size,
            scale_x: input_size as f32 / frame_width as f32,
            scale_y: input_size as f32 / frame_height as f32,
            pad_x: 0,
            pad_y: 0,
        }
    }

    pub fn letterbox(frame_width: u32, frame_height: u32, input_size: u32) -> Self {
        let (r, w_new, h_new) = scale_wh(
            frame_width as f32,
            frame_height as f32,
            input_size as f32,
            input_size as f32,
        );
        let w_clamped = (w_new as u32).clamp(1, input_size);
        let h_clamped = (h_new as u32).clamp(1, input_size);
        // 被钳制的轴按实际缩放比还原
        let scale_x = if w_clamped as f32 == w_new {
            r
        } else {
            w_clamped as f32 / frame_width as f32
        };
        let scale_y = if h_clamped as f32 == h_new {
            r
        } else {
            h_clamped as f32 / frame_height as f32
        };
        let (w_new, h_new) = (w_clamped, h_clamped);
        Self {
            frame_width,
            frame_height,
            input_size,
            resized_width: w_new,
            resized_height: h_new,
            scale_x,
            scale_y,
            pad_x: (input_size - w_new) / 2,
            pad_y: (input_size - h_new) / 2,
        }
    }

    pub fn for_policy(policy: ResizePolicy, frame_width: u32, frame_height: u32, size: u32) -> Self {
        match policy {
            ResizePolicy::Stretch => Self::stretch(frame_width, frame_height, size),
            ResizePolicy::Letterbox { .. } => Self::letterbox(frame_width, frame_height, size),
        }
    }

    /// 模型输入坐标 → 原图坐标 (去掉填充再除以缩放比)
    #[inline]
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale_x,
            (y - self.pad_y as f32) / self.scale_y,
        )
    }
}

/// 等比缩放: (比例, 新宽, 新高)
fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

pub fn preprocess(
    frame: &Frame,
    descriptor: &ModelDescriptor,
) -> Result<(Array<f32, IxDyn>, FrameGeometry), DetectionError> {
    frame.validate()?;
    let geometry = FrameGeometry::for_policy(
        descriptor.resize,
        frame.width,
        frame.height,
        descriptor.input_size,
    );
    let resized = resize_rgba(frame, geometry.resized_width, geometry.resized_height)?;

    let size = descriptor.input_size as usize;
    let norm = descriptor.normalization;
    let mut ys: Array<f32, IxDyn> = Array::zeros(IxDyn(&[1, 3, size, size]));

    if let ResizePolicy::Letterbox { pad_value } = descriptor.resize {
        for c in 0..3 {
            ys.slice_mut(s![0, c, .., ..]).fill(norm.apply(c, pad_value));
        }
    }

    let rw = geometry.resized_width as usize;
    let (pad_x, pad_y) = (geometry.pad_x as usize, geometry.pad_y as usize);
    for (i, px) in resized.chunks_exact(4).enumerate() {
        let x = i % rw + pad_x;
        let y = i / rw + pad_y;
        ys[[0, 0, y, x]] = norm.apply(0, px[0]);
        ys[[0, 1, y, x]] = norm.apply(1, px[1]);
        ys[[0, 2, y, x]] = norm.apply(2, px[2]);
        // 跳过 Alpha 通道
    }

    Ok((ys, geometry))
}

/// RGBA 缩放 (fast_image_resize, 双线性)
fn resize_rgba(frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>, DetectionError> {
    if frame.width == width && frame.height == height {
        return Ok(frame.rgba.as_ref().clone());
    }

    let src = fr::images::ImageRef::new(
        frame.width,
        frame.height,
        frame.rgba.as_slice(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| DetectionError::Resize(e.to_string()))?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .map_err(|e| DetectionError::Resize(e.to_string()))?;

    Ok(dst.buffer().to_vec())
}
