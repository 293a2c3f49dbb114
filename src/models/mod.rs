// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 人脸检测模型族与解码
///
/// # 架构说明
///
/// 每个模型族由一个不可变的 [`ModelDescriptor`] 描述:
/// 候选模型文件、输入尺寸、缩放策略、归一化参数、输出张量绑定与默认阈值。
///
/// ## 解码策略
/// - **Heatmap (CenterFace)**: 中心点热力图 + 尺度 + 偏移 + 五点关键点
///   - 文件: `centerface.rs`
/// - **Regression (YOLO / SCRFD)**: 每行一个候选框, 角点或中心宽高格式
///   - 文件: `regression.rs`
///
/// 两种策略都在最后调用 [`crate::non_max_suppression`]。
///
/// ## 核心流程
/// ```text
/// 原始帧 → preprocess → [1,3,S,S] 张量 + FrameGeometry
///          ↓
///     推理引擎 run
///          ↓
///     输出张量 → decode → Vec<Detection> (原图坐标)
/// ```
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::DetectionError;
use crate::preprocess::FrameGeometry;

pub mod centerface; // 中心点热力图解码
pub mod descriptor; // 模型描述与注册表
pub mod regression; // 回归式解码 (YOLO / SCRFD)

pub use descriptor::{
    BoxEncoding, DecodeStrategy, HeatmapBindings, ModelDescriptor, ModelRegistry, Normalization,
    RegressionBindings, RegressionLayout, ResizePolicy,
};

/// 推理输出: 输出名 → 张量
pub type TensorMap = HashMap<String, Array<f32, IxDyn>>;

/// 模型族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// YOLOv8/v10/v11 人脸模型, 单输出 [1, C, N]
    Yolo,
    /// SCRFD, boxes/scores 分离输出
    Scrfd,
    /// CenterFace, 中心点热力图 (基线模型)
    CenterFace,
}

impl ModelFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFamily::Yolo => "yolo",
            ModelFamily::Scrfd => "scrfd",
            ModelFamily::CenterFace => "centerface",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yolo" => Ok(ModelFamily::Yolo),
            "scrfd" => Ok(ModelFamily::Scrfd),
            "centerface" => Ok(ModelFamily::CenterFace),
            other => Err(format!(
                "unknown model family '{}' (yolo | scrfd | centerface)",
                other
            )),
        }
    }
}

/// 检测框, 原图像素坐标
///
/// 序列化为 `[x1, y1, x2, y2, score]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 5]", into = "[f32; 5]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    /// 交并比, 不相交或并集为零时为 0
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

impl AsRef<BoundingBox> for BoundingBox {
    fn as_ref(&self) -> &BoundingBox {
        self
    }
}

impl From<[f32; 5]> for BoundingBox {
    fn from(v: [f32; 5]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4])
    }
}

impl From<BoundingBox> for [f32; 5] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2, b.score]
    }
}

/// 关键点, 序列化为 `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point2 {
    fn from(v: [f32; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<Point2> for [f32; 2] {
    fn from(p: Point2) -> Self {
        [p.x, p.y]
    }
}

/// 单个人脸检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub landmarks: Option<Vec<Point2>>, // 五点关键点 (仅热力图模型)
}

impl Detection {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            landmarks: None,
        }
    }

    pub fn with_landmarks(bbox: BoundingBox, landmarks: Vec<Point2>) -> Self {
        Self {
            bbox,
            landmarks: Some(landmarks),
        }
    }
}

impl AsRef<BoundingBox> for Detection {
    fn as_ref(&self) -> &BoundingBox {
        &self.bbox
    }
}

/// 按描述中的解码策略把输出张量还原为原图坐标的检测框 (已做 NMS)
pub fn decode(
    outputs: &TensorMap,
    geometry: &FrameGeometry,
    descriptor: &ModelDescriptor,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>, DetectionError> {
    let mut detections = match &descriptor.strategy {
        DecodeStrategy::Heatmap(bindings) => {
            centerface::decode(outputs, geometry, bindings, score_threshold)?
        }
        DecodeStrategy::Regression(bindings) => {
            regression::decode(outputs, geometry, bindings, score_threshold)?
        }
    };
    crate::non_max_suppression(&mut detections, nms_threshold);
    Ok(detections)
}

/// 按绑定名取输出张量
pub(crate) fn output<'a>(
    outputs: &'a TensorMap,
    name: &str,
) -> Result<&'a Array<f32, IxDyn>, DetectionError> {
    outputs
        .get(name)
        .ok_or_else(|| DetectionError::MissingOutput(name.to_string()))
}
