// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 模型描述: 每个模型族一份, 创建后不可变

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::ModelFamily;

/// 缩放策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizePolicy {
    /// 直接拉伸到 S×S, 不保持宽高比
    Stretch,
    /// 等比缩放后居中, 四周填充常量灰度
    Letterbox { pad_value: u8 },
}

/// 逐通道归一化: (p - mean[c]) / std[c]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// [0, 1]
    pub const UNIT: Self = Self {
        mean: [0.0; 3],
        std: [255.0; 3],
    };

    /// [-1, 1]
    pub const SYMMETRIC: Self = Self {
        mean: [127.5; 3],
        std: [127.5; 3],
    };

    #[inline]
    pub fn apply(&self, channel: usize, value: u8) -> f32 {
        (value as f32 - self.mean[channel]) / self.std[channel]
    }
}

/// 框的编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEncoding {
    /// x1, y1, x2, y2
    Corner,
    /// cx, cy, w, h
    Center,
}

/// 回归式模型的输出布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegressionLayout {
    /// 单个输出, 每个候选 [box(4), ..., score, ...]
    /// `channels_first` 为 true 时形状为 [1, C, N], 否则为 [1, N, C]
    Fused {
        output: String,
        score_index: usize,
        channels_first: bool,
    },
    /// boxes [.., N, 4] 与 scores [.., N, k] 分开输出
    Split {
        boxes: String,
        scores: String,
        score_index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegressionBindings {
    pub layout: RegressionLayout,
    pub encoding: BoxEncoding,
}

/// 热力图模型的输出绑定
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapBindings {
    pub heatmap: String,           // [1, 1, H, W]
    pub scale: String,             // [1, 2, H, W]
    pub offset: String,            // [1, 2, H, W]
    pub landmarks: Option<String>, // [1, 10, H, W]
    pub stride: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeStrategy {
    Heatmap(HeatmapBindings),
    Regression(RegressionBindings),
}

impl DecodeStrategy {
    /// 需要从会话取回的输出张量名
    pub fn output_names(&self) -> Vec<String> {
        match self {
            DecodeStrategy::Heatmap(b) => {
                let mut names = vec![b.heatmap.clone(), b.scale.clone(), b.offset.clone()];
                if let Some(lm) = &b.landmarks {
                    names.push(lm.clone());
                }
                names
            }
            DecodeStrategy::Regression(b) => match &b.layout {
                RegressionLayout::Fused { output, .. } => vec![output.clone()],
                RegressionLayout::Split { boxes, scores, .. } => {
                    vec![boxes.clone(), scores.clone()]
                }
            },
        }
    }
}

/// 模型族描述
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub family: ModelFamily,
    pub model_paths: Vec<PathBuf>, // 按质量从高到低
    pub input_size: u32,
    pub input_name: String,
    pub resize: ResizePolicy,
    pub normalization: Normalization,
    pub strategy: DecodeStrategy,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

const LETTERBOX_GRAY: ResizePolicy = ResizePolicy::Letterbox { pad_value: 128 };

impl ModelDescriptor {
    pub fn for_family(family: ModelFamily, model_dir: &Path) -> Self {
        match family {
            ModelFamily::Yolo => Self::yolo(model_dir),
            ModelFamily::Scrfd => Self::scrfd(model_dir),
            ModelFamily::CenterFace => Self::centerface(model_dir),
        }
    }

    pub fn yolo(model_dir: &Path) -> Self {
        Self {
            family: ModelFamily::Yolo,
            model_paths: vec![
                model_dir.join("yolov11n-face.onnx"),
                model_dir.join("yolov10n-face.onnx"),
                model_dir.join("yolov8n-face.onnx"),
            ],
            input_size: 640,
            input_name: "images".to_string(),
            resize: LETTERBOX_GRAY,
            normalization: Normalization::UNIT,
            strategy: DecodeStrategy::Regression(RegressionBindings {
                layout: RegressionLayout::Fused {
                    output: "output0".to_string(),
                    score_index: 4,
                    channels_first: true,
                },
                encoding: BoxEncoding::Center,
            }),
            score_threshold: 0.4,
            nms_threshold: 0.5,
        }
    }

    pub fn scrfd(model_dir: &Path) -> Self {
        Self {
            family: ModelFamily::Scrfd,
            model_paths: vec![model_dir.join("scrfd_2.5g.onnx")],
            input_size: 640,
            input_name: "input".to_string(),
            resize: LETTERBOX_GRAY,
            normalization: Normalization::UNIT,
            strategy: DecodeStrategy::Regression(RegressionBindings {
                layout: RegressionLayout::Split {
                    boxes: "boxes".to_string(),
                    scores: "scores".to_string(),
                    score_index: 0,
                },
                encoding: BoxEncoding::Corner,
            }),
            score_threshold: 0.3,
            nms_threshold: 0.4,
        }
    }

    pub fn centerface(model_dir: &Path) -> Self {
        Self {
            family: ModelFamily::CenterFace,
            model_paths: vec![
                model_dir.join("centerface.onnx"),
                model_dir.join("centerface_mod2.onnx"),
            ],
            input_size: 512,
            input_name: "input.1".to_string(),
            resize: ResizePolicy::Stretch,
            normalization: Normalization::SYMMETRIC,
            strategy: DecodeStrategy::Heatmap(HeatmapBindings {
                heatmap: "537".to_string(),
                scale: "538".to_string(),
                offset: "539".to_string(),
                landmarks: Some("540".to_string()),
                stride: 4.0,
            }),
            score_threshold: 0.5,
            nms_threshold: 0.3,
        }
    }
}

/// 模型描述注册表, 由调度器持有
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    descriptors: HashMap<ModelFamily, ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 三个内置模型族, 模型文件位于 `model_dir`
    pub fn with_model_dir(model_dir: impl AsRef<Path>) -> Self {
        let dir = model_dir.as_ref();
        let mut registry = Self::new();
        for family in [ModelFamily::Yolo, ModelFamily::Scrfd, ModelFamily::CenterFace] {
            registry.register(ModelDescriptor::for_family(family, dir));
        }
        registry
    }

    /// 注册 (或替换) 一个模型族的描述
    pub fn register(&mut self, descriptor: ModelDescriptor) -> Option<ModelDescriptor> {
        self.descriptors.insert(descriptor.family, descriptor)
    }

    pub fn get(&self, family: ModelFamily) -> Option<&ModelDescriptor> {
        self.descriptors.get(&family)
    }

    pub fn contains(&self, family: ModelFamily) -> bool {
        self.descriptors.contains_key(&family)
    }
}
