// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 调度器 ↔ 工作线程 消息

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::InitializationError;
use crate::frame::Frame;
use crate::models::{BoundingBox, Detection, Point2};

use super::Thresholds;

/// 调度器 → 工作线程
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    Initialize { id: u64, backend: Backend },
    Detect { id: u64, frame: Frame },
    UpdateThresholds(Thresholds),
    Destroy,
}

/// 工作线程 → 调度器
#[derive(Debug, Clone)]
pub enum WorkerReply {
    /// 线程启动后发送一次
    Ready,
    Initialized {
        id: u64,
        result: Result<SessionInfo, InitializationError>,
    },
    Detection {
        id: u64,
        reply: DetectionReply,
    },
}

/// 初始化成功后确定的后端与模型文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub backend: Backend,
    pub model_path: PathBuf,
}

/// 单帧检测结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReply {
    /// 按分数降序 (NMS 选中顺序)
    pub detections: Vec<BoundingBox>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub landmarks: Vec<Vec<Point2>>,
    /// 毫秒
    pub detection_time: f64,
    pub face_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionReply {
    pub fn success(detections: Vec<Detection>, detection_time: f64) -> Self {
        let landmarks = if detections.iter().all(|d| d.landmarks.is_some()) {
            detections
                .iter()
                .filter_map(|d| d.landmarks.clone())
                .collect()
        } else {
            Vec::new()
        };
        let detections: Vec<BoundingBox> = detections.into_iter().map(|d| d.bbox).collect();
        Self {
            face_count: detections.len(),
            detections,
            landmarks,
            detection_time,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
