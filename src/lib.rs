// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod backend; // 执行后端与降级顺序
pub mod config; // 配置文件与命令行参数
pub mod engine; // 推理引擎接口与 ONNX Runtime 实现
pub mod error; // 错误类型
pub mod frame; // 输入帧
pub mod models; // 模型族描述与解码
pub mod orchestrator; // 多模型调度
pub mod preprocess; // 预处理与几何变换
pub mod worker; // 模型工作线程

pub use crate::backend::Backend;
pub use crate::config::{Args, DetectorConfig};
pub use crate::engine::{InferenceSession, OrtSessionFactory, SessionFactory};
pub use crate::error::{
    ConfigError, DetectionError, EngineError, InitializationError, SelectionError, StateError,
};
pub use crate::frame::Frame;
pub use crate::models::{BoundingBox, Detection, ModelDescriptor, ModelFamily, ModelRegistry, Point2};
pub use crate::orchestrator::MultiModelDetector;
pub use crate::worker::{
    DetectionReply, DetectionWorker, ModelWorker, SessionInfo, Thresholds, WorkerConfig,
    WorkerState,
};

/// 贪心 NMS
///
/// 按分数降序稳定排序 (同分时正面积框在前, 其余保持原始顺序),
/// 依次保留最高分框并抑制与其 IoU >= `iou_threshold` 的框。
/// 结果按选中顺序排列, 重复执行结果不变。
pub fn non_max_suppression<T: AsRef<BoundingBox>>(xs: &mut Vec<T>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| {
        let (b1, b2) = (b1.as_ref(), b2.as_ref());
        b2.score
            .total_cmp(&b1.score)
            .then_with(|| (b2.area() > 0.0).cmp(&(b1.area() > 0.0)))
    });

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = xs[prev_index].as_ref().iou(xs[index].as_ref());
            if iou >= iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}
