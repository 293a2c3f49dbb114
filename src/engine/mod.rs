// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 推理引擎接口
///
/// 工作线程只依赖这两个 trait:
/// - [`SessionFactory`]: 在指定后端上为模型文件创建会话, 失败即触发降级
/// - [`InferenceSession`]: `run(输入张量) → 输出张量表`
///
/// 生产实现见 `ort_backend.rs` (ONNX Runtime)。
use std::path::Path;

use ndarray::{Array, IxDyn};

use crate::backend::Backend;
use crate::error::EngineError;
use crate::models::TensorMap;

pub mod ort_backend;

pub use ort_backend::OrtSessionFactory;

/// 已创建的推理会话, 只属于创建它的工作线程
pub trait InferenceSession: Send {
    fn run(
        &mut self,
        input_name: &str,
        input: &Array<f32, IxDyn>,
        output_names: &[String],
    ) -> Result<TensorMap, EngineError>;
}

/// 会话工厂, 在调度器与所有工作线程之间共享
pub trait SessionFactory: Send + Sync {
    fn create(
        &self,
        model_path: &Path,
        backend: Backend,
    ) -> Result<Box<dyn InferenceSession>, EngineError>;
}
