// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// ONNX Runtime 会话工厂
// 每个后端只注册一个执行提供者并设置 error_on_failure,
// 提供者不可用时会话创建直接失败, 由工作线程降级到下一个后端

use std::path::Path;

use ndarray::{Array, IxDyn};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::debug;

use super::{InferenceSession, SessionFactory};
use crate::backend::Backend;
use crate::error::EngineError;
use crate::models::TensorMap;

#[derive(Debug, Clone)]
pub struct OrtSessionFactory {
    device_id: i32,
    intra_threads: usize,
}

impl Default for OrtSessionFactory {
    fn default() -> Self {
        Self {
            device_id: 0,
            intra_threads: 4,
        }
    }
}

impl OrtSessionFactory {
    pub fn new(device_id: i32, intra_threads: usize) -> Self {
        Self {
            device_id,
            intra_threads,
        }
    }

    fn execution_provider(&self, backend: Backend) -> ExecutionProviderDispatch {
        match backend {
            Backend::TensorRt => TensorRTExecutionProvider::default()
                .with_device_id(self.device_id)
                .build()
                .error_on_failure(),
            Backend::Cuda => CUDAExecutionProvider::default()
                .with_device_id(self.device_id)
                .build()
                .error_on_failure(),
            Backend::Cpu => CPUExecutionProvider::default().build(),
        }
    }
}

fn unavailable(backend: Backend, model_path: &Path, e: impl std::fmt::Display) -> EngineError {
    EngineError::BackendUnavailable {
        backend,
        model: model_path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl SessionFactory for OrtSessionFactory {
    fn create(
        &self,
        model_path: &Path,
        backend: Backend,
    ) -> Result<Box<dyn InferenceSession>, EngineError> {
        if !model_path.exists() {
            return Err(EngineError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| unavailable(backend, model_path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| unavailable(backend, model_path, e))?
            .with_intra_threads(self.intra_threads)
            .map_err(|e| unavailable(backend, model_path, e))?
            .with_execution_providers([self.execution_provider(backend)])
            .map_err(|e| unavailable(backend, model_path, e))?
            .commit_from_file(model_path)
            .map_err(|e| unavailable(backend, model_path, e))?;

        debug!(
            "📦 {} loaded on {} (inputs: {:?}, outputs: {:?})",
            model_path.display(),
            backend,
            session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
        );

        Ok(Box::new(OrtSession { session }))
    }
}

pub struct OrtSession {
    session: Session,
}

impl InferenceSession for OrtSession {
    fn run(
        &mut self,
        input_name: &str,
        input: &Array<f32, IxDyn>,
        output_names: &[String],
    ) -> Result<TensorMap, EngineError> {
        let tensor =
            Tensor::from_array(input.clone()).map_err(|e| EngineError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_name => tensor])
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let mut ys = TensorMap::with_capacity(output_names.len());
        for name in output_names {
            // 缺失的输出留给解码阶段报告
            let Some(value) = outputs.get(name.as_str()) else {
                continue;
            };
            let array = value
                .try_extract_array::<f32>()
                .map_err(|e| EngineError::Inference(format!("output '{}': {}", name, e)))?;
            ys.insert(name.clone(), array.into_owned());
        }
        Ok(ys)
    }
}
