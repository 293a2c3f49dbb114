// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 错误类型
// 引擎层 → 工作线程 → 调度器, 每一层只向上抛出自己吸收不了的错误

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::Backend;
use crate::models::ModelFamily;
use crate::worker::WorkerState;

/// 推理引擎错误 (会话创建 / 推理调用)
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// 某个执行后端拒绝创建会话, 由工作线程内部吸收并尝试下一个后端
    #[error("backend {backend} unavailable for {}: {reason}", .model.display())]
    BackendUnavailable {
        backend: Backend,
        model: PathBuf,
        reason: String,
    },

    #[error("model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("inference failed: {0}")]
    Inference(String),
}

/// 所有 (后端 × 模型路径) 组合都没有得到可用会话
#[derive(Debug, Clone, Error)]
pub enum InitializationError {
    #[error("{family}: all {attempts} backend/model combinations failed, last error: {last_error}")]
    Exhausted {
        family: ModelFamily,
        attempts: usize,
        last_error: EngineError,
    },

    #[error("{0} has no candidate model paths")]
    NoCandidates(ModelFamily),

    #[error("no descriptor registered for model family {0}")]
    UnknownFamily(ModelFamily),

    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("worker thread exited before replying")]
    WorkerGone,

    #[error("initialization cancelled by worker teardown")]
    Cancelled,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// 在错误的状态下调用了工作线程的操作, 立即返回, 不重试
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("worker is not ready (state: {0:?})")]
    NotReady(WorkerState),

    #[error("worker has been terminated")]
    Terminated,

    #[error("a detect request is already in flight on this worker")]
    DetectInFlight,

    #[error("no model is active")]
    NoActiveModel,
}

/// 单帧检测失败, 以空结果 + error 字段的形式返回, 工作线程保持 Ready
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("invalid frame: {width}x{height} with {len} bytes (expected {expected})")]
    InvalidFrame {
        width: u32,
        height: u32,
        len: usize,
        expected: usize,
    },

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("output tensor '{0}' missing from inference result")]
    MissingOutput(String),

    #[error("output tensor '{name}' has unexpected shape {shape:?}, expected {expected}")]
    Shape {
        name: String,
        shape: Vec<usize>,
        expected: &'static str,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("detection pipeline panicked: {0}")]
    Panicked(String),

    #[error("no detection reply within {0:?}")]
    Timeout(Duration),

    #[error("worker thread exited before replying")]
    WorkerGone,
}

/// 自动选择时所有模型族都失败, 不再重试
#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    #[error("failed to initialize any face detection model (tried {tried:?})")]
    NoModelAvailable { tried: Vec<ModelFamily> },
}

/// 配置文件读写错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
