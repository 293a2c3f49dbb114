// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 模型工作线程
///
/// 每个工作线程独占一个推理会话, 与调度器之间只通过消息通信:
///
/// ```text
/// 调度器 ──WorkerRequest──▶ 工作线程 (runtime.rs)
///        ◀──WorkerReply───
/// ```
///
/// ## 状态机
/// ```text
/// Uninitialized → Initializing → Ready | Failed
///        任意状态 ──destroy──▶ Terminated
/// ```
///
/// - `detect` 只允许在 Ready 状态下调用, 否则立即返回 StateError, 不触碰引擎
/// - 同一时刻只允许一个 detect 在途, 第二个直接拒绝
/// - 单帧失败以 error 字段返回, 工作线程保持 Ready
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::{InitializationError, StateError};
use crate::frame::Frame;
use crate::models::ModelFamily;

pub mod handle; // 调度器侧句柄
pub mod protocol; // 消息定义
pub mod runtime; // 工作线程主循环

pub use handle::ModelWorker;
pub use protocol::{DetectionReply, SessionInfo, WorkerReply, WorkerRequest};

/// 工作线程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Terminated,
}

/// 检测阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub score: f32,
    pub nms: f32,
}

impl Thresholds {
    pub fn new(score: f32, nms: f32) -> Self {
        Self { score, nms }
    }
}

/// 工作线程配置
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    /// 初始化超时, None 表示一直等待
    pub init_timeout: Option<Duration>,
    /// 单帧检测超时, None 表示一直等待
    pub detect_timeout: Option<Duration>,
    /// 覆盖模型描述中的默认分数阈值
    pub score_threshold: Option<f32>,
    /// 覆盖模型描述中的默认 NMS 阈值
    pub nms_threshold: Option<f32>,
}

/// 统一的检测工作线程接口, 调度器只依赖这个 trait
pub trait DetectionWorker: Send + Sync {
    fn family(&self) -> ModelFamily;

    fn state(&self) -> WorkerState;

    /// 按后端降级顺序 × 候选模型路径创建会话, 第一个成功的组合生效
    fn initialize(&mut self, backend: Backend) -> Result<SessionInfo, InitializationError>;

    /// 检测一帧; 单帧错误放在 reply.error 中
    fn detect(&self, frame: Frame) -> Result<DetectionReply, StateError>;

    /// 调整之后检测使用的阈值
    fn update_thresholds(&self, thresholds: Thresholds) -> Result<(), StateError>;

    /// 销毁会话并等待工作线程退出
    fn destroy(&mut self);

    /// 当前会话 (Ready 时)
    fn session(&self) -> Option<&SessionInfo>;

    fn is_initialized(&self) -> bool {
        self.state() == WorkerState::Ready
    }
}
