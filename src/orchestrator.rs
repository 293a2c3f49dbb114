// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 多模型调度器
// 同一时刻最多一个存活的工作线程: 先销毁旧的并等待线程退出, 再创建新的

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::DetectorConfig;
use crate::engine::SessionFactory;
use crate::error::{InitializationError, SelectionError, StateError};
use crate::frame::Frame;
use crate::models::{ModelFamily, ModelRegistry};
use crate::worker::{
    DetectionReply, DetectionWorker, ModelWorker, SessionInfo, Thresholds, WorkerConfig,
};

pub struct MultiModelDetector {
    registry: ModelRegistry,
    factory: Arc<dyn SessionFactory>,
    worker_config: WorkerConfig,
    priority: Vec<ModelFamily>,
    baseline: ModelFamily,
    current: Option<Box<dyn DetectionWorker>>,
}

impl MultiModelDetector {
    pub fn new(registry: ModelRegistry, factory: Arc<dyn SessionFactory>) -> Self {
        let defaults = DetectorConfig::default();
        Self {
            registry,
            factory,
            worker_config: WorkerConfig::default(),
            priority: defaults.priority,
            baseline: defaults.baseline,
            current: None,
        }
    }

    pub fn from_config(config: &DetectorConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self::new(config.registry(), factory)
            .with_priority(config.priority.clone(), config.baseline)
            .with_worker_config(config.worker_config())
    }

    /// 自动选择顺序与兜底模型
    pub fn with_priority(mut self, priority: Vec<ModelFamily>, baseline: ModelFamily) -> Self {
        self.priority = priority;
        self.baseline = baseline;
        self
    }

    pub fn with_worker_config(mut self, config: WorkerConfig) -> Self {
        self.worker_config = config;
        self
    }

    pub fn baseline(&self) -> ModelFamily {
        self.baseline
    }

    pub fn priority(&self) -> &[ModelFamily] {
        &self.priority
    }

    /// 销毁当前工作线程, 返回时会话已释放
    fn teardown(&mut self) {
        if let Some(mut worker) = self.current.take() {
            info!("🔄 releasing {}", worker.family());
            worker.destroy();
        }
    }

    /// 不带兜底的单次切换
    fn try_switch(
        &mut self,
        family: ModelFamily,
        backend: Backend,
    ) -> Result<SessionInfo, InitializationError> {
        self.teardown();

        let descriptor = self
            .registry
            .get(family)
            .cloned()
            .ok_or(InitializationError::UnknownFamily(family))?;
        let mut worker = ModelWorker::spawn(
            descriptor,
            Arc::clone(&self.factory),
            self.worker_config.clone(),
        )?;
        // 失败时 worker 在此处被 drop, 线程随之退出
        let session = worker.initialize(backend)?;
        self.current = Some(Box::new(worker));
        Ok(session)
    }

    /// 切换到指定模型族; 失败且不是兜底模型时改用兜底模型
    ///
    /// 返回实际生效的模型族
    pub fn switch_model(
        &mut self,
        family: ModelFamily,
        backend: Backend,
    ) -> Result<ModelFamily, InitializationError> {
        match self.try_switch(family, backend) {
            Ok(session) => {
                info!(
                    "✅ switched to {} ({} on {})",
                    family,
                    session.model_path.display(),
                    session.backend
                );
                Ok(family)
            }
            Err(e) if family != self.baseline => {
                warn!(
                    "⚠️  {} unavailable ({}), falling back to {}",
                    family, e, self.baseline
                );
                let baseline = self.baseline;
                self.try_switch(baseline, backend).map(|session| {
                    info!(
                        "✅ switched to {} ({} on {})",
                        baseline,
                        session.model_path.display(),
                        session.backend
                    );
                    baseline
                })
            }
            Err(e) => Err(e),
        }
    }

    /// 按优先级依次尝试, 返回第一个初始化成功的模型族
    pub fn auto_select(&mut self, backend: Backend) -> Result<ModelFamily, SelectionError> {
        let mut tried = Vec::with_capacity(self.priority.len());
        for family in self.priority.clone() {
            tried.push(family);
            match self.try_switch(family, backend) {
                Ok(session) => {
                    info!(
                        "🎯 auto-selected {} ({} on {})",
                        family,
                        session.model_path.display(),
                        session.backend
                    );
                    return Ok(family);
                }
                Err(e) => warn!("⚠️  {} failed: {}", family, e),
            }
        }
        Err(SelectionError::NoModelAvailable { tried })
    }

    pub fn detect(&self, frame: Frame) -> Result<DetectionReply, StateError> {
        self.current
            .as_ref()
            .ok_or(StateError::NoActiveModel)?
            .detect(frame)
    }

    /// 当前生效 (Ready) 的模型族
    pub fn current_model(&self) -> Option<ModelFamily> {
        self.current
            .as_ref()
            .filter(|w| w.is_initialized())
            .map(|w| w.family())
    }

    pub fn is_initialized(&self) -> bool {
        self.current_model().is_some()
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.current.as_ref().and_then(|w| w.session())
    }

    /// 更新阈值: 作用于当前工作线程以及之后创建的工作线程
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> Result<(), StateError> {
        self.worker_config.score_threshold = Some(thresholds.score);
        self.worker_config.nms_threshold = Some(thresholds.nms);
        match &self.current {
            Some(worker) => worker.update_thresholds(thresholds),
            None => Ok(()),
        }
    }

    pub fn destroy(&mut self) {
        self.teardown();
    }
}

impl Drop for MultiModelDetector {
    fn drop(&mut self) {
        self.teardown();
    }
}
