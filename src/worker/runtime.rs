// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 工作线程主循环: 独占会话, 串行处理请求

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::protocol::{DetectionReply, SessionInfo, WorkerReply, WorkerRequest};
use super::Thresholds;
use crate::backend::Backend;
use crate::engine::{InferenceSession, SessionFactory};
use crate::error::{DetectionError, EngineError, InitializationError};
use crate::frame::Frame;
use crate::models::{self, ModelDescriptor};
use crate::preprocess::preprocess;

pub(crate) struct WorkerRuntime {
    descriptor: ModelDescriptor,
    factory: Arc<dyn SessionFactory>,
    thresholds: Thresholds,
    output_names: Vec<String>,
    session: Option<(Box<dyn InferenceSession>, SessionInfo)>,
    cancelled: Arc<AtomicBool>, // 句柄销毁时置位, 初始化循环据此提前退出
    requests: Receiver<WorkerRequest>,
    replies: Sender<WorkerReply>,
}

impl WorkerRuntime {
    pub(crate) fn new(
        descriptor: ModelDescriptor,
        factory: Arc<dyn SessionFactory>,
        thresholds: Thresholds,
        cancelled: Arc<AtomicBool>,
        requests: Receiver<WorkerRequest>,
        replies: Sender<WorkerReply>,
    ) -> Self {
        let output_names = descriptor.strategy.output_names();
        Self {
            descriptor,
            factory,
            thresholds,
            output_names,
            session: None,
            cancelled,
            requests,
            replies,
        }
    }

    pub(crate) fn run(mut self) {
        let family = self.descriptor.family;
        if self.replies.send(WorkerReply::Ready).is_err() {
            return;
        }
        debug!("🧵 {} worker ready", family);

        while let Ok(request) = self.requests.recv() {
            let reply = match request {
                WorkerRequest::Initialize { id, backend } => WorkerReply::Initialized {
                    id,
                    result: self.initialize(backend),
                },
                WorkerRequest::Detect { id, frame } => WorkerReply::Detection {
                    id,
                    reply: self.detect(&frame),
                },
                WorkerRequest::UpdateThresholds(thresholds) => {
                    debug!("🔧 {} thresholds → {:?}", family, thresholds);
                    self.thresholds = thresholds;
                    continue;
                }
                WorkerRequest::Destroy => break,
            };
            // 调度器已放弃等待时, 直接退出
            if self.replies.send(reply).is_err() {
                break;
            }
        }

        // 释放会话
        if let Some((session, info)) = self.session.take() {
            drop(session);
            info!("🗑️ {} session released ({})", family, info.backend);
        }
        debug!("🧵 {} worker exited", family);
    }

    fn initialize(&mut self, backend: Backend) -> Result<SessionInfo, InitializationError> {
        if let Some((_, info)) = &self.session {
            return Ok(info.clone());
        }

        let family = self.descriptor.family;
        if self.descriptor.model_paths.is_empty() {
            return Err(InitializationError::NoCandidates(family));
        }

        let mut attempts = 0;
        let mut last_error = None;
        for backend in backend.expand() {
            for path in &self.descriptor.model_paths {
                if self.cancelled.load(Ordering::Acquire) {
                    debug!("{} initialization cancelled after {} attempts", family, attempts);
                    return Err(InitializationError::Cancelled);
                }
                attempts += 1;
                match self.factory.create(path, backend) {
                    Ok(session) => {
                        let info = SessionInfo {
                            backend,
                            model_path: path.clone(),
                        };
                        info!("✅ {} ready: {} on {}", family, path.display(), backend);
                        self.session = Some((session, info.clone()));
                        return Ok(info);
                    }
                    Err(e) => {
                        warn!("⚠️  {} on {} failed: {}", path.display(), backend, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        match last_error {
            Some(last_error) => Err(InitializationError::Exhausted {
                family,
                attempts,
                last_error,
            }),
            None => Err(InitializationError::NoCandidates(family)),
        }
    }

    fn detect(&mut self, frame: &Frame) -> DetectionReply {
        let start = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.pipeline(frame)))
            .unwrap_or_else(|payload| Err(DetectionError::Panicked(panic_message(payload))));
        match result {
            Ok(detections) => {
                let ms = start.elapsed().as_secs_f64() * 1000.0;
                debug!("🔍 {} faces in {:.2}ms", detections.len(), ms);
                DetectionReply::success(detections, ms)
            }
            Err(e) => {
                warn!("❌ {} detection failed: {}", self.descriptor.family, e);
                DetectionReply::failed(e)
            }
        }
    }

    /// 预处理 → 推理 → 解码
    fn pipeline(&mut self, frame: &Frame) -> Result<Vec<models::Detection>, DetectionError> {
        let Some((session, _)) = self.session.as_mut() else {
            return Err(EngineError::Inference("session not initialized".to_string()).into());
        };
        let (input, geometry) = preprocess(frame, &self.descriptor)?;
        let outputs = session.run(&self.descriptor.input_name, &input, &self.output_names)?;
        models::decode(
            &outputs,
            &geometry,
            &self.descriptor,
            self.thresholds.score,
            self.thresholds.nms,
        )
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
