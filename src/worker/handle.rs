// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 调度器侧的工作线程句柄
// 请求带递增 id, 回复 id 不匹配的一律丢弃 (超时或已放弃的请求)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use super::protocol::{DetectionReply, SessionInfo, WorkerReply, WorkerRequest};
use super::runtime::WorkerRuntime;
use super::{DetectionWorker, Thresholds, WorkerConfig, WorkerState};
use crate::backend::Backend;
use crate::engine::SessionFactory;
use crate::error::{DetectionError, InitializationError, StateError};
use crate::frame::Frame;
use crate::models::{ModelDescriptor, ModelFamily};

pub struct ModelWorker {
    family: ModelFamily,
    config: WorkerConfig,
    requests: Sender<WorkerRequest>,
    replies: Receiver<WorkerReply>,
    thread: Option<JoinHandle<()>>,
    state: WorkerState,
    session: Option<SessionInfo>,
    announced: bool, // 已收到 Ready
    cancelled: Arc<AtomicBool>,
    next_id: AtomicU64,
    in_flight: AtomicBool,
}

impl ModelWorker {
    /// 启动工作线程, 状态为 Uninitialized
    pub fn spawn(
        descriptor: ModelDescriptor,
        factory: Arc<dyn SessionFactory>,
        config: WorkerConfig,
    ) -> Result<Self, InitializationError> {
        let family = descriptor.family;
        let thresholds = Thresholds::new(
            config.score_threshold.unwrap_or(descriptor.score_threshold),
            config.nms_threshold.unwrap_or(descriptor.nms_threshold),
        );

        let cancelled = Arc::new(AtomicBool::new(false));
        let (req_tx, req_rx) = crossbeam_channel::unbounded();
        let (rep_tx, rep_rx) = crossbeam_channel::unbounded();
        let runtime = WorkerRuntime::new(
            descriptor,
            factory,
            thresholds,
            Arc::clone(&cancelled),
            req_rx,
            rep_tx,
        );

        let thread = thread::Builder::new()
            .name(format!("{}-worker", family))
            .spawn(move || runtime.run())
            .map_err(|e| InitializationError::Spawn(e.to_string()))?;

        debug!("🧵 {} worker spawned", family);
        Ok(Self {
            family,
            config,
            requests: req_tx,
            replies: rep_rx,
            thread: Some(thread),
            state: WorkerState::Uninitialized,
            session: None,
            announced: false,
            cancelled,
            next_id: AtomicU64::new(1),
            in_flight: AtomicBool::new(false),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn recv(&self, deadline: Option<Instant>) -> Result<WorkerReply, RecvTimeoutError> {
        match deadline {
            Some(deadline) => self.replies.recv_deadline(deadline),
            None => self
                .replies
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        }
    }

    fn init_error(&self, e: RecvTimeoutError) -> InitializationError {
        match e {
            RecvTimeoutError::Timeout => {
                InitializationError::Timeout(self.config.init_timeout.unwrap_or_default())
            }
            RecvTimeoutError::Disconnected => InitializationError::WorkerGone,
        }
    }

    /// 等待线程发出 Ready, 之后才能发送 Initialize
    fn wait_ready(&mut self, deadline: Option<Instant>) -> Result<(), InitializationError> {
        while !self.announced {
            match self.recv(deadline) {
                Ok(WorkerReply::Ready) => self.announced = true,
                Ok(_) => continue,
                Err(e) => return Err(self.init_error(e)),
            }
        }
        Ok(())
    }

    fn request_session(&mut self, backend: Backend) -> Result<SessionInfo, InitializationError> {
        let deadline = self.config.init_timeout.map(|t| Instant::now() + t);
        self.wait_ready(deadline)?;

        let id = self.next_id();
        self.requests
            .send(WorkerRequest::Initialize { id, backend })
            .map_err(|_| InitializationError::WorkerGone)?;

        loop {
            match self.recv(deadline) {
                Ok(WorkerReply::Initialized { id: reply_id, result }) if reply_id == id => {
                    return result
                }
                Ok(_) => debug!("{} discarding stale reply", self.family),
                Err(e) => return Err(self.init_error(e)),
            }
        }
    }

    fn request_detection(&self, frame: Frame) -> DetectionReply {
        let deadline = self.config.detect_timeout.map(|t| Instant::now() + t);
        let id = self.next_id();
        if self
            .requests
            .send(WorkerRequest::Detect { id, frame })
            .is_err()
        {
            return DetectionReply::failed(DetectionError::WorkerGone);
        }

        loop {
            match self.recv(deadline) {
                Ok(WorkerReply::Detection { id: reply_id, reply }) if reply_id == id => {
                    return reply
                }
                Ok(_) => debug!("{} discarding stale reply", self.family),
                Err(RecvTimeoutError::Timeout) => {
                    let timeout = self.config.detect_timeout.unwrap_or(Duration::ZERO);
                    return DetectionReply::failed(DetectionError::Timeout(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return DetectionReply::failed(DetectionError::WorkerGone)
                }
            }
        }
    }
}

impl DetectionWorker for ModelWorker {
    fn family(&self) -> ModelFamily {
        self.family
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    fn initialize(&mut self, backend: Backend) -> Result<SessionInfo, InitializationError> {
        match (self.state, &self.session) {
            (WorkerState::Terminated, _) => return Err(StateError::Terminated.into()),
            (WorkerState::Ready, Some(info)) => return Ok(info.clone()),
            _ => {}
        }

        info!("🚀 initializing {} (backend: {})", self.family, backend);
        self.state = WorkerState::Initializing;
        let result = self.request_session(backend);
        match &result {
            Ok(info) => {
                self.state = WorkerState::Ready;
                self.session = Some(info.clone());
            }
            Err(e) => {
                warn!("❌ {} initialization failed: {}", self.family, e);
                self.state = WorkerState::Failed;
            }
        }
        result
    }

    fn detect(&self, frame: Frame) -> Result<DetectionReply, StateError> {
        match self.state {
            WorkerState::Ready => {}
            WorkerState::Terminated => return Err(StateError::Terminated),
            state => return Err(StateError::NotReady(state)),
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StateError::DetectInFlight);
        }

        let reply = self.request_detection(frame);
        self.in_flight.store(false, Ordering::Release);
        Ok(reply)
    }

    fn update_thresholds(&self, thresholds: Thresholds) -> Result<(), StateError> {
        if self.state == WorkerState::Terminated {
            return Err(StateError::Terminated);
        }
        self.requests
            .send(WorkerRequest::UpdateThresholds(thresholds))
            .map_err(|_| StateError::Terminated)
    }

    fn destroy(&mut self) {
        if self.state == WorkerState::Terminated {
            return;
        }
        // 中断初始化循环, 最多等待一次正在进行的会话创建; 在途请求的回复直接丢弃
        self.cancelled.store(true, Ordering::Release);
        let _ = self.requests.send(WorkerRequest::Destroy);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("⚠️  {} worker thread panicked", self.family);
            }
        }
        self.state = WorkerState::Terminated;
        self.session = None;
        info!("🛑 {} worker terminated", self.family);
    }

    fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }
}

impl Drop for ModelWorker {
    fn drop(&mut self) {
        self.destroy();
    }
}
