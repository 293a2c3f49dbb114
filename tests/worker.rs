// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{frame, FakeFactory};
use multiface_rs::{
    Backend, DetectionWorker, InitializationError, ModelDescriptor, ModelFamily, ModelWorker,
    StateError, Thresholds, WorkerConfig, WorkerState,
};

fn centerface() -> ModelDescriptor {
    ModelDescriptor::centerface(&PathBuf::from("models"))
}

fn spawn(factory: &Arc<FakeFactory>, config: WorkerConfig) -> ModelWorker {
    ModelWorker::spawn(centerface(), factory.clone(), config).unwrap()
}

#[test]
fn test_detect_before_ready_is_rejected() {
    let factory = Arc::new(FakeFactory::new());
    let worker = spawn(&factory, WorkerConfig::default());

    let err = worker.detect(frame(64, 64)).unwrap_err();
    assert_eq!(err, StateError::NotReady(WorkerState::Uninitialized));
    assert_eq!(factory.counters.runs(), 0);
    assert!(factory.counters.attempts().is_empty());
}

#[test]
fn test_backend_fallback_order() {
    let factory = Arc::new(
        FakeFactory::new().failing_backends(&[Backend::TensorRt, Backend::Cuda]),
    );
    let mut worker = spawn(&factory, WorkerConfig::default());

    let session = worker.initialize(Backend::TensorRt).unwrap();
    assert_eq!(session.backend, Backend::Cpu);
    assert_eq!(session.model_path, PathBuf::from("models/centerface.onnx"));
    assert_eq!(worker.state(), WorkerState::Ready);

    let order: Vec<(String, Backend)> = factory
        .counters
        .attempts()
        .into_iter()
        .map(|(p, b)| (p.file_name().unwrap().to_string_lossy().into_owned(), b))
        .collect();
    assert_eq!(
        order,
        vec![
            ("centerface.onnx".to_string(), Backend::TensorRt),
            ("centerface_mod2.onnx".to_string(), Backend::TensorRt),
            ("centerface.onnx".to_string(), Backend::Cuda),
            ("centerface_mod2.onnx".to_string(), Backend::Cuda),
            ("centerface.onnx".to_string(), Backend::Cpu),
        ]
    );
}

#[test]
fn test_second_path_wins_on_same_backend() {
    let factory = Arc::new(FakeFactory::new().failing_models(&["centerface.onnx"]));
    let mut worker = spawn(&factory, WorkerConfig::default());

    let session = worker.initialize(Backend::Cuda).unwrap();
    assert_eq!(session.backend, Backend::Cuda);
    assert_eq!(session.model_path, PathBuf::from("models/centerface_mod2.onnx"));
}

#[test]
fn test_exhausted_initialization() {
    let factory = Arc::new(FakeFactory::new().failing_models(&["centerface"]));
    let mut worker = spawn(&factory, WorkerConfig::default());

    match worker.initialize(Backend::TensorRt) {
        Err(InitializationError::Exhausted {
            family, attempts, ..
        }) => {
            assert_eq!(family, ModelFamily::CenterFace);
            assert_eq!(attempts, 6);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(worker.state(), WorkerState::Failed);
    assert!(!worker.is_initialized());
    assert_eq!(
        worker.detect(frame(64, 64)).unwrap_err(),
        StateError::NotReady(WorkerState::Failed)
    );
    assert_eq!(factory.counters.runs(), 0);
}

#[test]
fn test_detect_returns_faces_with_landmarks() {
    let factory = Arc::new(FakeFactory::new());
    let mut worker = spawn(&factory, WorkerConfig::default());
    worker.initialize(Backend::Cpu).unwrap();

    let reply = worker.detect(frame(512, 512)).unwrap();
    assert!(reply.is_ok(), "{:?}", reply.error);
    assert_eq!(reply.face_count, 1);
    let b = reply.detections[0];
    assert_eq!((b.x1, b.y1, b.x2, b.y2), (40.0, 40.0, 44.0, 44.0));
    assert_eq!(reply.landmarks.len(), 1);
    assert_eq!(reply.landmarks[0].len(), 5);
    assert!(reply.detection_time >= 0.0);
}

#[test]
fn test_detection_error_keeps_worker_ready() {
    let factory = Arc::new(FakeFactory::new());
    let mut worker = spawn(&factory, WorkerConfig::default());
    worker.initialize(Backend::Cpu).unwrap();

    // 缓冲区长度不对
    let bad = multiface_rs::Frame::new(64, 64, vec![0; 10]);
    let reply = worker.detect(bad).unwrap();
    assert!(reply.error.is_some());
    assert!(reply.detections.is_empty());
    assert_eq!(reply.face_count, 0);
    assert_eq!(worker.state(), WorkerState::Ready);

    let reply = worker.detect(frame(512, 512)).unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.face_count, 1);
}

#[test]
fn test_initialize_twice_reuses_session() {
    let factory = Arc::new(FakeFactory::new());
    let mut worker = spawn(&factory, WorkerConfig::default());
    let first = worker.initialize(Backend::Cuda).unwrap();
    let second = worker.initialize(Backend::TensorRt).unwrap();
    assert_eq!(first, second);
    assert_eq!(factory.counters.attempts().len(), 1);
    assert_eq!(factory.counters.live_total(), 1);
}

#[test]
fn test_destroy_releases_session() {
    let factory = Arc::new(FakeFactory::new());
    let mut worker = spawn(&factory, WorkerConfig::default());
    worker.initialize(Backend::Cpu).unwrap();
    assert_eq!(factory.counters.live_total(), 1);

    worker.destroy();
    assert_eq!(factory.counters.live_total(), 0);
    assert_eq!(worker.state(), WorkerState::Terminated);
    assert!(worker.session().is_none());
    assert_eq!(
        worker.detect(frame(64, 64)).unwrap_err(),
        StateError::Terminated
    );
    assert!(matches!(
        worker.initialize(Backend::Cpu),
        Err(InitializationError::State(StateError::Terminated))
    ));
    // 重复销毁无副作用
    worker.destroy();
}

#[test]
fn test_drop_releases_session() {
    let factory = Arc::new(FakeFactory::new());
    {
        let mut worker = spawn(&factory, WorkerConfig::default());
        worker.initialize(Backend::Cpu).unwrap();
        assert_eq!(factory.counters.live_total(), 1);
    }
    assert_eq!(factory.counters.live_total(), 0);
}

#[test]
fn test_update_thresholds() {
    let factory = Arc::new(FakeFactory::new());
    let mut worker = spawn(&factory, WorkerConfig::default());
    worker.initialize(Backend::Cpu).unwrap();

    // 假模型的峰值为 0.9
    worker.update_thresholds(Thresholds::new(0.95, 0.3)).unwrap();
    let reply = worker.detect(frame(512, 512)).unwrap();
    assert_eq!(reply.face_count, 0);

    worker.update_thresholds(Thresholds::new(0.5, 0.3)).unwrap();
    let reply = worker.detect(frame(512, 512)).unwrap();
    assert_eq!(reply.face_count, 1);
}

#[test]
fn test_overlapping_detect_is_rejected() {
    let factory = Arc::new(FakeFactory::new().run_delay(Duration::from_millis(400)));
    let mut worker = spawn(&factory, WorkerConfig::default());
    worker.initialize(Backend::Cpu).unwrap();
    let worker = Arc::new(worker);

    let busy = {
        let worker = Arc::clone(&worker);
        thread::spawn(move || worker.detect(frame(512, 512)))
    };
    thread::sleep(Duration::from_millis(100));

    assert_eq!(
        worker.detect(frame(512, 512)).unwrap_err(),
        StateError::DetectInFlight
    );
    let first = busy.join().unwrap().unwrap();
    assert_eq!(first.face_count, 1);
    assert_eq!(factory.counters.runs(), 1);

    // 第一个完成后可以继续检测
    assert!(worker.detect(frame(512, 512)).is_ok());
}

#[test]
fn test_detect_timeout_is_reported_in_band() {
    let factory = Arc::new(FakeFactory::new().run_delay(Duration::from_millis(300)));
    let config = WorkerConfig {
        detect_timeout: Some(Duration::from_millis(50)),
        ..WorkerConfig::default()
    };
    let mut worker = spawn(&factory, config);
    worker.initialize(Backend::Cpu).unwrap();

    let reply = worker.detect(frame(512, 512)).unwrap();
    assert!(reply.error.is_some());
    assert_eq!(reply.face_count, 0);
    assert_eq!(worker.state(), WorkerState::Ready);
}

#[test]
fn test_custom_thresholds_from_config() {
    let factory = Arc::new(FakeFactory::new());
    let config = WorkerConfig {
        score_threshold: Some(0.95),
        ..WorkerConfig::default()
    };
    let mut worker = spawn(&factory, config);
    worker.initialize(Backend::Cpu).unwrap();
    assert_eq!(worker.detect(frame(512, 512)).unwrap().face_count, 0);
}

#[test]
fn test_destroy_after_init_timeout_stops_attempts() {
    let factory = Arc::new(
        FakeFactory::new()
            .failing_backends(&[Backend::TensorRt, Backend::Cuda, Backend::Cpu])
            .create_delay(Duration::from_millis(200)),
    );
    let config = WorkerConfig {
        init_timeout: Some(Duration::from_millis(100)),
        ..WorkerConfig::default()
    };
    let mut worker = spawn(&factory, config);

    assert!(matches!(
        worker.initialize(Backend::TensorRt),
        Err(InitializationError::Timeout(_))
    ));
    assert_eq!(worker.state(), WorkerState::Failed);

    // 只等待正在进行的那一次创建, 不再继续剩余的组合
    let start = Instant::now();
    worker.destroy();
    assert!(start.elapsed() < Duration::from_millis(600));
    assert_eq!(factory.counters.attempts().len(), 1);
    assert_eq!(factory.counters.live_total(), 0);
}
