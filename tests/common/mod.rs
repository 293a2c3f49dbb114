// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 测试用的假推理引擎: 统计存活会话与推理次数, 可按模型名/后端注入失败

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ndarray::{Array, IxDyn};

use multiface_rs::engine::{InferenceSession, SessionFactory};
use multiface_rs::models::TensorMap;
use multiface_rs::{Backend, EngineError, Frame};

#[derive(Default)]
pub struct Counters {
    pub runs: AtomicUsize,
    pub live: Mutex<HashMap<PathBuf, usize>>,
    pub attempts: Mutex<Vec<(PathBuf, Backend)>>,
}

impl Counters {
    pub fn live_total(&self) -> usize {
        self.live.lock().unwrap().values().sum()
    }

    pub fn live_for(&self, name: &str) -> usize {
        self.live
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.to_string_lossy().contains(name))
            .map(|(_, n)| *n)
            .sum()
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> Vec<(PathBuf, Backend)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub counters: Arc<Counters>,
    /// 文件名包含这些字符串的模型创建失败
    pub failing_models: Vec<&'static str>,
    pub failing_backends: Vec<Backend>,
    pub run_delay: Option<Duration>,
    /// 每次创建会话前的耗时 (模拟加载慢的模型)
    pub create_delay: Option<Duration>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_models(mut self, names: &[&'static str]) -> Self {
        self.failing_models = names.to_vec();
        self
    }

    pub fn failing_backends(mut self, backends: &[Backend]) -> Self {
        self.failing_backends = backends.to_vec();
        self
    }

    pub fn run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = Some(delay);
        self
    }

    pub fn create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }
}

impl SessionFactory for FakeFactory {
    fn create(
        &self,
        model_path: &Path,
        backend: Backend,
    ) -> Result<Box<dyn InferenceSession>, EngineError> {
        self.counters
            .attempts
            .lock()
            .unwrap()
            .push((model_path.to_path_buf(), backend));
        if let Some(delay) = self.create_delay {
            std::thread::sleep(delay);
        }

        let name = model_path.to_string_lossy();
        if self.failing_backends.contains(&backend)
            || self.failing_models.iter().any(|m| name.contains(m))
        {
            return Err(EngineError::BackendUnavailable {
                backend,
                model: model_path.to_path_buf(),
                reason: "injected failure".to_string(),
            });
        }

        *self
            .counters
            .live
            .lock()
            .unwrap()
            .entry(model_path.to_path_buf())
            .or_default() += 1;
        Ok(Box::new(FakeSession {
            path: model_path.to_path_buf(),
            counters: Arc::clone(&self.counters),
            delay: self.run_delay,
        }))
    }
}

pub struct FakeSession {
    path: PathBuf,
    counters: Arc<Counters>,
    delay: Option<Duration>,
}

impl InferenceSession for FakeSession {
    fn run(
        &mut self,
        _input_name: &str,
        input: &Array<f32, IxDyn>,
        output_names: &[String],
    ) -> Result<TensorMap, EngineError> {
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let size = input.shape()[2];
        Ok(fake_outputs(output_names, size))
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        let mut live = self.counters.live.lock().unwrap();
        if let Some(n) = live.get_mut(&self.path) {
            *n -= 1;
        }
    }
}

/// 每个模型族输出一个覆盖整个输入的人脸
fn fake_outputs(output_names: &[String], size: usize) -> TensorMap {
    let mut map = TensorMap::new();
    let s = size as f32;
    for name in output_names {
        let tensor = match name.as_str() {
            // YOLO: [1, 5, 1], 中心 + 宽高, letterbox 内整块子图
            "output0" => Array::from_shape_vec(
                IxDyn(&[1, 5, 1]),
                vec![s / 2.0, s / 2.0, s, s / 2.0, 0.9],
            )
            .unwrap(),
            "boxes" => Array::from_shape_vec(
                IxDyn(&[1, 1, 4]),
                vec![0.0, s / 4.0, s, s * 3.0 / 4.0],
            )
            .unwrap(),
            "scores" => Array::from_shape_vec(IxDyn(&[1, 1, 1]), vec![0.8]).unwrap(),
            // CenterFace: stride 4 的热力图, 单个峰值
            "537" => {
                let mut hm: Array<f32, IxDyn> = Array::zeros(IxDyn(&[1, 1, size / 4, size / 4]));
                hm[[0, 0, 10, 10]] = 0.9;
                hm
            }
            "538" => Array::zeros(IxDyn(&[1, 2, size / 4, size / 4])),
            "539" => Array::zeros(IxDyn(&[1, 2, size / 4, size / 4])),
            "540" => Array::zeros(IxDyn(&[1, 10, size / 4, size / 4])),
            _ => continue,
        };
        map.insert(name.clone(), tensor);
    }
    map
}

pub fn frame(width: u32, height: u32) -> Frame {
    Frame::new(width, height, vec![200; (width * height * 4) as usize])
}
