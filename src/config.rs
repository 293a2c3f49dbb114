// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 检测器配置 - JSON 配置文件 + 命令行参数覆盖

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::Backend;
use crate::error::ConfigError;
use crate::models::{ModelFamily, ModelRegistry};
use crate::worker::WorkerConfig;

/// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "多模型人脸检测 (ONNX Runtime)", long_about = None)]
pub struct Args {
    /// 配置文件路径 (不存在时创建默认配置)
    #[arg(long, default_value = "multiface.json")]
    pub config: PathBuf,

    /// 模型族: auto / yolo / scrfd / centerface
    #[arg(short, long, default_value = "auto")]
    pub model: String,

    /// 执行后端: tensorrt / cuda / cpu, 失败时自动降级
    #[arg(short, long)]
    pub backend: Option<Backend>,

    /// GPU 设备号
    #[arg(long)]
    pub device_id: Option<i32>,

    /// 模型文件目录
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// NMS IOU阈值
    #[arg(long)]
    pub iou: Option<f32>,

    /// 初始化超时 (毫秒)
    #[arg(long)]
    pub init_timeout_ms: Option<u64>,

    /// 单帧检测超时 (毫秒)
    #[arg(long)]
    pub detect_timeout_ms: Option<u64>,

    /// 输入图片
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

impl Args {
    /// `auto` 返回 None, 表示按优先级自动选择
    pub fn model_family(&self) -> Result<Option<ModelFamily>, String> {
        if self.model.eq_ignore_ascii_case("auto") {
            Ok(None)
        } else {
            self.model.parse().map(Some)
        }
    }
}

/// 检测器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // === 模型 ===
    pub model_dir: PathBuf,          // 模型文件目录
    pub priority: Vec<ModelFamily>,  // 自动选择顺序, 质量从高到低
    pub baseline: ModelFamily,       // 切换失败时的兜底模型

    // === 推理后端 ===
    pub backend: Backend, // 首选后端
    pub device_id: i32,   // GPU 设备号
    pub intra_threads: usize,

    // === 检测参数 (不设置则使用各模型默认值) ===
    pub score_threshold: Option<f32>,
    pub nms_threshold: Option<f32>,

    // === 超时 (毫秒, 不设置则一直等待) ===
    pub init_timeout_ms: Option<u64>,
    pub detect_timeout_ms: Option<u64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            priority: vec![ModelFamily::Yolo, ModelFamily::Scrfd, ModelFamily::CenterFace],
            baseline: ModelFamily::CenterFace,

            backend: Backend::TensorRt,
            device_id: 0,
            intra_threads: 4,

            score_threshold: None,
            nms_threshold: None,

            init_timeout_ms: None,
            detect_timeout_ms: None,
        }
    }
}

impl DetectorConfig {
    /// 从JSON文件加载配置, 文件不存在时写入默认配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let config = serde_json::from_str(&json)?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 命令行参数覆盖配置文件
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(backend) = args.backend {
            self.backend = backend;
        }
        if let Some(device_id) = args.device_id {
            self.device_id = device_id;
        }
        if let Some(dir) = &args.model_dir {
            self.model_dir = dir.clone();
        }
        if args.conf.is_some() {
            self.score_threshold = args.conf;
        }
        if args.iou.is_some() {
            self.nms_threshold = args.iou;
        }
        if args.init_timeout_ms.is_some() {
            self.init_timeout_ms = args.init_timeout_ms;
        }
        if args.detect_timeout_ms.is_some() {
            self.detect_timeout_ms = args.detect_timeout_ms;
        }
    }

    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::with_model_dir(&self.model_dir)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            init_timeout: self.init_timeout_ms.map(Duration::from_millis),
            detect_timeout: self.detect_timeout_ms.map(Duration::from_millis),
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前检测配置:");
        info!("  模型目录: {}", self.model_dir.display());
        info!("  优先级: {:?} (兜底: {})", self.priority, self.baseline);
        info!("  后端: {} (设备 {})", self.backend, self.device_id);
        if let Some(conf) = self.score_threshold {
            info!("  置信度阈值: {:.2}", conf);
        }
        if let Some(iou) = self.nms_threshold {
            info!("  NMS阈值: {:.2}", iou);
        }
    }
}
