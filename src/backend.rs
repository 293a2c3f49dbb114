// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 执行后端与降级顺序: TensorRT → CUDA → CPU

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 固定降级顺序, 从加速级到纯 CPU
const DEGRADATION_ORDER: [Backend; 3] = [Backend::TensorRt, Backend::Cuda, Backend::Cpu];

/// ONNX Runtime 执行后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[serde(alias = "trt")]
    TensorRt,
    Cuda,
    Cpu,
}

/// 后端所属的加速层级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Accelerated,
    Intermediate,
    Baseline,
}

impl Backend {
    /// 展开为需要依次尝试的后端列表: 从请求的层级开始, 之后按固定顺序降级
    pub fn expand(self) -> Vec<Backend> {
        let start = DEGRADATION_ORDER
            .iter()
            .position(|b| *b == self)
            .unwrap_or(0);
        DEGRADATION_ORDER[start..].to_vec()
    }

    pub fn tier(self) -> Tier {
        match self {
            Backend::TensorRt => Tier::Accelerated,
            Backend::Cuda => Tier::Intermediate,
            Backend::Cpu => Tier::Baseline,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::TensorRt => "tensorrt",
            Backend::Cuda => "cuda",
            Backend::Cpu => "cpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tensorrt" | "trt" => Ok(Backend::TensorRt),
            "cuda" => Ok(Backend::Cuda),
            "cpu" => Ok(Backend::Cpu),
            other => Err(format!("unknown backend '{}' (tensorrt | cuda | cpu)", other)),
        }
    }
}
