// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 多模型人脸检测: cargo run --release --bin multiface -- --backend cuda images/*.jpg
// 每张图片输出一行 JSON

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use multiface_rs::{Args, DetectorConfig, Frame, MultiModelDetector, OrtSessionFactory};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let family = args.model_family().map_err(|e| anyhow!(e))?;

    let mut config = DetectorConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    config.apply_args(&args);
    config.print_summary();

    let factory = Arc::new(OrtSessionFactory::new(config.device_id, config.intra_threads));
    let mut detector = MultiModelDetector::from_config(&config, factory);

    let active = match family {
        Some(family) => detector.switch_model(family, config.backend)?,
        None => detector.auto_select(config.backend)?,
    };
    if let Some(session) = detector.session() {
        info!(
            "🚀 {} 就绪: {} ({})",
            active,
            session.model_path.display(),
            session.backend
        );
    }

    for path in &args.inputs {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                error!("❌ 无法读取 {}: {}", path.display(), e);
                continue;
            }
        };
        let reply = detector.detect(Frame::from_image(&img))?;
        if let Some(e) = &reply.error {
            error!("❌ {} 检测失败: {}", path.display(), e);
        } else {
            info!(
                "🔍 {}: {} 张人脸, {:.2}ms",
                path.display(),
                reply.face_count,
                reply.detection_time
            );
        }
        let line = serde_json::json!({
            "image": path,
            "model": active,
            "result": reply,
        });
        println!("{}", line);
    }

    detector.destroy();
    Ok(())
}
