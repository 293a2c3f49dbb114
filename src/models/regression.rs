// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 回归式解码 (YOLO 单输出 / SCRFD boxes+scores)
// 候选框 → 过滤分数 → 中心转角点 → 去 letterbox → 裁剪到原图

use ndarray::{Axis, Ix3};

use super::descriptor::{BoxEncoding, RegressionBindings, RegressionLayout};
use super::{output, BoundingBox, Detection, TensorMap};
use crate::error::DetectionError;
use crate::preprocess::FrameGeometry;

const BOX_DIMS: usize = 4;

/// 回归式解码, 分数严格大于阈值才保留, 结果未做 NMS
pub fn decode(
    outputs: &TensorMap,
    geometry: &FrameGeometry,
    bindings: &RegressionBindings,
    score_threshold: f32,
) -> Result<Vec<Detection>, DetectionError> {
    let mut detections = Vec::new();
    let mut push = |raw: [f32; 4], score: f32| {
        if !(score > score_threshold) {
            return;
        }
        if let Some(bbox) = to_frame_box(raw, score, bindings.encoding, geometry) {
            detections.push(Detection::new(bbox));
        }
    };

    match &bindings.layout {
        RegressionLayout::Fused {
            output: name,
            score_index,
            channels_first,
        } => {
            let t = output(outputs, name)?;
            let shape_err = || DetectionError::Shape {
                name: name.clone(),
                shape: t.shape().to_vec(),
                expected: "[1, C, N] or [1, N, C] with C > score index",
            };
            let v = t
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|_| shape_err())?;
            let preds = v.index_axis(Axis(0), 0);
            let preds = if *channels_first {
                preds.reversed_axes()
            } else {
                preds
            };
            if preds.shape()[1] <= (*score_index).max(BOX_DIMS - 1) {
                return Err(shape_err());
            }
            for pred in preds.outer_iter() {
                push([pred[0], pred[1], pred[2], pred[3]], pred[*score_index]);
            }
        }
        RegressionLayout::Split {
            boxes,
            scores,
            score_index,
        } => {
            let b = output(outputs, boxes)?;
            let s = output(outputs, scores)?;
            if b.shape().last() != Some(&BOX_DIMS) {
                return Err(DetectionError::Shape {
                    name: boxes.clone(),
                    shape: b.shape().to_vec(),
                    expected: "[.., N, 4]",
                });
            }
            let k = s.shape().last().copied().unwrap_or(0);
            if s.ndim() != b.ndim() || k <= *score_index {
                return Err(DetectionError::Shape {
                    name: scores.clone(),
                    shape: s.shape().to_vec(),
                    expected: "[.., N, k] with boxes' rank and k > score index",
                });
            }

            // 逻辑顺序展开, 与内存布局无关
            let box_data: Vec<f32> = b.iter().copied().collect();
            let score_data: Vec<f32> = s.iter().copied().collect();
            for (raw, row) in box_data
                .chunks_exact(BOX_DIMS)
                .zip(score_data.chunks_exact(k))
            {
                push([raw[0], raw[1], raw[2], raw[3]], row[*score_index]);
            }
        }
    }

    Ok(detections)
}

/// 输入坐标的原始框 → 原图坐标, 退化或非有限值返回 None
fn to_frame_box(
    raw: [f32; 4],
    score: f32,
    encoding: BoxEncoding,
    geometry: &FrameGeometry,
) -> Option<BoundingBox> {
    let [a, b, c, d] = raw;
    let (x1, y1, x2, y2) = match encoding {
        BoxEncoding::Corner => (a, b, c, d),
        BoxEncoding::Center => (a - c / 2.0, b - d / 2.0, a + c / 2.0, b + d / 2.0),
    };

    let (x1, y1) = geometry.to_frame(x1, y1);
    let (x2, y2) = geometry.to_frame(x2, y2);
    if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
        return None;
    }

    let w = geometry.frame_width as f32;
    let h = geometry.frame_height as f32;
    let x1 = x1.clamp(0.0, w);
    let y1 = y1.clamp(0.0, h);
    let x2 = x2.clamp(0.0, w);
    let y2 = y2.clamp(0.0, h);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(BoundingBox::new(x1, y1, x2, y2, score))
}
