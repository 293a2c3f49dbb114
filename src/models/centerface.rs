// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// CenterFace 热力图解码
// heatmap [1,1,H,W], scale [1,2,H,W], offset [1,2,H,W], landmarks [1,10,H,W]

use ndarray::{ArrayView4, Ix4};

use super::descriptor::HeatmapBindings;
use super::{output, BoundingBox, Detection, Point2, TensorMap};
use crate::error::DetectionError;
use crate::preprocess::FrameGeometry;

const NUM_LANDMARKS: usize = 5;

fn view4<'a>(
    outputs: &'a TensorMap,
    name: &str,
    channels: usize,
) -> Result<ArrayView4<'a, f32>, DetectionError> {
    let shape_err = |shape: &[usize]| DetectionError::Shape {
        name: name.to_string(),
        shape: shape.to_vec(),
        expected: "[1, C, H, W]",
    };
    let t = output(outputs, name)?;
    let v = t
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| shape_err(t.shape()))?;
    if v.shape()[0] != 1 || v.shape()[1] < channels {
        return Err(shape_err(t.shape()));
    }
    Ok(v)
}

/// 热力图解码, 分数严格大于阈值才保留, 结果未做 NMS
pub fn decode(
    outputs: &TensorMap,
    geometry: &FrameGeometry,
    bindings: &HeatmapBindings,
    score_threshold: f32,
) -> Result<Vec<Detection>, DetectionError> {
    let heatmap = view4(outputs, &bindings.heatmap, 1)?;
    let scale = view4(outputs, &bindings.scale, 2)?;
    let offset = view4(outputs, &bindings.offset, 2)?;
    let landmarks = match &bindings.landmarks {
        Some(name) => Some(view4(outputs, name, NUM_LANDMARKS * 2)?),
        None => None,
    };

    let (h, w) = (heatmap.shape()[2], heatmap.shape()[3]);
    for (name, v) in [(&bindings.scale, &scale), (&bindings.offset, &offset)] {
        if v.shape()[2] != h || v.shape()[3] != w {
            return Err(DetectionError::Shape {
                name: name.clone(),
                shape: v.shape().to_vec(),
                expected: "same spatial size as heatmap",
            });
        }
    }
    if let (Some(name), Some(lm)) = (&bindings.landmarks, &landmarks) {
        if lm.shape()[2] != h || lm.shape()[3] != w {
            return Err(DetectionError::Shape {
                name: name.clone(),
                shape: lm.shape().to_vec(),
                expected: "same spatial size as heatmap",
            });
        }
    }

    let stride = bindings.stride;
    let in_size = geometry.input_size as f32;
    let mut detections = Vec::new();

    for i in 0..h {
        for j in 0..w {
            let score = heatmap[[0, 0, i, j]];
            if !(score > score_threshold) {
                continue;
            }

            let s0 = scale[[0, 0, i, j]].exp() * stride;
            let s1 = scale[[0, 1, i, j]].exp() * stride;
            let o0 = offset[[0, 0, i, j]];
            let o1 = offset[[0, 1, i, j]];

            // 输入坐标系, 裁剪到输入边界
            let x1 = ((j as f32 + o1 + 0.5) * stride - s1 / 2.0).max(0.0).min(in_size);
            let y1 = ((i as f32 + o0 + 0.5) * stride - s0 / 2.0).max(0.0).min(in_size);
            let x2 = (x1 + s1).min(in_size);
            let y2 = (y1 + s0).min(in_size);

            let (fx1, fy1) = geometry.to_frame(x1, y1);
            let (fx2, fy2) = geometry.to_frame(x2, y2);
            if !(fx2 > fx1 && fy2 > fy1) || ![fx1, fy1, fx2, fy2].iter().all(|v| v.is_finite())
            {
                continue;
            }
            let bbox = BoundingBox::new(fx1, fy1, fx2, fy2, score);

            let detection = match &landmarks {
                Some(lm) => {
                    let points = (0..NUM_LANDMARKS)
                        .map(|k| {
                            let lx = lm[[0, 2 * k + 1, i, j]] * s1 + x1;
                            let ly = lm[[0, 2 * k, i, j]] * s0 + y1;
                            let (x, y) = geometry.to_frame(lx, ly);
                            Point2::new(x, y)
                        })
                        .collect();
                    Detection::with_landmarks(bbox, points)
                }
                None => Detection::new(bbox),
            };
            detections.push(detection);
        }
    }

    Ok(detections)
}
