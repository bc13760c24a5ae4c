// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/model/postprocess.rs - YOLO 输出解码与 NMS
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::HashMap;

use ndarray::{ArrayViewD, Axis};
use tracing::debug;

use crate::model::{DetectItem, DetectResult, Letterbox, ModelError, WithLabel};

const BBOX_CHANNELS: usize = 4;

/// 交并比，bbox 为 [x_min, y_min, x_max, y_max]
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = inter_w * inter_h;

  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - inter;

  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别分别做非极大值抑制，结果按置信度降序
pub fn nms<T: WithLabel>(items: Vec<DetectItem<T>>, iou_threshold: f32) -> Vec<DetectItem<T>> {
  let mut class_groups: HashMap<u32, Vec<DetectItem<T>>> = HashMap::new();
  for item in items {
    class_groups
      .entry(item.kind.to_label_id())
      .or_default()
      .push(item);
  }

  let mut kept = Vec::new();
  for (_, mut group) in class_groups {
    group.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut suppressed = vec![false; group.len()];
    for i in 0..group.len() {
      if suppressed[i] {
        continue;
      }
      for j in (i + 1)..group.len() {
        if !suppressed[j] && iou(&group[i].bbox, &group[j].bbox) > iou_threshold {
          suppressed[j] = true;
        }
      }
    }

    kept.extend(
      group
        .into_iter()
        .zip(suppressed)
        .filter_map(|(item, suppressed)| (!suppressed).then_some(item)),
    );
  }

  kept.sort_by(|a, b| b.score.total_cmp(&a.score));
  kept
}

/// 解码 `[1, 4 + 类别数, 锚点数]` 形状的 YOLOv8 输出
///
/// 每个锚点取最高类别分数，低于阈值的丢弃，框从模型输入坐标映射回源图像后再做 NMS，
/// 最后按置信度保留前 `max_detections` 个。
pub fn decode_yolo_output<T: WithLabel>(
  output: &ArrayViewD<f32>,
  confidence_threshold: f32,
  iou_threshold: f32,
  max_detections: usize,
  letterbox: &Letterbox,
) -> Result<DetectResult<T>, ModelError> {
  let shape = output.shape();
  if shape.len() != 3 || shape[0] != 1 || shape[1] <= BBOX_CHANNELS {
    return Err(ModelError::UnexpectedOutput(shape.to_vec()));
  }

  let output = output.index_axis(Axis(0), 0);
  let num_classes = shape[1] - BBOX_CHANNELS;
  let num_anchors = shape[2];

  let mut candidates = Vec::new();
  for anchor in 0..num_anchors {
    let column = output.index_axis(Axis(1), anchor);

    let (class_id, score) = (0..num_classes)
      .map(|c| (c, column[BBOX_CHANNELS + c]))
      .filter(|(_, score)| score.is_finite())
      .max_by(|a, b| a.1.total_cmp(&b.1))
      .unwrap_or((0, 0.0));

    if score < confidence_threshold {
      continue;
    }

    let (cx, cy, w, h) = (column[0], column[1], column[2], column[3]);
    if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
      continue;
    }

    let bbox = letterbox.to_source([
      cx - w / 2.0,
      cy - h / 2.0,
      cx + w / 2.0,
      cy + h / 2.0,
    ]);

    candidates.push(DetectItem {
      kind: T::from_label_id(class_id as u32),
      score: score.clamp(0.0, 1.0),
      bbox,
    });
  }

  debug!("阈值过滤后候选框 {} 个", candidates.len());
  let mut items = nms(candidates, iou_threshold);
  debug!("NMS 后保留 {} 个", items.len());
  items.truncate(max_detections);

  Ok(DetectResult {
    items: items.into_boxed_slice(),
  })
}

#[cfg(test)]
mod tests {
  use ndarray::Array3;

  use super::*;
  use crate::model::PpeLabel;

  fn item(kind: PpeLabel, score: f32, bbox: [f32; 4]) -> DetectItem<PpeLabel> {
    DetectItem { kind, score, bbox }
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn nms_keeps_best_of_same_class_overlap() {
    // IoU ≈ 0.82
    let kept = nms(
      vec![
        item(PpeLabel::Hardhat, 0.6, [0.0, 0.0, 10.0, 10.0]),
        item(PpeLabel::Hardhat, 0.9, [0.5, 0.5, 10.5, 10.5]),
      ],
      0.7,
    );
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].score, 0.9);
  }

  #[test]
  fn nms_keeps_adjacent_people_below_iou_threshold() {
    // 两个相邻的人，IoU = 70 / 130 ≈ 0.54
    let a = [0.0, 0.0, 10.0, 10.0];
    let b = [3.0, 0.0, 13.0, 10.0];
    assert!((iou(&a, &b) - 70.0 / 130.0).abs() < 1e-6);
    let kept = nms(
      vec![
        item(PpeLabel::Person, 0.9, a),
        item(PpeLabel::Person, 0.8, b),
      ],
      0.7,
    );
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn nms_keeps_overlapping_boxes_of_different_classes() {
    let kept = nms(
      vec![
        item(PpeLabel::Person, 0.8, [0.0, 0.0, 10.0, 10.0]),
        item(PpeLabel::NoHardhat, 0.7, [0.0, 0.0, 10.0, 10.0]),
      ],
      0.45,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].kind, PpeLabel::Person);
  }

  #[test]
  fn decodes_anchors_above_threshold() {
    // 2 个类别、3 个锚点，模型输入 100x100，源图像同尺寸
    let mut raw = Array3::<f32>::zeros((1, 6, 3));
    // 锚点 0: 类别 1（Gloves）分数 0.8
    raw[[0, 0, 0]] = 50.0;
    raw[[0, 1, 0]] = 50.0;
    raw[[0, 2, 0]] = 20.0;
    raw[[0, 3, 0]] = 40.0;
    raw[[0, 5, 0]] = 0.8;
    // 锚点 1: 分数 0.2，低于阈值
    raw[[0, 4, 1]] = 0.2;
    raw[[0, 2, 1]] = 10.0;
    raw[[0, 3, 1]] = 10.0;
    // 锚点 2: 分数恰好等于阈值
    raw[[0, 0, 2]] = 10.0;
    raw[[0, 1, 2]] = 10.0;
    raw[[0, 2, 2]] = 4.0;
    raw[[0, 3, 2]] = 4.0;
    raw[[0, 4, 2]] = 0.3;

    let letterbox = Letterbox::new(100, 100, 100);
    let result: DetectResult<PpeLabel> =
      decode_yolo_output(&raw.view().into_dyn(), 0.3, 0.7, 300, &letterbox).unwrap();

    assert_eq!(result.items.len(), 2);
    let first = &result.items[0];
    assert_eq!(first.kind, PpeLabel::Gloves);
    assert!((first.score - 0.8).abs() < 1e-6);
    let expected = [0.4, 0.3, 0.6, 0.7];
    for (got, want) in first.bbox.iter().zip(expected) {
      assert!((got - want).abs() < 1e-5);
    }
    assert_eq!(result.items[1].kind, PpeLabel::FallDetected);
    assert!(result.items.iter().all(|d| d.score >= 0.3 && d.score <= 1.0));
  }

  #[test]
  fn keeps_at_most_max_detections() {
    // 1 个类别、5 个互不重叠的锚点，分数依次升高
    let mut raw = Array3::<f32>::zeros((1, 5, 5));
    for anchor in 0..5 {
      raw[[0, 0, anchor]] = 10.0 + anchor as f32 * 20.0;
      raw[[0, 1, anchor]] = 50.0;
      raw[[0, 2, anchor]] = 10.0;
      raw[[0, 3, anchor]] = 10.0;
      raw[[0, 4, anchor]] = 0.5 + anchor as f32 * 0.1;
    }

    let letterbox = Letterbox::new(100, 100, 100);
    let result: DetectResult<PpeLabel> =
      decode_yolo_output(&raw.view().into_dyn(), 0.3, 0.7, 3, &letterbox).unwrap();
    assert_eq!(result.items.len(), 3);
    assert!((result.items[0].score - 0.9).abs() < 1e-6);
    assert!((result.items[2].score - 0.7).abs() < 1e-6);
  }

  #[test]
  fn rejects_unexpected_output_shape() {
    let raw = Array3::<f32>::zeros((1, 3, 10));
    let letterbox = Letterbox::new(10, 10, 10);
    let result: Result<DetectResult<PpeLabel>, _> =
      decode_yolo_output(&raw.view().into_dyn(), 0.3, 0.7, 300, &letterbox);
    assert!(matches!(result, Err(ModelError::UnexpectedOutput(_))));
  }
}
