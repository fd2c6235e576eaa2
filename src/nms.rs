// 该文件是 Beifeng （北风） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::model::Detection;

const MIN_UNION: f32 = 1e-6;

/// IoU 比较的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassMode {
  /// 所有检测互相比较（单类模型）
  #[default]
  Global,
  /// 只比较同类检测（多类模型）
  PerClass,
}

/// 两个中心点形式检测的交并比
pub fn iou(a: &Detection, b: &Detection) -> f32 {
  let [ax1, ay1, ax2, ay2] = a.corners();
  let [bx1, by1, bx2, by2] = b.corners();

  let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
  let ih = (ay2.min(by2) - ay1.max(by1)).max(0.0);
  let intersection = iw * ih;
  let union = a.area() + b.area() - intersection;

  intersection / union.max(MIN_UNION)
}

/// 贪心 NMS，原地进行
///
/// 按置信度降序排列后逐个扫描；候选与所有已接受检测的 IoU 都小于阈值时保留，
/// 否则永久丢弃。结果保持置信度降序。
pub fn nms_in_place(detections: &mut Vec<Detection>, iou_threshold: f32, mode: ClassMode) {
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let before = detections.len();
  let mut kept = 0;
  for i in 0..detections.len() {
    let candidate = detections[i];
    let accepted = detections[..kept].iter().all(|k| {
      (mode == ClassMode::PerClass && k.class_id != candidate.class_id)
        || iou(k, &candidate) < iou_threshold
    });
    if accepted {
      detections.swap(kept, i);
      kept += 1;
    }
  }
  detections.truncate(kept);

  debug!("NMS: {} → {}", before, kept);
}

pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32, mode: ClassMode) -> Vec<Detection> {
  nms_in_place(&mut detections, iou_threshold, mode);
  detections
}
