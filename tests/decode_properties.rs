// 该文件是 Beifeng （北风） 项目的一部分。
// tests/decode_properties.rs - 解码性质测试
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


use std::sync::Arc;

use beifeng::{
  anchor::AnchorSpec,
  decode::{DecodeBuffers, Decoder, DenseDecoder, DirectDecoder},
  metadata::ModelMetadata,
  model::{Detection, DirectOutput, RawOutput},
  quant::QuantTensor,
  tensor::Layout,
};
use serde_json::json;

fn unit_anchors(count: usize) -> Arc<AnchorSpec> {
  Arc::new(AnchorSpec::new(vec![[1.0, 1.0]; count], vec![[1.0, 1.0]; count]).unwrap())
}

fn lcg(seed: &mut u32) -> i8 {
  *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
  (*seed >> 24) as i8
}

fn decode_dense(
  decoder: &Decoder,
  tensor: &QuantTensor,
  threshold: f32,
) -> Vec<Detection> {
  let mut out = Vec::new();
  decoder
    .decode(
      &RawOutput::Dense(tensor.clone()),
      threshold,
      &mut DecodeBuffers::default(),
      &mut out,
    )
    .unwrap();
  out
}

#[test]
fn single_cell_reference_box() {
  let decoder = Decoder::Dense(DenseDecoder::new(unit_anchors(1), 1, 1, 7, 1, Layout::Nhwc).unwrap());
  let tensor = QuantTensor::new(vec![0, 0, 0, 0, 100, 100, 100], 0);
  let out = decode_dense(&decoder, &tensor, 0.5);

  assert_eq!(out.len(), 1);
  let det = out[0];
  assert!((det.cx - 0.5).abs() < 1e-6);
  assert!((det.cy - 0.5).abs() < 1e-6);
  assert!((det.w - std::f32::consts::LN_2).abs() < 1e-6);
  assert!((det.h - std::f32::consts::LN_2).abs() < 1e-6);
  assert!((det.confidence - 1.0).abs() < 1e-4);
  assert_eq!(det.class_id, 0);
}

#[test]
fn saturated_logits_hit_sigmoid_clamp() {
  let decoder = DenseDecoder::new(unit_anchors(1), 1, 1, 7, 1, Layout::Nhwc).unwrap();
  let mut out = Vec::new();
  decoder
    .decode(&[0.0, 0.0, 0.0, 0.0, 1000.0, 1000.0, 1000.0], 0.5, &mut out)
    .unwrap();

  assert_eq!(out.len(), 1);
  assert_eq!(out[0].confidence, 1.0);
  assert_eq!(out[0].class_id, 0);
  assert!((out[0].cx - 0.5).abs() < 1e-6);
  assert!((out[0].w - std::f32::consts::LN_2).abs() < 1e-6);

  out.clear();
  decoder
    .decode(&[0.0, 0.0, 0.0, 0.0, 1000.0, 1000.0, -1000.0], 0.5, &mut out)
    .unwrap();
  assert!(out.is_empty());
}

#[test]
fn degenerate_prior_box_is_dropped() {
  let zero_width = Arc::new(AnchorSpec::new(vec![[0.0, 1.0]], vec![[1.0, 1.0]]).unwrap());
  let negative_height = Arc::new(AnchorSpec::new(vec![[1.0, -1.0]], vec![[1.0, 1.0]]).unwrap());
  let tensor = QuantTensor::new(vec![0, 0, 0, 0, 100, 100, 100], 0);

  for anchors in [zero_width, negative_height] {
    let decoder = Decoder::Dense(DenseDecoder::new(anchors, 1, 1, 7, 1, Layout::Nhwc).unwrap());
    assert!(decode_dense(&decoder, &tensor, 0.5).is_empty());
  }
}

#[test]
fn padded_single_class_head_ignores_extra_channels() {
  let record = json!({"metadata": {"grid": [1, 1], "channels": 8, "num_classes": 1}});
  let metadata = ModelMetadata::from_json(&record, 1).unwrap();
  let decoder = Decoder::from_metadata(&metadata, unit_anchors(1)).unwrap();
  assert!(!decoder.is_multi_class());

  // 第 7 个通道是填充，类别项取 offset 6
  let suppressed = QuantTensor::new(vec![0, 0, 0, 0, 100, 100, -100, 100], 0);
  assert!(decode_dense(&decoder, &suppressed, 0.5).is_empty());

  let kept = QuantTensor::new(vec![0, 0, 0, 0, 100, 100, 100, -100], 0);
  let out = decode_dense(&decoder, &kept, 0.5);
  assert_eq!(out.len(), 1);
  assert_eq!(out[0].class_id, 0);
}

#[test]
fn class_count_larger_than_channels_is_rejected() {
  let record = json!({"metadata": {"grid": [1, 1], "channels": 8, "num_classes": 3}});
  let metadata = ModelMetadata::from_json(&record, 1).unwrap();
  assert!(Decoder::from_metadata(&metadata, unit_anchors(1)).is_err());
}

#[test]
fn zero_coord_scale_is_rejected() {
  let record = json!({"metadata": {"head": "direct", "slots": 1, "coord_scale": 0.0}});
  assert!(ModelMetadata::from_json(&record, 1).is_err());
  assert!(DirectDecoder::new(1, 1, 0.0).is_err());
}

#[test]
fn low_scores_are_filtered() {
  let decoder = Decoder::Dense(DenseDecoder::new(unit_anchors(1), 1, 1, 7, 1, Layout::Nhwc).unwrap());
  // 三个 logit 为 0 时分数为 0.125
  let tensor = QuantTensor::new(vec![0; 7], 0);
  assert_eq!(decode_dense(&decoder, &tensor, 0.125).len(), 1);
  assert!(decode_dense(&decoder, &tensor, 0.2).is_empty());
}

#[test]
fn raising_threshold_only_removes_detections() {
  let (h, w, anchors) = (4, 4, 2);
  let decoder =
    Decoder::Dense(DenseDecoder::new(unit_anchors(anchors), h, w, anchors * 7, 1, Layout::Nhwc).unwrap());
  let mut seed = 7;
  let data = (0..h * w * anchors * 7).map(|_| lcg(&mut seed)).collect::<Vec<_>>();
  let tensor = QuantTensor::new(data, -4);

  let thresholds = [0.0, 0.05, 0.1, 0.2, 0.4, 0.8];
  for pair in thresholds.windows(2) {
    let low = decode_dense(&decoder, &tensor, pair[0]);
    let high = decode_dense(&decoder, &tensor, pair[1]);
    assert!(high.len() <= low.len());
    for det in &high {
      assert!(low.contains(det));
    }
  }
}

#[test]
fn nchw_layout_reads_same_values() {
  let nhwc = Decoder::Dense(DenseDecoder::new(unit_anchors(1), 1, 2, 7, 1, Layout::Nhwc).unwrap());
  let nchw = Decoder::Dense(DenseDecoder::new(unit_anchors(1), 1, 2, 7, 1, Layout::Nchw).unwrap());
  // 第二个格子是强检测
  let cell_a = [0i8, 0, 0, 0, -100, -100, -100];
  let cell_b = [0i8, 0, 0, 0, 100, 100, 100];
  let channel_major = cell_a.iter().zip(cell_b.iter()).flat_map(|(a, b)| [*a, *b]).collect();
  let pixel_major = cell_a.iter().chain(cell_b.iter()).copied().collect();

  let a = decode_dense(&nhwc, &QuantTensor::new(pixel_major, 0), 0.5);
  let b = decode_dense(&nchw, &QuantTensor::new(channel_major, 0), 0.5);
  assert_eq!(a.len(), 1);
  assert_eq!(a, b);
  assert!((a[0].cx - 0.75).abs() < 1e-6);
}

#[test]
fn multi_class_dense_head_takes_argmax() {
  let decoder = Decoder::Dense(DenseDecoder::new(unit_anchors(1), 1, 1, 9, 3, Layout::Nhwc).unwrap());
  assert!(decoder.is_multi_class());
  let tensor = QuantTensor::new(vec![0, 0, 0, 0, 100, 100, -10, 100, 20], 0);
  let out = decode_dense(&decoder, &tensor, 0.5);
  assert_eq!(out.len(), 1);
  assert_eq!(out[0].class_id, 1);
}

#[test]
fn direct_head_uses_detection_score() {
  let decoder = Decoder::Direct(DirectDecoder::new(3, 2, 64.0).unwrap());
  let output = RawOutput::Direct(DirectOutput {
    // 2^-7 缩放：64 → 0.5，16 → 0.125
    scores: QuantTensor::new(vec![64, 16, 100], -7),
    class_scores: QuantTensor::new(vec![1, 5, 9, 2, 3, 3], 0),
    x1: QuantTensor::new(vec![0, 0, 32], 0),
    y1: QuantTensor::new(vec![16, 0, 32], 0),
    x2: QuantTensor::new(vec![32, 10, 16], 0),
    y2: QuantTensor::new(vec![48, 10, 48], 0),
  });
  let mut out = Vec::new();
  decoder
    .decode(&output, 0.3, &mut DecodeBuffers::default(), &mut out)
    .unwrap();

  // 第二个分数过低，第三个 x2 < x1 退化
  assert_eq!(out.len(), 1);
  let det = out[0];
  assert_eq!(det.class_id, 1);
  assert!((det.confidence - 0.5).abs() < 1e-6);
  assert!((det.cx - 0.25).abs() < 1e-6);
  assert!((det.cy - 0.5).abs() < 1e-6);
  assert!((det.w - 0.5).abs() < 1e-6);
  assert!((det.h - 0.5).abs() < 1e-6);
}

#[test]
fn direct_length_mismatch_is_error() {
  let decoder = Decoder::Direct(DirectDecoder::new(2, 1, 1.0).unwrap());
  let output = RawOutput::Direct(DirectOutput {
    scores: QuantTensor::new(vec![1, 1], 0),
    class_scores: QuantTensor::new(vec![1], 0),
    ..DirectOutput::default()
  });
  assert!(
    decoder
      .decode(&output, 0.1, &mut DecodeBuffers::default(), &mut Vec::new())
      .is_err()
  );
}
