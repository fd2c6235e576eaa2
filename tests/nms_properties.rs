// 该文件是 Beifeng （北风） 项目的一部分。
// tests/nms_properties.rs - NMS 性质测试
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


use beifeng::{
  model::Detection,
  nms::{ClassMode, iou, nms},
};

fn lcg(seed: &mut u32) -> f32 {
  *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
  (*seed >> 8) as f32 / (1u32 << 24) as f32
}

fn candidates(count: usize, classes: u32, seed: u32) -> Vec<Detection> {
  let mut seed = seed;
  (0..count)
    .map(|i| Detection {
      cx: lcg(&mut seed),
      cy: lcg(&mut seed),
      w: 0.05 + lcg(&mut seed) * 0.3,
      h: 0.05 + lcg(&mut seed) * 0.3,
      class_id: i as u32 % classes,
      confidence: lcg(&mut seed),
    })
    .collect()
}

#[test]
fn output_is_sorted_subset() {
  let input = candidates(64, 1, 42);
  let out = nms(input.clone(), 0.45, ClassMode::Global);
  assert!(out.len() <= input.len());
  assert!(!out.is_empty());
  for det in &out {
    assert!(input.contains(det));
  }
  for pair in out.windows(2) {
    assert!(pair[0].confidence >= pair[1].confidence);
  }
}

#[test]
fn no_kept_pair_overlaps_above_threshold() {
  for (mode, classes) in [(ClassMode::Global, 1), (ClassMode::PerClass, 3)] {
    let out = nms(candidates(80, classes, 9), 0.3, mode);
    for (i, a) in out.iter().enumerate() {
      for b in &out[i + 1..] {
        if mode == ClassMode::Global || a.class_id == b.class_id {
          assert!(iou(a, b) < 0.3);
        }
      }
    }
  }
}

#[test]
fn second_pass_changes_nothing() {
  let once = nms(candidates(50, 2, 3), 0.5, ClassMode::PerClass);
  let twice = nms(once.clone(), 0.5, ClassMode::PerClass);
  assert_eq!(once, twice);
}

#[test]
fn disjoint_boxes_all_survive() {
  let input = (0..4)
    .map(|i| Detection {
      cx: 0.125 + 0.25 * i as f32,
      cy: 0.5,
      w: 0.2,
      h: 0.2,
      class_id: 0,
      confidence: 0.5 + 0.1 * i as f32,
    })
    .collect::<Vec<_>>();
  assert_eq!(nms(input, 0.1, ClassMode::Global).len(), 4);
}
