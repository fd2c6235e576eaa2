// 该文件是 Beifeng （北风） 项目的一部分。
// src/quant.rs - 反量化
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

/// 2 的幂缩放量化张量，value = q × 2^exponent
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuantTensor {
  pub data: Vec<i8>,
  pub exponent: i32,
}

impl QuantTensor {
  pub fn new(data: Vec<i8>, exponent: i32) -> Self {
    Self { data, exponent }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn scale(&self) -> f32 {
    2f32.powi(self.exponent)
  }

  /// 反量化到复用的缓冲区
  pub fn dequantize_into(&self, dst: &mut Vec<f32>) {
    dst.resize(self.data.len(), 0.0);
    dequantize(&self.data, self.exponent, dst);
  }
}

/// dst[i] = src[i] × 2^exponent
///
/// `dst` 长度由调用方保证不小于 `src`。
pub fn dequantize(src: &[i8], exponent: i32, dst: &mut [f32]) {
  let scale = 2f32.powi(exponent);
  for (d, &q) in dst.iter_mut().zip(src) {
    *d = f32::from(q) * scale;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scales_by_power_of_two() {
    let mut out = [0.0f32; 4];
    dequantize(&[-128, -1, 0, 127], -4, &mut out);
    assert_eq!(out, [-8.0, -0.0625, 0.0, 7.9375]);
  }

  #[test]
  fn positive_exponent_multiplies() {
    let tensor = QuantTensor::new(vec![3, -2], 2);
    let mut out = Vec::new();
    tensor.dequantize_into(&mut out);
    assert_eq!(out, vec![12.0, -8.0]);
  }

  #[test]
  fn reused_buffer_shrinks_to_input() {
    let mut out = vec![1.0; 10];
    QuantTensor::new(vec![1, 1], 0).dequantize_into(&mut out);
    assert_eq!(out.len(), 2);
  }
}
