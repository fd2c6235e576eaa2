// 该文件是 Beifeng （北风） 项目的一部分。
// src/tensor.rs - 带步长的张量视图
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

use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("张量视图越界: 最大索引 {max_index}, 数据长度 {len}")]
  OutOfBounds { max_index: usize, len: usize },
  #[error("张量大小不匹配: 期望 {expected}, 实际 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
  #[error("未知张量布局: {0}")]
  UnknownLayout(String),
}

/// 稠密输出在内存中的排布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
  #[default]
  Nhwc,
  Nchw,
}

impl FromStr for Layout {
  type Err = TensorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nhwc" => Ok(Layout::Nhwc),
      "nchw" => Ok(Layout::Nchw),
      other => Err(TensorError::UnknownLayout(other.to_string())),
    }
  }
}

/// 只读的 N 维步长视图：shape + strides + offset
///
/// 构造时检查最大索引不越界，之后 `get` 不再做范围检查之外的工作。
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a, const N: usize> {
  data: &'a [f32],
  shape: [usize; N],
  strides: [usize; N],
  offset: usize,
}

impl<'a, const N: usize> TensorView<'a, N> {
  pub fn new(
    data: &'a [f32],
    shape: [usize; N],
    strides: [usize; N],
    offset: usize,
  ) -> Result<Self, TensorError> {
    if shape.iter().any(|&d| d == 0) {
      return Ok(Self {
        data,
        shape,
        strides,
        offset,
      });
    }
    let max_index = offset
      + shape
        .iter()
        .zip(strides.iter())
        .map(|(&d, &s)| (d - 1) * s)
        .sum::<usize>();
    if max_index >= data.len() {
      return Err(TensorError::OutOfBounds {
        max_index,
        len: data.len(),
      });
    }
    Ok(Self {
      data,
      shape,
      strides,
      offset,
    })
  }

  /// 行优先连续存储，长度必须恰好等于元素个数
  pub fn contiguous(data: &'a [f32], shape: [usize; N]) -> Result<Self, TensorError> {
    let expected = shape.iter().product::<usize>();
    if data.len() != expected {
      return Err(TensorError::SizeMismatch {
        expected,
        actual: data.len(),
      });
    }
    let mut strides = [0usize; N];
    let mut acc = 1;
    for axis in (0..N).rev() {
      strides[axis] = acc;
      acc *= shape[axis];
    }
    Self::new(data, shape, strides, 0)
  }

  pub fn shape(&self) -> [usize; N] {
    self.shape
  }

  pub fn strides(&self) -> [usize; N] {
    self.strides
  }

  #[inline]
  pub fn get(&self, index: [usize; N]) -> f32 {
    debug_assert!(index.iter().zip(self.shape.iter()).all(|(i, d)| i < d));
    let flat = index
      .iter()
      .zip(self.strides.iter())
      .fold(self.offset, |acc, (i, s)| acc + i * s);
    self.data[flat]
  }
}

impl<'a> TensorView<'a, 3> {
  /// 以通道优先 [C, H, W] 的方式访问稠密输出，与内存布局无关
  pub fn channel_major(
    data: &'a [f32],
    layout: Layout,
    height: usize,
    width: usize,
    channels: usize,
  ) -> Result<Self, TensorError> {
    let expected = height * width * channels;
    if data.len() != expected {
      return Err(TensorError::SizeMismatch {
        expected,
        actual: data.len(),
      });
    }
    let strides = match layout {
      Layout::Nhwc => [1, width * channels, channels],
      Layout::Nchw => [height * width, width, 1],
    };
    Self::new(data, [channels, height, width], strides, 0)
  }
}

impl<'a> TensorView<'a, 2> {
  /// 取第 `row` 行作为一维视图
  pub fn row(&self, row: usize) -> TensorView<'a, 1> {
    TensorView {
      data: self.data,
      shape: [self.shape[1]],
      strides: [self.strides[1]],
      offset: self.offset + row * self.strides[0],
    }
  }
}

impl TensorView<'_, 1> {
  pub fn len(&self) -> usize {
    self.shape[0]
  }

  pub fn is_empty(&self) -> bool {
    self.shape[0] == 0
  }

  /// 最大值下标及其值，空视图返回 None；相等时取靠前者
  pub fn argmax(&self) -> Option<(usize, f32)> {
    (0..self.len()).fold(None, |best, i| {
      let v = self.get([i]);
      match best {
        Some((_, bv)) if bv >= v => best,
        _ => Some((i, v)),
      }
    })
  }
}
