// 该文件是 Beifeng （北风） 项目的一部分。
// src/decode.rs - 检测头解码
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

use thiserror::Error;
use tracing::error;

use crate::{
  anchor::AnchorSpec,
  metadata::{DENSE_BASE_CHANNELS, HeadSpec, ModelMetadata},
  model::{Detection, DirectOutput, RawOutput},
  quant::QuantTensor,
  tensor::{Layout, TensorError, TensorView},
};

const SIGMOID_CLAMP: f32 = 80.0;

/// 截断的 sigmoid，避免 exp 溢出
#[inline]
pub fn clamped_sigmoid(x: f32) -> f32 {
  if x < -SIGMOID_CLAMP {
    0.0
  } else if x > SIGMOID_CLAMP {
    1.0
  } else {
    1.0 / (1.0 + (-x).exp())
  }
}

/// 数值稳定的 softplus：ln(1 + e^-|x|) + max(x, 0)
#[inline]
pub fn softplus(x: f32) -> f32 {
  (-x.abs()).exp().ln_1p() + x.max(0.0)
}

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("通道数 {channels} 不能被锚框数 {anchors} 整除")]
  ChannelAnchorMismatch { channels: usize, anchors: usize },
  #[error("每锚框通道数 {per_anchor} 少于所需的 {required}")]
  TooFewChannels { per_anchor: usize, required: usize },
  #[error("检测头类别数必须大于 0")]
  NoClasses,
  #[error("坐标缩放 {0} 必须为正的有限数")]
  InvalidCoordScale(f32),
  #[error("解码器为 {expected} 检测头, 运行时输出为 {actual}")]
  HeadMismatch {
    expected: &'static str,
    actual: &'static str,
  },
  #[error("输出 {name} 长度不匹配: 期望 {expected}, 实际 {actual}")]
  OutputLength {
    name: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
}

/// 网格 + 锚框稠密解码
#[derive(Debug, Clone)]
pub struct DenseDecoder {
  anchors: Arc<AnchorSpec>,
  height: usize,
  width: usize,
  channels: usize,
  per_anchor: usize,
  num_classes: usize,
  layout: Layout,
}

impl DenseDecoder {
  /// 构造时校验通道步长，配置错误立即失败
  ///
  /// 每锚框前 `6 + num_classes` 个通道有效，其余为填充通道，解码时忽略。
  pub fn new(
    anchors: Arc<AnchorSpec>,
    height: usize,
    width: usize,
    channels: usize,
    num_classes: usize,
    layout: Layout,
  ) -> Result<Self, DecodeError> {
    if num_classes == 0 {
      return Err(DecodeError::NoClasses);
    }
    let count = anchors.len();
    if count == 0 || channels % count != 0 {
      error!("通道数 {} 与锚框数 {} 不匹配", channels, count);
      return Err(DecodeError::ChannelAnchorMismatch {
        channels,
        anchors: count,
      });
    }
    let per_anchor = channels / count;
    let required = DENSE_BASE_CHANNELS + num_classes;
    if per_anchor < required {
      error!("每锚框通道数 {} 容纳不下 {} 个类别", per_anchor, num_classes);
      return Err(DecodeError::TooFewChannels {
        per_anchor,
        required,
      });
    }

    Ok(Self {
      anchors,
      height,
      width,
      channels,
      per_anchor,
      num_classes,
      layout,
    })
  }

  pub fn per_anchor(&self) -> usize {
    self.per_anchor
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn feature_len(&self) -> usize {
    self.height * self.width * self.channels
  }

  /// 以通道优先视图解码整张特征图，追加通过阈值的检测
  pub fn decode(
    &self,
    features: &[f32],
    threshold: f32,
    out: &mut Vec<Detection>,
  ) -> Result<(), DecodeError> {
    let view = TensorView::channel_major(
      features,
      self.layout,
      self.height,
      self.width,
      self.channels,
    )?;
    let (grid_w, grid_h) = (self.width as f32, self.height as f32);

    for a in 0..self.anchors.len() {
      let (pw, ph) = self.anchors.prior(a);
      let base = a * self.per_anchor;

      for gy in 0..self.height {
        for gx in 0..self.width {
          let raw = |k: usize| view.get([base + k, gy, gx]);

          let (class_id, class_logit) = if self.num_classes == 1 {
            (0, raw(DENSE_BASE_CHANNELS))
          } else {
            (0..self.num_classes)
              .map(|k| (k as u32, raw(DENSE_BASE_CHANNELS + k)))
              .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 { cur } else { best }
              })
          };

          let score =
            clamped_sigmoid(raw(4)) * clamped_sigmoid(raw(5)) * clamped_sigmoid(class_logit);
          if score < threshold {
            continue;
          }

          let cx = (clamped_sigmoid(raw(0)) + gx as f32) / grid_w;
          let cy = (clamped_sigmoid(raw(1)) + gy as f32) / grid_h;
          let bw = pw * softplus(raw(2));
          let bh = ph * softplus(raw(3));
          if !(bw > 0.0 && bh > 0.0) {
            continue;
          }

          out.push(Detection {
            cx,
            cy,
            w: bw,
            h: bh,
            class_id,
            confidence: score,
          });
        }
      }
    }
    Ok(())
  }
}

/// 直接回归解码：每个槽位一组分数、类别分数向量与角点坐标
#[derive(Debug, Clone)]
pub struct DirectDecoder {
  slots: usize,
  num_classes: usize,
  coord_scale: f32,
}

/// 反量化后的直接回归输出
#[derive(Debug, Clone, Default)]
pub struct DirectFeatures {
  pub scores: Vec<f32>,
  pub class_scores: Vec<f32>,
  pub x1: Vec<f32>,
  pub y1: Vec<f32>,
  pub x2: Vec<f32>,
  pub y2: Vec<f32>,
}

impl DirectFeatures {
  pub fn dequantize_from(&mut self, output: &DirectOutput) {
    output.scores.dequantize_into(&mut self.scores);
    output.class_scores.dequantize_into(&mut self.class_scores);
    output.x1.dequantize_into(&mut self.x1);
    output.y1.dequantize_into(&mut self.y1);
    output.x2.dequantize_into(&mut self.x2);
    output.y2.dequantize_into(&mut self.y2);
  }
}

impl DirectDecoder {
  pub fn new(slots: usize, num_classes: usize, coord_scale: f32) -> Result<Self, DecodeError> {
    if num_classes == 0 {
      return Err(DecodeError::NoClasses);
    }
    if !(coord_scale > 0.0 && coord_scale.is_finite()) {
      error!("直接回归坐标缩放 {} 无效", coord_scale);
      return Err(DecodeError::InvalidCoordScale(coord_scale));
    }
    Ok(Self {
      slots,
      num_classes,
      coord_scale,
    })
  }

  pub fn slots(&self) -> usize {
    self.slots
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn decode(
    &self,
    features: &DirectFeatures,
    threshold: f32,
    out: &mut Vec<Detection>,
  ) -> Result<(), DecodeError> {
    let d = self.slots;
    let scores = TensorView::contiguous(&features.scores, [d])?;
    let classes = TensorView::contiguous(&features.class_scores, [d, self.num_classes])?;
    let x1 = TensorView::contiguous(&features.x1, [d])?;
    let y1 = TensorView::contiguous(&features.y1, [d])?;
    let x2 = TensorView::contiguous(&features.x2, [d])?;
    let y2 = TensorView::contiguous(&features.y2, [d])?;
    let scale = self.coord_scale;

    for slot in 0..d {
      let score = scores.get([slot]);
      if score < threshold {
        continue;
      }
      // 类别置信度只用于选类，不参与最终分数
      let Some((class_id, _)) = classes.row(slot).argmax() else {
        continue;
      };

      let (ax, ay) = (x1.get([slot]) / scale, y1.get([slot]) / scale);
      let (bx, by) = (x2.get([slot]) / scale, y2.get([slot]) / scale);
      let (w, h) = (bx - ax, by - ay);
      if !(w > 0.0 && h > 0.0) {
        continue;
      }

      out.push(Detection {
        cx: (ax + bx) / 2.0,
        cy: (ay + by) / 2.0,
        w,
        h,
        class_id: class_id as u32,
        confidence: score.clamp(0.0, 1.0),
      });
    }
    Ok(())
  }
}

/// 由模型元数据选定的解码策略
#[derive(Debug, Clone)]
pub enum Decoder {
  Dense(DenseDecoder),
  Direct(DirectDecoder),
}

/// 解码所需的复用缓冲
#[derive(Debug, Clone, Default)]
pub struct DecodeBuffers {
  dense: Vec<f32>,
  direct: DirectFeatures,
}

impl Decoder {
  pub fn from_metadata(
    metadata: &ModelMetadata,
    anchors: Arc<AnchorSpec>,
  ) -> Result<Self, DecodeError> {
    let decoder = match &metadata.head {
      HeadSpec::Dense {
        height,
        width,
        channels,
        num_classes,
        layout,
        ..
      } => Decoder::Dense(DenseDecoder::new(
        anchors,
        *height,
        *width,
        *channels,
        *num_classes,
        *layout,
      )?),
      HeadSpec::Direct {
        slots,
        num_classes,
        coord_scale,
      } => Decoder::Direct(DirectDecoder::new(*slots, *num_classes, *coord_scale)?),
    };
    Ok(decoder)
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Decoder::Dense(_) => "dense",
      Decoder::Direct(_) => "direct",
    }
  }

  /// 多类别模型时 NMS 按类别分组
  pub fn is_multi_class(&self) -> bool {
    match self {
      Decoder::Dense(d) => d.num_classes() > 1,
      Decoder::Direct(d) => d.num_classes() > 1,
    }
  }

  /// 反量化并解码一次运行时输出，结果追加到 `out`（未排序）
  pub fn decode(
    &self,
    output: &RawOutput,
    threshold: f32,
    buffers: &mut DecodeBuffers,
    out: &mut Vec<Detection>,
  ) -> Result<(), DecodeError> {
    match (self, output) {
      (Decoder::Dense(decoder), RawOutput::Dense(tensor)) => {
        check_len("feature", tensor, decoder.feature_len())?;
        tensor.dequantize_into(&mut buffers.dense);
        decoder.decode(&buffers.dense, threshold, out)
      }
      (Decoder::Direct(decoder), RawOutput::Direct(direct)) => {
        let d = decoder.slots();
        check_len("scores", &direct.scores, d)?;
        check_len("class_scores", &direct.class_scores, d * decoder.num_classes())?;
        check_len("x1", &direct.x1, d)?;
        check_len("y1", &direct.y1, d)?;
        check_len("x2", &direct.x2, d)?;
        check_len("y2", &direct.y2, d)?;
        buffers.direct.dequantize_from(direct);
        decoder.decode(&buffers.direct, threshold, out)
      }
      (decoder, output) => Err(DecodeError::HeadMismatch {
        expected: decoder.kind(),
        actual: output.kind(),
      }),
    }
  }
}

fn check_len(name: &'static str, tensor: &QuantTensor, expected: usize) -> Result<(), DecodeError> {
  if tensor.len() != expected {
    return Err(DecodeError::OutputLength {
      name,
      expected,
      actual: tensor.len(),
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sigmoid_reference_points() {
    assert_eq!(clamped_sigmoid(0.0), 0.5);
    assert_eq!(clamped_sigmoid(-1000.0), 0.0);
    assert_eq!(clamped_sigmoid(1000.0), 1.0);
    assert_eq!(clamped_sigmoid(-80.5), 0.0);
  }

  #[test]
  fn softplus_reference_points() {
    assert!((softplus(0.0) - std::f32::consts::LN_2).abs() < 1e-6);
    for x in [-100.0f32, -3.0, -0.5, 0.0, 0.5, 3.0, 100.0] {
      assert!(softplus(x) >= x.max(0.0));
    }
    assert!(softplus(1000.0).is_finite());
  }

  #[test]
  fn channel_mismatch_fails_fast() {
    let spec = Arc::new(AnchorSpec::new(vec![[1.0, 1.0]; 3], vec![[1.0, 1.0]; 3]).unwrap());
    let err = DenseDecoder::new(spec, 8, 8, 22, 1, Layout::Nhwc).unwrap_err();
    assert!(matches!(
      err,
      DecodeError::ChannelAnchorMismatch {
        channels: 22,
        anchors: 3
      }
    ));
  }

  #[test]
  fn class_count_must_fit_channels() {
    let spec = Arc::new(AnchorSpec::new(vec![[1.0, 1.0]], vec![[1.0, 1.0]]).unwrap());
    let err = DenseDecoder::new(spec.clone(), 1, 1, 8, 3, Layout::Nhwc).unwrap_err();
    assert!(matches!(
      err,
      DecodeError::TooFewChannels {
        per_anchor: 8,
        required: 9
      }
    ));
    assert!(matches!(
      DenseDecoder::new(spec, 1, 1, 8, 0, Layout::Nhwc).unwrap_err(),
      DecodeError::NoClasses
    ));
  }

  #[test]
  fn coord_scale_must_be_positive_finite() {
    for scale in [0.0f32, -1.0, f32::NAN, f32::INFINITY] {
      assert!(matches!(
        DirectDecoder::new(4, 1, scale).unwrap_err(),
        DecodeError::InvalidCoordScale(_)
      ));
    }
    assert!(DirectDecoder::new(4, 1, 64.0).is_ok());
  }

  #[test]
  fn head_mismatch_is_reported() {
    let decoder = Decoder::Direct(DirectDecoder::new(1, 1, 1.0).unwrap());
    let output = RawOutput::Dense(QuantTensor::new(vec![0; 7], 0));
    let err = decoder
      .decode(&output, 0.5, &mut DecodeBuffers::default(), &mut Vec::new())
      .unwrap_err();
    assert!(matches!(
      err,
      DecodeError::HeadMismatch {
        expected: "direct",
        actual: "dense"
      }
    ));
  }
}
