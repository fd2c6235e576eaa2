// 该文件是 Beifeng （北风） 项目的一部分。
// src/pipeline.rs - 单帧后处理流水线
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

use thiserror::Error;
use tracing::debug;

use crate::{
  backproject::{Viewport, backproject},
  decode::{DecodeBuffers, DecodeError, Decoder},
  frame::RawFrame,
  model::{DetectItem, DetectResult, Detection, LabelTable, RawOutput},
  nms::{ClassMode, nms_in_place},
  preprocess::{CropMode, PreprocessBuffers, Preprocessor},
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
  #[error("运行时输入尺寸 {runtime} 与模型输入尺寸 {model} 不一致")]
  InputSizeMismatch { runtime: u32, model: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  /// None 时按解码器是否多类别决定
  pub class_mode: Option<ClassMode>,
  pub crop: CropMode,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      class_mode: None,
      crop: CropMode::Full,
    }
  }
}

/// 启动时按输入尺寸分配一次、每帧复用的暂存区
#[derive(Debug, Clone)]
pub struct Scratch {
  preprocess: PreprocessBuffers,
  decode: DecodeBuffers,
  detections: Vec<Detection>,
}

impl Scratch {
  pub fn new(input_size: u32) -> Self {
    Self {
      preprocess: PreprocessBuffers::new(input_size),
      decode: DecodeBuffers::default(),
      detections: Vec::new(),
    }
  }
}

/// 预处理 → 反量化 → 解码 → NMS → 反投影
///
/// 每一帧必须在下一帧开始前处理完毕，`&mut self` 保证暂存区不被并发复用。
pub struct Pipeline {
  config: PipelineConfig,
  preprocessor: Preprocessor,
  decoder: Decoder,
  labels: &'static [&'static str],
  scratch: Scratch,
}

impl Pipeline {
  pub fn new(
    config: PipelineConfig,
    input_size: u32,
    decoder: Decoder,
    labels: &'static [&'static str],
  ) -> Self {
    Self {
      preprocessor: Preprocessor::new(input_size).with_crop(config.crop),
      scratch: Scratch::new(input_size),
      config,
      decoder,
      labels,
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn decoder(&self) -> &Decoder {
    &self.decoder
  }

  pub fn input_size(&self) -> u32 {
    self.preprocessor.size()
  }

  pub fn class_mode(&self) -> ClassMode {
    self.config.class_mode.unwrap_or(if self.decoder.is_multi_class() {
      ClassMode::PerClass
    } else {
      ClassMode::Global
    })
  }

  /// 模型看到的源区域在原始帧中的位置
  pub fn viewport_for(&self, frame: &RawFrame) -> Viewport {
    Viewport::from(self.preprocessor.region_for(frame))
  }

  /// 填充模型输入张量
  pub fn preprocess(&mut self, frame: &RawFrame) -> &[f32] {
    self.preprocessor.run(frame, &mut self.scratch.preprocess)
  }

  /// 最近一次后处理保留下来的归一化检测，按置信度降序
  pub fn detections(&self) -> &[Detection] {
    &self.scratch.detections
  }

  /// 解码运行时输出并生成目标视口中的检测结果
  pub fn postprocess(
    &mut self,
    output: &RawOutput,
    viewport: &Viewport,
  ) -> Result<DetectResult, PipelineError> {
    let class_mode = self.class_mode();
    let detections = &mut self.scratch.detections;
    detections.clear();

    self.decoder.decode(
      output,
      self.config.confidence_threshold,
      &mut self.scratch.decode,
      detections,
    )?;
    debug!("解码得到 {} 个候选", detections.len());

    nms_in_place(detections, self.config.iou_threshold, class_mode);

    let items = detections
      .iter()
      .map(|det| DetectItem {
        label: self.labels.label(det.class_id),
        class_id: det.class_id,
        score: det.confidence,
        bbox: backproject(det, viewport).to_array(),
      })
      .collect::<Vec<_>>();

    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}
