// 该文件是 Beifeng （北风） 项目的一部分。
// src/model.rs - 模型与检测结果
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

use crate::quant::QuantTensor;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 模型运行时（外部加速器）的同步接口
///
/// 返回的输出借用自运行时本身，只在下一次 `run` 之前有效。
pub trait Runtime {
  type Error;

  /// 正方形输入边长 S，输入张量为 [1, S, S, 3]
  fn input_size(&self) -> u32;

  fn run(&mut self, input: &[f32]) -> Result<&RawOutput, Self::Error>;
}

/// 直接回归检测头的六个并行输出
#[derive(Debug, Clone, Default)]
pub struct DirectOutput {
  pub scores: QuantTensor,
  pub class_scores: QuantTensor,
  pub x1: QuantTensor,
  pub y1: QuantTensor,
  pub x2: QuantTensor,
  pub y2: QuantTensor,
}

/// 运行时的量化输出
#[derive(Debug, Clone)]
pub enum RawOutput {
  /// [1, H, W, C] 稠密特征图
  Dense(QuantTensor),
  Direct(DirectOutput),
}

impl RawOutput {
  pub fn kind(&self) -> &'static str {
    match self {
      RawOutput::Dense(_) => "dense",
      RawOutput::Direct(_) => "direct",
    }
  }
}

/// 解码后的单个检测，几何量归一化到 [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
  pub class_id: u32,
  pub confidence: f32,
}

impl Detection {
  /// 中心点形式转为角点 [x1, y1, x2, y2]
  pub fn corners(&self) -> [f32; 4] {
    let (hw, hh) = (self.w / 2.0, self.h / 2.0);
    [self.cx - hw, self.cy - hh, self.cx + hw, self.cy + hh]
  }

  pub fn area(&self) -> f32 {
    self.w * self.h
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub label: &'static str,
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，目标帧像素坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

/// 类别标签表
pub trait LabelTable {
  fn label(&self, class_id: u32) -> &'static str;
}

pub const UNKNOWN_LABEL: &str = "unknown";

impl LabelTable for &'static [&'static str] {
  fn label(&self, class_id: u32) -> &'static str {
    self.get(class_id as usize).copied().unwrap_or(UNKNOWN_LABEL)
  }
}

/// COCO 数据集类别名称
pub const COCO_LABELS: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

pub static COCO: &[&str] = &COCO_LABELS;

mod detector;
pub mod replay;

pub use self::detector::{Detector, DetectorError};
pub use self::replay::{ReplayError, ReplayRuntime};
