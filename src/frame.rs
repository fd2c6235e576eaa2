// 该文件是 Beifeng （北风） 项目的一部分。
// src/frame.rs - 原始帧定义
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

use crate::preprocess::{unpack_rgb565, yuv_to_rgb};

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  /// 小端 u16，5/6/5 位
  Rgb565,
  /// R, G, B 三字节
  Rgb888,
  /// YUYV 打包，两像素共用 U/V
  Yuv422,
}

impl PixelFormat {
  /// 每像素平均字节数
  pub fn bytes_per_pixel(&self) -> usize {
    match self {
      PixelFormat::Rgb565 | PixelFormat::Yuv422 => 2,
      PixelFormat::Rgb888 => 3,
    }
  }
}

impl FromStr for PixelFormat {
  type Err = FrameError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb565" => Ok(PixelFormat::Rgb565),
      "rgb888" | "rgb" => Ok(PixelFormat::Rgb888),
      "yuv422" | "yuyv" => Ok(PixelFormat::Yuv422),
      other => Err(FrameError::UnknownFormat(other.to_string())),
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("未知像素格式: {0}")]
  UnknownFormat(String),
  #[error("帧尺寸无效: {width}x{height}")]
  InvalidDimensions { width: u32, height: u32 },
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("YUV422 帧宽度必须为偶数: {0}")]
  OddYuvWidth(u32),
}

/// 摄像头或图片源产生的一帧原始像素
#[derive(Debug, Clone)]
pub struct RawFrame {
  width: u32,
  height: u32,
  format: PixelFormat,
  data: Box<[u8]>,
}

impl RawFrame {
  pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidDimensions { width, height });
    }
    if format == PixelFormat::Yuv422 && width % 2 != 0 {
      return Err(FrameError::OddYuvWidth(width));
    }
    let expected = width as usize * height as usize * format.bytes_per_pixel();
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      width,
      height,
      format,
      data: data.into_boxed_slice(),
    })
  }

  /// 由 RGB565 像素字构造
  pub fn from_rgb565(width: u32, height: u32, pixels: &[u16]) -> Result<Self, FrameError> {
    let data = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
    Self::new(width, height, PixelFormat::Rgb565, data)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  /// 读取 (x, y) 处像素，转为 8 位 RGB
  ///
  /// 坐标由调用方保证在帧内。
  pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
    let (x, y, w) = (x as usize, y as usize, self.width as usize);
    match self.format {
      PixelFormat::Rgb565 => {
        let idx = (y * w + x) * 2;
        unpack_rgb565(u16::from_le_bytes([self.data[idx], self.data[idx + 1]]))
      }
      PixelFormat::Rgb888 => {
        let idx = (y * w + x) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
      }
      PixelFormat::Yuv422 => {
        let base = (y * w + (x & !1)) * 2;
        let luma = self.data[base + (x & 1) * 2];
        yuv_to_rgb(luma, self.data[base + 1], self.data[base + 3])
      }
    }
  }

  /// 转为紧凑的 RGB888 字节
  pub fn to_rgb888(&self) -> Vec<u8> {
    if self.format == PixelFormat::Rgb888 {
      return self.data.to_vec();
    }
    let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
    for y in 0..self.height {
      for x in 0..self.width {
        out.extend_from_slice(&self.rgb_at(x, y));
      }
    }
    out
  }
}

/// 帧内的矩形采样区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl Region {
  pub fn full(width: u32, height: u32) -> Self {
    Self {
      x: 0,
      y: 0,
      width,
      height,
    }
  }

  /// 居中的最大正方形，例如 320x240 → (40, 0, 240x240)
  pub fn center_square(width: u32, height: u32) -> Self {
    let side = width.min(height);
    Self {
      x: (width - side) / 2,
      y: (height - side) / 2,
      width: side,
      height: side,
    }
  }

  /// 裁剪到帧范围内，空区域返回 None
  pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
    if self.x >= width || self.y >= height {
      return None;
    }
    let w = self.width.min(width - self.x);
    let h = self.height.min(height - self.y);
    if w == 0 || h == 0 {
      return None;
    }
    Some(Self {
      x: self.x,
      y: self.y,
      width: w,
      height: h,
    })
  }
}
