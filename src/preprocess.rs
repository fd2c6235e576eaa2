// 该文件是 Beifeng （北风） 项目的一部分。
// src/preprocess.rs - 图像预处理
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
use tracing::{debug, warn};

use crate::frame::{RawFrame, Region};

pub const RGB_CHANNELS: usize = 3;

/// RGB565 → 8 位 RGB，左移补位，不做舍入
#[inline]
pub fn unpack_rgb565(p: u16) -> [u8; 3] {
  [
    (((p >> 11) & 0x1F) << 3) as u8,
    (((p >> 5) & 0x3F) << 2) as u8,
    ((p & 0x1F) << 3) as u8,
  ]
}

/// 8 位 RGB → RGB565
#[inline]
pub fn pack_rgb565(rgb: [u8; 3]) -> u16 {
  let [r, g, b] = rgb.map(u16::from);
  ((r & 0xF8) << 8) | ((g & 0xFC) << 3) | (b >> 3)
}

/// BT.601 全范围 YUV → RGB，16.16 定点
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
  let y = i32::from(y);
  let u = i32::from(u) - 128;
  let v = i32::from(v) - 128;
  let r = y + ((91881 * v) >> 16);
  let g = y - ((22554 * u + 46802 * v) >> 16);
  let b = y + ((116130 * u) >> 16);
  [r, g, b].map(|c| c.clamp(0, 255) as u8)
}

/// 最近邻采样：目标坐标 dst ∈ [0, size) 对应的源坐标
#[inline]
pub fn nearest_source(dst: u32, src_dim: u32, size: u32) -> u32 {
  let s = (u64::from(dst) * u64::from(src_dim) / u64::from(size)) as u32;
  s.min(src_dim.saturating_sub(1))
}

/// 采样区域选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropMode {
  /// 整帧
  #[default]
  Full,
  /// 居中正方形
  CenterSquare,
  /// 固定区域，超出帧的部分被裁掉
  Fixed(Region),
}

impl CropMode {
  pub fn region_for(&self, width: u32, height: u32) -> Region {
    match self {
      CropMode::Full => Region::full(width, height),
      CropMode::CenterSquare => Region::center_square(width, height),
      CropMode::Fixed(region) => region.clip(width, height).unwrap_or_else(|| {
        warn!("裁剪区域 {:?} 超出 {}x{} 帧，改用整帧", region, width, height);
        Region::full(width, height)
      }),
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("无法解析裁剪模式 {0:?}, 可选 full、center 或 x,y,w,h")]
pub struct CropParseError(pub String);

impl FromStr for CropMode {
  type Err = CropParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "full" => Ok(CropMode::Full),
      "center" | "center-square" => Ok(CropMode::CenterSquare),
      other => {
        let parts = other
          .split(',')
          .map(|v| v.trim().parse::<u32>())
          .collect::<Result<Vec<_>, _>>()
          .map_err(|_| CropParseError(s.to_string()))?;
        match parts[..] {
          [x, y, width, height] => Ok(CropMode::Fixed(Region {
            x,
            y,
            width,
            height,
          })),
          _ => Err(CropParseError(s.to_string())),
        }
      }
    }
  }
}

/// 预处理暂存区，启动时按输入尺寸分配一次，每帧复用
#[derive(Debug, Clone)]
pub struct PreprocessBuffers {
  size: u32,
  planar: Vec<f32>,
  interleaved: Vec<f32>,
}

impl PreprocessBuffers {
  pub fn new(size: u32) -> Self {
    let len = RGB_CHANNELS * size as usize * size as usize;
    Self {
      size,
      planar: vec![0.0; len],
      interleaved: vec![0.0; len],
    }
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  /// 通道优先（R, G, B 三个平面）的归一化结果
  pub fn planar(&self) -> &[f32] {
    &self.planar
  }

  /// 像素优先的模型输入
  pub fn interleaved(&self) -> &[f32] {
    &self.interleaved
  }
}

/// 把 S×S 的平面数据重排为像素交错顺序
pub fn interleave(planar: &[f32], interleaved: &mut [f32], plane: usize) {
  for idx in 0..plane {
    for c in 0..RGB_CHANNELS {
      interleaved[idx * RGB_CHANNELS + c] = planar[c * plane + idx];
    }
  }
}

/// 图像预处理器：最近邻缩放、颜色转换、归一化、重排
#[derive(Debug, Clone)]
pub struct Preprocessor {
  size: u32,
  crop: CropMode,
}

impl Preprocessor {
  pub fn new(size: u32) -> Self {
    Self {
      size,
      crop: CropMode::Full,
    }
  }

  pub fn with_crop(mut self, crop: CropMode) -> Self {
    self.crop = crop;
    self
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn crop(&self) -> CropMode {
    self.crop
  }

  /// 本帧实际采样的源区域
  pub fn region_for(&self, frame: &RawFrame) -> Region {
    self.crop.region_for(frame.width(), frame.height())
  }

  /// 填充模型输入，返回像素交错的 [S, S, 3] 浮点张量
  pub fn run<'b>(&self, frame: &RawFrame, buffers: &'b mut PreprocessBuffers) -> &'b [f32] {
    if buffers.size != self.size {
      *buffers = PreprocessBuffers::new(self.size);
    }

    let size = self.size;
    let plane = size as usize * size as usize;
    let region = self.region_for(frame);
    debug!(
      "预处理: {}x{} {:?} 区域 {:?} → {}x{}",
      frame.width(),
      frame.height(),
      frame.format(),
      region,
      size,
      size
    );

    for y in 0..size {
      let sy = region.y + nearest_source(y, region.height, size);
      for x in 0..size {
        let sx = region.x + nearest_source(x, region.width, size);
        let rgb = frame.rgb_at(sx, sy);
        let idx = y as usize * size as usize + x as usize;
        for (c, value) in rgb.iter().enumerate() {
          buffers.planar[c * plane + idx] = f32::from(*value) / 255.0;
        }
      }
    }

    interleave(&buffers.planar, &mut buffers.interleaved, plane);
    &buffers.interleaved
  }
}
