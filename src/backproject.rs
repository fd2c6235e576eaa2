// 该文件是 Beifeng （北风） 项目的一部分。
// src/backproject.rs - 坐标反投影
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

use crate::{frame::Region, model::Detection};

/// 模型归一化正方形在目标帧中对应的矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Viewport {
  pub fn full(width: u32, height: u32) -> Self {
    Self {
      x: 0.0,
      y: 0.0,
      width: width as f32,
      height: height as f32,
    }
  }
}

impl From<Region> for Viewport {
  fn from(region: Region) -> Self {
    Self {
      x: region.x as f32,
      y: region.y as f32,
      width: region.width as f32,
      height: region.height as f32,
    }
  }
}

/// 目标帧中的浮点角点，未裁剪
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

/// 已裁剪到 [0, dim - 1] 的整数角点，可直接写像素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedBox {
  pub x1: u32,
  pub y1: u32,
  pub x2: u32,
  pub y2: u32,
}

impl PixelBox {
  pub fn to_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }

  pub fn from_array(bbox: &[f32; 4]) -> Self {
    Self {
      x1: bbox[0],
      y1: bbox[1],
      x2: bbox[2],
      y2: bbox[3],
    }
  }

  /// 两个角点都裁剪到帧内；空帧返回 None
  pub fn clamp(&self, width: u32, height: u32) -> Option<ClampedBox> {
    if width == 0 || height == 0 {
      return None;
    }
    let cx = |v: f32| clamp_coord(v, width);
    let cy = |v: f32| clamp_coord(v, height);
    let (x1, x2) = (cx(self.x1), cx(self.x2));
    let (y1, y2) = (cy(self.y1), cy(self.y2));
    Some(ClampedBox {
      x1: x1.min(x2),
      y1: y1.min(y2),
      x2: x1.max(x2),
      y2: y1.max(y2),
    })
  }
}

// NaN 落到 0
fn clamp_coord(v: f32, dim: u32) -> u32 {
  let max = (dim - 1) as f32;
  if v.is_nan() {
    0
  } else {
    v.clamp(0.0, max) as u32
  }
}

/// 归一化检测映射到目标视口的像素坐标
pub fn backproject(det: &Detection, viewport: &Viewport) -> PixelBox {
  let cx = viewport.x + det.cx * viewport.width;
  let cy = viewport.y + det.cy * viewport.height;
  let w = det.w * viewport.width;
  let h = det.h * viewport.height;
  PixelBox {
    x1: cx - w / 2.0,
    y1: cy - h / 2.0,
    x2: cx + w / 2.0,
    y2: cy + h / 2.0,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(cx: f32, cy: f32, w: f32, h: f32) -> Detection {
    Detection {
      cx,
      cy,
      w,
      h,
      class_id: 0,
      confidence: 1.0,
    }
  }

  #[test]
  fn scales_to_frame() {
    let b = backproject(&det(0.5, 0.5, 0.5, 0.25), &Viewport::full(320, 240));
    assert_eq!(b.to_array(), [80.0, 90.0, 240.0, 150.0]);
  }

  #[test]
  fn viewport_offset_is_added() {
    let viewport = Viewport::from(Region::center_square(320, 240));
    let b = backproject(&det(0.5, 0.5, 0.5, 0.5), &viewport);
    assert_eq!(b.to_array(), [100.0, 60.0, 220.0, 180.0]);
  }

  #[test]
  fn clamp_keeps_corners_inside() {
    let b = backproject(&det(0.875, 0.0625, 0.25, 0.25), &Viewport::full(100, 50));
    let c = b.clamp(100, 50).unwrap();
    assert_eq!(c, ClampedBox { x1: 75, y1: 0, x2: 99, y2: 9 });
  }

  #[test]
  fn clamp_rejects_empty_frame() {
    let b = backproject(&det(0.5, 0.5, 0.1, 0.1), &Viewport::full(10, 10));
    assert!(b.clamp(0, 10).is_none());
  }
}
