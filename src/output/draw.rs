// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/draw.rs - 检测框绘制
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

use crate::{
  backproject::{ClampedBox, PixelBox},
  frame::{FrameError, RawFrame},
  model::DetectResult,
  preprocess::pack_rgb565,
};

pub const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
pub const BOX_THICKNESS: u32 = 2;

/// LCD 帧缓冲上的 RGB565 画布
pub struct Rgb565Canvas<'a> {
  pixels: &'a mut [u16],
  width: u32,
  height: u32,
}

impl<'a> Rgb565Canvas<'a> {
  pub fn new(pixels: &'a mut [u16], width: u32, height: u32) -> Result<Self, FrameError> {
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: pixels.len(),
      });
    }
    Ok(Self {
      pixels,
      width,
      height,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn pixel(&self, x: u32, y: u32) -> Option<u16> {
    if x >= self.width || y >= self.height {
      return None;
    }
    Some(self.pixels[(y * self.width + x) as usize])
  }

  fn put(&mut self, x: u32, y: u32, value: u16) {
    if x < self.width && y < self.height {
      self.pixels[(y * self.width + x) as usize] = value;
    }
  }

  /// 从帧复制像素，帧尺寸必须与画布一致
  pub fn blit(&mut self, frame: &RawFrame) -> Result<(), FrameError> {
    if frame.width() != self.width || frame.height() != self.height {
      return Err(FrameError::LengthMismatch {
        expected: self.pixels.len(),
        actual: frame.width() as usize * frame.height() as usize,
      });
    }
    for y in 0..self.height {
      for x in 0..self.width {
        let value = pack_rgb565(frame.rgb_at(x, y));
        self.put(x, y, value);
      }
    }
    Ok(())
  }

  /// 画空心矩形，线宽向框内延伸
  pub fn draw_rect(&mut self, rect: &ClampedBox, color: [u8; 3], thickness: u32) {
    let value = pack_rgb565(color);
    for t in 0..thickness {
      let (x1, y1) = (rect.x1 + t, rect.y1 + t);
      let (x2, y2) = (rect.x2.saturating_sub(t), rect.y2.saturating_sub(t));
      if x1 > x2 || y1 > y2 {
        break;
      }
      for x in x1..=x2 {
        self.put(x, y1, value);
        self.put(x, y2, value);
      }
      for y in y1..=y2 {
        self.put(x1, y, value);
        self.put(x2, y, value);
      }
    }
  }

  /// 绘制所有检测框，角点先裁剪到画布内
  pub fn draw_detections(&mut self, result: &DetectResult, color: [u8; 3]) {
    for item in result.items.iter() {
      if let Some(rect) = PixelBox::from_array(&item.bbox).clamp(self.width, self.height) {
        self.draw_rect(&rect, color, BOX_THICKNESS);
      }
    }
  }
}

#[cfg(feature = "save_image_file")]
mod image_draw {
  use std::path::Path;

  use ab_glyph::{FontVec, InvalidFont, PxScale};
  use image::{Rgb, RgbImage};
  use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
  };
  use thiserror::Error;
  use tracing::info;

  use crate::{
    backproject::PixelBox,
    frame::RawFrame,
    model::{DetectItem, DetectResult},
  };

  use super::{BOX_COLOR, BOX_THICKNESS};

  const LABEL_FONT_SIZE: f32 = 16.0;
  const LABEL_TEXT_HEIGHT: i32 = 18;
  const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）

  #[derive(Error, Debug)]
  pub enum FontLoadError {
    #[error("字体文件读取错误: {0}")]
    IoError(#[from] std::io::Error),
    #[error("字体无效: {0}")]
    InvalidFont(#[from] InvalidFont),
  }

  /// RGB 图像上的绘制；没有字体时只画框
  pub struct Draw {
    font: Option<FontVec>,
    font_size: f32,
    color: [u8; 3],
  }

  impl Default for Draw {
    fn default() -> Self {
      Self {
        font: None,
        font_size: LABEL_FONT_SIZE,
        color: BOX_COLOR,
      }
    }
  }

  impl Draw {
    pub fn with_font_file<P: AsRef<Path>>(path: P) -> Result<Self, FontLoadError> {
      let data = std::fs::read(path.as_ref())?;
      let font = FontVec::try_from_vec(data)?;
      info!("加载标签字体: {}", path.as_ref().display());
      Ok(Self {
        font: Some(font),
        ..Self::default()
      })
    }

    pub fn to_rgb_image(frame: &RawFrame) -> RgbImage {
      let (width, height) = (frame.width(), frame.height());
      RgbImage::from_raw(width, height, frame.to_rgb888())
        .unwrap_or_else(|| RgbImage::new(width, height))
    }

    fn draw_item(&self, image: &mut RgbImage, item: &DetectItem) {
      let Some(rect) = PixelBox::from_array(&item.bbox).clamp(image.width(), image.height())
      else {
        return;
      };
      let color = Rgb(self.color);

      for t in 0..BOX_THICKNESS {
        let (x1, y1) = (rect.x1 + t, rect.y1 + t);
        let (x2, y2) = (rect.x2.saturating_sub(t), rect.y2.saturating_sub(t));
        if x1 >= x2 || y1 >= y2 {
          break;
        }
        let r = Rect::at(x1 as i32, y1 as i32).of_size(x2 - x1 + 1, y2 - y1 + 1);
        draw_hollow_rect_mut(image, r, color);
      }

      let Some(font) = &self.font else {
        return;
      };
      let label = format!("{} {:.2}", item.label, item.score);
      let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as u32;
      let label_x = rect.x1 as i32;
      let label_y = (rect.y1 as i32 - LABEL_TEXT_HEIGHT).max(0);
      let label_width = text_width.min(image.width() - rect.x1);
      if label_width == 0 {
        return;
      }
      let background = Rect::at(label_x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
      draw_filled_rect_mut(image, background, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255, 255]),
        label_x,
        label_y,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }

    pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
      for item in result.items.iter() {
        self.draw_item(image, item);
      }
    }

    pub fn draw_on_frame(&self, frame: &RawFrame, result: &DetectResult) -> RgbImage {
      let mut image = Self::to_rgb_image(frame);
      self.draw_detections(&mut image, result);
      image
    }
  }
}

#[cfg(feature = "save_image_file")]
pub use self::image_draw::{Draw, FontLoadError};
