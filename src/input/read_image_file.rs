// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/read_image_file.rs - 图片文件输入
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
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, PixelFormat, RawFrame},
  url_path,
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URL 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图片解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 单张图片，解码为 RGB888 帧后只产出一次
pub struct ImageFileInput {
  frame: Option<RawFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URL 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url_path(url);
    info!("读取图片: {}", path);
    let image = ImageReader::open(&path)?.decode()?.to_rgb8();
    Ok(ImageFileInput {
      frame: Some(frame_from_image(image)?),
    })
  }
}

pub(crate) fn frame_from_image(image: RgbImage) -> Result<RawFrame, FrameError> {
  let (width, height) = image.dimensions();
  RawFrame::new(width, height, PixelFormat::Rgb888, image.into_raw())
}

impl Iterator for ImageFileInput {
  type Item = RawFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn image_becomes_rgb888_frame() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, image::Rgb([10, 20, 30]));
    let frame = frame_from_image(image).unwrap();
    assert_eq!((frame.width(), frame.height()), (3, 2));
    assert_eq!(frame.format(), PixelFormat::Rgb888);
    assert_eq!(frame.rgb_at(2, 1), [10, 20, 30]);
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("raw:///tmp/x.bin").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
