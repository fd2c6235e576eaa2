// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/raw_file.rs - 原始帧缓冲输入
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

//! 读取摄像头帧缓冲的转储文件，例如
//! `raw:///tmp/cam.bin?width=320&height=240&format=rgb565`。
//! 文件可以包含多帧首尾相接的数据，逐帧产出。

use std::{
  fs::File,
  io::{BufReader, ErrorKind, Read},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, PixelFormat, RawFrame},
  query_value, url_path,
};

#[derive(Error, Debug)]
pub enum RawFileInputError {
  #[error("URL 方案不匹配")]
  SchemaMismatch,
  #[error("缺少查询参数: {0}")]
  MissingParam(&'static str),
  #[error("查询参数 {0} 无效: {1}")]
  InvalidParam(&'static str, String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

pub struct RawFileInput {
  reader: BufReader<File>,
  width: u32,
  height: u32,
  format: PixelFormat,
  frame_len: usize,
}

impl FromUrlWithScheme for RawFileInput {
  const SCHEME: &'static str = "raw";
}

fn dimension(url: &Url, key: &'static str) -> Result<u32, RawFileInputError> {
  let value = query_value(url, key).ok_or(RawFileInputError::MissingParam(key))?;
  match value.parse::<u32>() {
    Ok(v) if v > 0 => Ok(v),
    _ => Err(RawFileInputError::InvalidParam(key, value)),
  }
}

impl FromUrl for RawFileInput {
  type Error = RawFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URL 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(RawFileInputError::SchemaMismatch);
    }

    let width = dimension(url, "width")?;
    let height = dimension(url, "height")?;
    let format = match query_value(url, "format") {
      Some(f) => f.parse()?,
      None => PixelFormat::Rgb565,
    };
    if format == PixelFormat::Yuv422 && width % 2 != 0 {
      return Err(FrameError::OddYuvWidth(width).into());
    }

    let path = url_path(url);
    info!("读取原始帧: {} ({}x{} {:?})", path, width, height, format);
    let file = File::open(&path)?;

    Ok(Self {
      reader: BufReader::new(file),
      width,
      height,
      format,
      frame_len: width as usize * height as usize * format.bytes_per_pixel(),
    })
  }
}

impl RawFileInput {
  fn read_frame(&mut self) -> Result<Option<RawFrame>, RawFileInputError> {
    let mut data = vec![0u8; self.frame_len];
    match self.reader.read_exact(&mut data) {
      Ok(()) => Ok(Some(RawFrame::new(
        self.width,
        self.height,
        self.format,
        data,
      )?)),
      Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
      Err(e) => Err(e.into()),
    }
  }
}

impl Iterator for RawFileInput {
  type Item = RawFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self.read_frame() {
      Ok(Some(frame)) => Some(frame),
      Ok(None) => {
        debug!("原始帧文件读取完毕");
        None
      }
      Err(e) => {
        warn!("读取原始帧失败: {}", e);
        None
      }
    }
  }
}
