// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/framebuffer.rs - LCD 帧缓冲转储输出
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

//! `fb://<path>`：把画好检测框的 RGB565 帧追加写入转储文件。
//!
//! 每帧 `width * height` 个小端 u16，与 `raw://...?format=rgb565` 的输入格式一致。

use std::{
  fs::{File, OpenOptions},
  io::Write,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, RawFrame},
  model::DetectResult,
  output::{
    Render,
    draw::{BOX_COLOR, Rgb565Canvas},
  },
  url_path,
};

#[derive(Error, Debug)]
pub enum FramebufferOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

pub struct FramebufferOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for FramebufferOutput {
  const SCHEME: &'static str = "fb";
}

impl FromUrl for FramebufferOutput {
  type Error = FramebufferOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(FramebufferOutputError::SchemeMismatch);
    }

    let path = PathBuf::from(url_path(uri));
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    // 每次启动重新开始转储
    File::create(&path)?;
    info!("帧缓冲转储到: {}", path.display());

    Ok(FramebufferOutput { path })
  }
}

impl FramebufferOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<RawFrame, DetectResult> for FramebufferOutput {
  type Error = FramebufferOutputError;

  fn render_result(&self, frame: &RawFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let (width, height) = (frame.width(), frame.height());
    let mut pixels = vec![0u16; width as usize * height as usize];
    let mut canvas = Rgb565Canvas::new(&mut pixels, width, height)?;
    canvas.blit(frame)?;
    canvas.draw_detections(result, BOX_COLOR);

    let bytes = pixels.iter().flat_map(|p| p.to_le_bytes()).collect::<Vec<_>>();
    let mut file = OpenOptions::new().append(true).open(&self.path)?;
    file.write_all(&bytes)?;
    debug!("写入 {}x{} 帧, {} 个检测框", width, height, result.len());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{model::DetectItem, preprocess::pack_rgb565};

  #[test]
  fn dumps_annotated_frames_back_to_back() {
    let dir = std::env::temp_dir().join(format!("beifeng-fb-{}", std::process::id()));
    let url = Url::parse(&format!("fb://{}/lcd.bin", dir.display())).unwrap();
    let output = FramebufferOutput::from_url(&url).unwrap();

    let frame = RawFrame::from_rgb565(8, 8, &[0; 64]).unwrap();
    let result = DetectResult {
      items: vec![DetectItem {
        label: "person",
        class_id: 0,
        score: 0.9,
        bbox: [-4.0, 2.0, 5.0, 20.0],
      }]
      .into_boxed_slice(),
    };
    output.render_result(&frame, &result).unwrap();
    output.render_result(&frame, &DetectResult::default()).unwrap();

    let bytes = std::fs::read(output.path()).unwrap();
    assert_eq!(bytes.len(), 2 * 64 * 2);
    let at = |frame: usize, x: usize, y: usize| {
      let i = (frame * 64 + y * 8 + x) * 2;
      u16::from_le_bytes([bytes[i], bytes[i + 1]])
    };
    let green = pack_rgb565(BOX_COLOR);
    // 越界的角点被裁剪到画布边缘
    assert_eq!(at(0, 0, 2), green);
    assert_eq!(at(0, 5, 7), green);
    assert_eq!(at(0, 7, 7), 0);
    assert_eq!(at(1, 0, 2), 0);

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
