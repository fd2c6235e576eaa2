// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RawFrame, model::DetectResult, output::Render};

/// `log://`：检测结果写入 tracing 日志
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &Url) -> Result<Self, Self::Error> {
    Ok(LogOutput)
  }
}

impl Render<RawFrame, DetectResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &RawFrame, result: &DetectResult) -> Result<(), Self::Error> {
    info!(
      "{}x{} 帧检测到 {} 个物体",
      frame.width(),
      frame.height(),
      result.len()
    );
    for item in result.items.iter() {
      let [x1, y1, x2, y2] = item.bbox;
      info!(
        label = item.label,
        class_id = item.class_id,
        score = item.score,
        "bbox: ({:.1}, {:.1}) - ({:.1}, {:.1})",
        x1,
        y1,
        x2,
        y2
      );
    }
    Ok(())
  }
}
