// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/directory_record.rs - 按日期归档的检测记录
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

use std::{
  fs::OpenOptions,
  io::Write,
  path::PathBuf,
  sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RawFrame,
  model::DetectResult,
  output::Render,
  query_value, url_path,
};

const RECORD_FILE: &str = "detections.jsonl";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// `folder://<dir>[?always]`
///
/// 记录写入 `<dir>/YYYY/MM/DD/detections.jsonl`，每帧一行。
/// 默认只记录有检测结果的帧，带 `always` 时空结果也记录。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU64,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = query_value(uri, "always").is_some();

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_path(uri)),
      frame_counter: AtomicU64::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u64 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn record_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;
    Ok(directory.join(RECORD_FILE))
  }
}

pub(crate) fn record_line(
  frame_id: u64,
  now: &DateTime<Utc>,
  frame: &RawFrame,
  result: &DetectResult,
) -> Value {
  let items = result
    .items
    .iter()
    .map(|item| {
      json!({
        "label": item.label,
        "class_id": item.class_id,
        "score": item.score,
        "bbox": item.bbox,
      })
    })
    .collect::<Vec<_>>();

  json!({
    "frame": frame_id,
    "time": now.to_rfc3339(),
    "width": frame.width(),
    "height": frame.height(),
    "items": items,
  })
}

impl Render<RawFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RawFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let frame_id = self.frame_id();
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let path = self.record_path(&now)?;
    let line = serde_json::to_string(&record_line(frame_id, &now, frame, result))?;

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", line)?;
    debug!("记录第 {} 帧到 {}", frame_id, path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  #[test]
  fn appends_records_into_dated_directory() {
    let dir = std::env::temp_dir().join(format!("beifeng-record-{}", std::process::id()));
    let url = url::Url::parse(&format!("folder://{}", dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = RawFrame::from_rgb565(2, 2, &[0; 4]).unwrap();
    let result = DetectResult {
      items: vec![DetectItem {
        label: "person",
        class_id: 0,
        score: 0.5,
        bbox: [0.0, 0.0, 1.0, 1.0],
      }]
      .into_boxed_slice(),
    };
    output.render_result(&frame, &result).unwrap();
    output.render_result(&frame, &DetectResult::default()).unwrap();
    output.render_result(&frame, &result).unwrap();

    let path = output.record_path(&Utc::now()).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    let last: Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(last["frame"], 3);
    assert_eq!(last["items"][0]["label"], "person");

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
