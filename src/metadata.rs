// 该文件是 Beifeng （北风） 项目的一部分。
// src/metadata.rs - 模型元数据
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

use serde_json::Value;
use thiserror::Error;

use crate::tensor::{Layout, TensorError};

// 设备上 64x64 输入、8x8 网格的单类检测模型
pub const DEFAULT_INPUT_SIZE: u32 = 64;
pub const DEFAULT_GRID_SIZE: usize = 8;
pub const DENSE_BASE_CHANNELS: usize = 6;

#[derive(Error, Debug)]
pub enum MetadataError {
  #[error("未知检测头类型: {0}")]
  UnknownHead(String),
  #[error("字段 {0} 类型错误")]
  InvalidField(&'static str),
  #[error("直接回归检测头缺少字段: {0}")]
  MissingField(&'static str),
  #[error("{0}")]
  Layout(#[from] TensorError),
}

/// 检测头形状，决定使用哪种解码策略
#[derive(Debug, Clone, PartialEq)]
pub enum HeadSpec {
  /// 网格 + 锚框稠密输出 [1, H, W, C]
  Dense {
    height: usize,
    width: usize,
    channels: usize,
    num_classes: usize,
    /// 缺省为 NHWC，与输出形状 [1, H, W, C] 一致
    layout: Layout,
    exponent: i32,
  },
  /// 六个长度为 D 的并行数组
  Direct {
    slots: usize,
    num_classes: usize,
    coord_scale: f32,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
  pub input_size: u32,
  pub head: HeadSpec,
}

impl ModelMetadata {
  /// 设备默认模型：稠密头，每锚框 7 个通道
  pub fn dense_default(num_anchors: usize) -> Self {
    Self {
      input_size: DEFAULT_INPUT_SIZE,
      head: HeadSpec::Dense {
        height: DEFAULT_GRID_SIZE,
        width: DEFAULT_GRID_SIZE,
        channels: num_anchors * (DENSE_BASE_CHANNELS + 1),
        num_classes: 1,
        layout: Layout::Nhwc,
        exponent: 0,
      },
    }
  }

  /// 解析记录中的 `metadata` 对象，缺省字段取设备默认值
  pub fn from_json(record: &Value, num_anchors: usize) -> Result<Self, MetadataError> {
    let meta = match record.get("metadata") {
      Some(m) => m,
      None => return Ok(Self::dense_default(num_anchors)),
    };

    let input_size = opt_u64(meta, "input_size")?.unwrap_or(u64::from(DEFAULT_INPUT_SIZE)) as u32;
    let num_classes = opt_u64(meta, "num_classes")?.unwrap_or(1) as usize;
    let kind = match meta.get("head") {
      Some(v) => v.as_str().ok_or(MetadataError::InvalidField("head"))?,
      None => "dense",
    };

    let head = match kind {
      "dense" => {
        let (height, width) = match meta.get("grid") {
          Some(Value::Array(dims)) if dims.len() == 2 => {
            let h = dims[0].as_u64().ok_or(MetadataError::InvalidField("grid"))?;
            let w = dims[1].as_u64().ok_or(MetadataError::InvalidField("grid"))?;
            (h as usize, w as usize)
          }
          Some(Value::Number(n)) => {
            let n = n.as_u64().ok_or(MetadataError::InvalidField("grid"))? as usize;
            (n, n)
          }
          Some(_) => return Err(MetadataError::InvalidField("grid")),
          None => (DEFAULT_GRID_SIZE, DEFAULT_GRID_SIZE),
        };
        let per_anchor = DENSE_BASE_CHANNELS + num_classes;
        let channels = opt_u64(meta, "channels")?
          .map(|c| c as usize)
          .unwrap_or(num_anchors * per_anchor);
        let layout = match meta.get("layout") {
          Some(v) => v
            .as_str()
            .ok_or(MetadataError::InvalidField("layout"))?
            .parse()?,
          None => Layout::Nhwc,
        };
        let exponent = match meta.get("output_exponent") {
          Some(v) => v.as_i64().ok_or(MetadataError::InvalidField("output_exponent"))? as i32,
          None => 0,
        };
        HeadSpec::Dense {
          height,
          width,
          channels,
          num_classes,
          layout,
          exponent,
        }
      }
      "direct" => {
        let slots = opt_u64(meta, "slots")?.ok_or(MetadataError::MissingField("slots"))? as usize;
        let coord_scale = match meta.get("coord_scale") {
          Some(v) => v.as_f64().ok_or(MetadataError::InvalidField("coord_scale"))? as f32,
          None => 1.0,
        };
        if !(coord_scale > 0.0 && coord_scale.is_finite()) {
          return Err(MetadataError::InvalidField("coord_scale"));
        }
        HeadSpec::Direct {
          slots,
          num_classes,
          coord_scale,
        }
      }
      other => return Err(MetadataError::UnknownHead(other.to_string())),
    };

    Ok(Self { input_size, head })
  }
}

fn opt_u64(meta: &Value, field: &'static str) -> Result<Option<u64>, MetadataError> {
  match meta.get(field) {
    Some(v) => v.as_u64().map(Some).ok_or(MetadataError::InvalidField(field)),
    None => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn missing_metadata_gives_device_defaults() {
    let meta = ModelMetadata::from_json(&json!({}), 8).unwrap();
    assert_eq!(meta, ModelMetadata::dense_default(8));
    assert!(matches!(meta.head, HeadSpec::Dense { channels: 56, .. }));
  }

  #[test]
  fn parses_direct_head() {
    let record = json!({"metadata": {"head": "direct", "slots": 100, "num_classes": 80, "coord_scale": 64.0}});
    let meta = ModelMetadata::from_json(&record, 8).unwrap();
    assert_eq!(
      meta.head,
      HeadSpec::Direct {
        slots: 100,
        num_classes: 80,
        coord_scale: 64.0
      }
    );
  }

  #[test]
  fn parses_dense_grid_and_layout() {
    let record = json!({"metadata": {"grid": [4, 6], "layout": "nchw", "output_exponent": -5}});
    let meta = ModelMetadata::from_json(&record, 2).unwrap();
    assert_eq!(
      meta.head,
      HeadSpec::Dense {
        height: 4,
        width: 6,
        channels: 14,
        num_classes: 1,
        layout: Layout::Nchw,
        exponent: -5
      }
    );
  }

  #[test]
  fn direct_head_rejects_non_positive_coord_scale() {
    for scale in [0.0, -64.0] {
      let record = json!({"metadata": {"head": "direct", "slots": 4, "coord_scale": scale}});
      let err = ModelMetadata::from_json(&record, 1).unwrap_err();
      assert!(matches!(err, MetadataError::InvalidField("coord_scale")));
    }
  }

  #[test]
  fn direct_head_requires_slots() {
    let err = ModelMetadata::from_json(&json!({"metadata": {"head": "direct"}}), 1).unwrap_err();
    assert!(matches!(err, MetadataError::MissingField("slots")));
  }
}
