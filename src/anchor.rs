// 该文件是 Beifeng （北风） 项目的一部分。
// src/anchor.rs - 锚框常量
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

use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum AnchorError {
  #[error("锚框文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("锚框 JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("缺少字段: {0}")]
  MissingField(&'static str),
  #[error("字段 {field} 含非数值元素")]
  NotNumeric { field: &'static str },
  #[error("字段 {field} 长度 {len} 不是成对数值")]
  OddLength { field: &'static str, len: usize },
  #[error("anchors 与 wh_scale 数量不一致: {anchors} != {wh_scale}")]
  CountMismatch { anchors: usize, wh_scale: usize },
  #[error("元数据声明 {declared} 个锚框, 实际 {actual} 个")]
  DeclaredMismatch { declared: usize, actual: usize },
  #[error("二进制锚框长度 {0} 字节不是 16 的倍数")]
  BinaryLength(usize),
  #[error("锚框为空")]
  Empty,
  #[error("锚框 {index} 含非有限数值")]
  NonFinite { index: usize },
}

/// 锚框先验：每个锚框一对 (宽, 高) 基准与一对 (宽, 高) 缩放
///
/// 启动时加载一次，之后只读，通过 `Arc` 共享。
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSpec {
  anchors: Vec<[f32; 2]>,
  wh_scale: Vec<[f32; 2]>,
}

impl AnchorSpec {
  pub fn new(anchors: Vec<[f32; 2]>, wh_scale: Vec<[f32; 2]>) -> Result<Self, AnchorError> {
    if anchors.len() != wh_scale.len() {
      return Err(AnchorError::CountMismatch {
        anchors: anchors.len(),
        wh_scale: wh_scale.len(),
      });
    }
    if anchors.is_empty() {
      return Err(AnchorError::Empty);
    }
    for (index, (a, s)) in anchors.iter().zip(wh_scale.iter()).enumerate() {
      if a.iter().chain(s.iter()).any(|v| !v.is_finite()) {
        return Err(AnchorError::NonFinite { index });
      }
    }
    Ok(Self { anchors, wh_scale })
  }

  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn anchors(&self) -> &[[f32; 2]] {
    &self.anchors
  }

  pub fn wh_scale(&self) -> &[[f32; 2]] {
    &self.wh_scale
  }

  /// 第 `a` 个锚框的有效先验尺寸 (pw, ph)
  #[inline]
  pub fn prior(&self, a: usize) -> (f32, f32) {
    let [bw, bh] = self.anchors[a];
    let [sw, sh] = self.wh_scale[a];
    (bw * sw, bh * sh)
  }

  /// 位置式二进制：先 anchors[A][2]，后 wh_scale[A][2]，小端 f32
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, AnchorError> {
    if bytes.is_empty() || bytes.len() % 16 != 0 {
      return Err(AnchorError::BinaryLength(bytes.len()));
    }
    let values: Vec<f32> = bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect();
    let (anchors, wh_scale) = values.split_at(values.len() / 2);
    Self::new(pairs(anchors), pairs(wh_scale))
  }

  /// 文本记录：含数组 `anchors` 与 `wh_scale` 的 JSON 对象
  pub fn from_json(value: &Value) -> Result<Self, AnchorError> {
    let anchors = pair_array(value, "anchors")?;
    let wh_scale = pair_array(value, "wh_scale")?;
    let spec = Self::new(anchors, wh_scale)?;

    if let Some(declared) = value
      .get("metadata")
      .and_then(|m| m.get("num_anchors"))
      .and_then(Value::as_u64)
      && declared as usize != spec.len()
    {
      return Err(AnchorError::DeclaredMismatch {
        declared: declared as usize,
        actual: spec.len(),
      });
    }
    Ok(spec)
  }

  pub fn from_json_str(text: &str) -> Result<Self, AnchorError> {
    let value: Value = serde_json::from_str(text)?;
    Self::from_json(&value)
  }

  /// 按扩展名加载：`.bin` 走二进制，其余按 JSON
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AnchorError> {
    let path = path.as_ref();
    info!("加载锚框常量: {}", path.display());
    let result = match path.extension().and_then(|e| e.to_str()) {
      Some("bin") => Self::from_bytes(&std::fs::read(path)?),
      _ => Self::from_json_str(&std::fs::read_to_string(path)?),
    };
    match &result {
      Ok(spec) => debug!("锚框数量: {}, 先验: {:?}", spec.len(), spec.anchors),
      Err(e) => error!("锚框常量加载失败: {}", e),
    }
    result
  }
}

fn pairs(values: &[f32]) -> Vec<[f32; 2]> {
  values.chunks_exact(2).map(|c| [c[0], c[1]]).collect()
}

/// 接受扁平数组 `[w0, h0, w1, h1, ...]` 或嵌套数组 `[[w0, h0], ...]`
fn pair_array(value: &Value, field: &'static str) -> Result<Vec<[f32; 2]>, AnchorError> {
  let array = value
    .get(field)
    .and_then(Value::as_array)
    .ok_or(AnchorError::MissingField(field))?;

  let mut flat = Vec::with_capacity(array.len() * 2);
  for item in array {
    match item {
      Value::Array(inner) => {
        for v in inner {
          flat.push(v.as_f64().ok_or(AnchorError::NotNumeric { field })? as f32);
        }
      }
      other => flat.push(other.as_f64().ok_or(AnchorError::NotNumeric { field })? as f32),
    }
  }

  if flat.len() % 2 != 0 {
    return Err(AnchorError::OddLength {
      field,
      len: flat.len(),
    });
  }
  Ok(pairs(&flat))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prior_multiplies_base_and_scale() {
    let spec = AnchorSpec::new(vec![[0.5, 0.25]], vec![[2.0, 4.0]]).unwrap();
    assert_eq!(spec.prior(0), (1.0, 1.0));
  }

  #[test]
  fn json_accepts_flat_and_nested() {
    let flat = AnchorSpec::from_json_str(r#"{"anchors": [1, 2, 3, 4], "wh_scale": [1, 1, 1, 1]}"#)
      .unwrap();
    let nested =
      AnchorSpec::from_json_str(r#"{"anchors": [[1, 2], [3, 4]], "wh_scale": [[1, 1], [1, 1]]}"#)
        .unwrap();
    assert_eq!(flat, nested);
    assert_eq!(flat.len(), 2);
  }

  #[test]
  fn binary_is_anchors_then_scale() {
    let values = [0.1f32, 0.2, 0.3, 0.4, 1.0, 2.0, 3.0, 4.0];
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let spec = AnchorSpec::from_bytes(&bytes).unwrap();
    assert_eq!(spec.anchors(), &[[0.1f32, 0.2], [0.3, 0.4]]);
    assert_eq!(spec.wh_scale(), &[[1.0f32, 2.0], [3.0, 4.0]]);
  }

  #[test]
  fn missing_wh_scale_is_fatal() {
    let err = AnchorSpec::from_json_str(r#"{"anchors": [1, 2]}"#).unwrap_err();
    assert!(matches!(err, AnchorError::MissingField("wh_scale")));
  }

  #[test]
  fn truncated_binary_is_fatal() {
    let err = AnchorSpec::from_bytes(&[0u8; 20]).unwrap_err();
    assert!(matches!(err, AnchorError::BinaryLength(20)));
  }

  #[test]
  fn declared_count_is_checked() {
    let err = AnchorSpec::from_json_str(
      r#"{"anchors": [1, 2], "wh_scale": [1, 1], "metadata": {"num_anchors": 8}}"#,
    )
    .unwrap_err();
    assert!(matches!(
      err,
      AnchorError::DeclaredMismatch {
        declared: 8,
        actual: 1
      }
    ));
  }
}
