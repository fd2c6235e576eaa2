// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/replay.rs - 回放运行时
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

//! 主机上代替 NPU 的运行时：从目录读取事先录制的 int8 输出张量。
//!
//! 目录结构：
//! - `model.json`：锚框与 `metadata`；若同时存在 `model.bin`，锚框取自二进制文件
//! - 稠密头：`output.bin`
//! - 直接回归头：`scores.bin`、`class_scores.bin`、`x1.bin`、`y1.bin`、`x2.bin`、`y2.bin`，
//!   各自的指数写在 `metadata.output_exponents` 中

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  anchor::{AnchorError, AnchorSpec},
  metadata::{HeadSpec, MetadataError, ModelMetadata},
  model::{DirectOutput, RawOutput, Runtime},
  pipeline::PipelineError,
  quant::QuantTensor,
  url_path,
};

const MODEL_JSON: &str = "model.json";
const MODEL_BIN: &str = "model.bin";
const DENSE_OUTPUT: &str = "output.bin";
const DIRECT_OUTPUTS: [&str; 6] = ["scores", "class_scores", "x1", "y1", "x2", "y2"];

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("回放目录读取错误 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("模型记录 JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("锚框错误: {0}")]
  Anchor(#[from] AnchorError),
  #[error("元数据错误: {0}")]
  Metadata(#[from] MetadataError),
  #[error("流水线错误: {0}")]
  Pipeline(#[from] PipelineError),
  #[error("URL 方案必须为 {expected}, 实际为 {actual}")]
  Scheme {
    expected: &'static str,
    actual: String,
  },
  #[error("输入张量长度 {actual} 与期望 {expected} 不一致")]
  InputLength { expected: usize, actual: usize },
}

/// 返回录制输出的运行时
#[derive(Debug, Clone)]
pub struct ReplayRuntime {
  input_size: u32,
  output: RawOutput,
  metadata: ModelMetadata,
  anchors: Arc<AnchorSpec>,
}

impl ReplayRuntime {
  /// 直接由内存中的输出构造，主要用于测试
  pub fn new(metadata: ModelMetadata, anchors: Arc<AnchorSpec>, output: RawOutput) -> Self {
    Self {
      input_size: metadata.input_size,
      output,
      metadata,
      anchors,
    }
  }

  pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, ReplayError> {
    let dir = dir.as_ref();
    info!("加载回放目录: {}", dir.display());

    let record_path = dir.join(MODEL_JSON);
    let text = std::fs::read_to_string(&record_path).map_err(|source| ReplayError::Io {
      path: record_path.clone(),
      source,
    })?;
    let record: Value = serde_json::from_str(&text)?;

    let bin_path = dir.join(MODEL_BIN);
    let anchors = if bin_path.is_file() {
      debug!("锚框取自 {}", bin_path.display());
      AnchorSpec::load(&bin_path)?
    } else {
      AnchorSpec::from_json(&record)?
    };
    let metadata = ModelMetadata::from_json(&record, anchors.len())?;

    let output = match &metadata.head {
      HeadSpec::Dense { exponent, .. } => {
        RawOutput::Dense(QuantTensor::new(read_i8(&dir.join(DENSE_OUTPUT))?, *exponent))
      }
      HeadSpec::Direct { .. } => {
        let exponents = record
          .get("metadata")
          .and_then(|m| m.get("output_exponents"));
        let mut tensors = Vec::with_capacity(DIRECT_OUTPUTS.len());
        for name in DIRECT_OUTPUTS {
          let exponent = exponents
            .and_then(|e| e.get(name))
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32;
          let data = read_i8(&dir.join(format!("{}.bin", name)))?;
          tensors.push(QuantTensor::new(data, exponent));
        }
        let mut tensors = tensors.into_iter();
        let mut next = || tensors.next().unwrap_or_default();
        RawOutput::Direct(DirectOutput {
          scores: next(),
          class_scores: next(),
          x1: next(),
          y1: next(),
          x2: next(),
          y2: next(),
        })
      }
    };
    info!(
      "回放模型: 输入 {}x{}, {} 检测头, {} 个锚框",
      metadata.input_size,
      metadata.input_size,
      output.kind(),
      anchors.len()
    );

    Ok(Self::new(metadata, Arc::new(anchors), output))
  }

  pub fn metadata(&self) -> &ModelMetadata {
    &self.metadata
  }

  pub fn anchors(&self) -> Arc<AnchorSpec> {
    Arc::clone(&self.anchors)
  }
}

fn read_i8(path: &Path) -> Result<Vec<i8>, ReplayError> {
  let bytes = std::fs::read(path).map_err(|source| ReplayError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  debug!("读取 {}: {} 字节", path.display(), bytes.len());
  Ok(bytes.into_iter().map(|b| b as i8).collect())
}

impl Runtime for ReplayRuntime {
  type Error = ReplayError;

  fn input_size(&self) -> u32 {
    self.input_size
  }

  fn run(&mut self, input: &[f32]) -> Result<&RawOutput, Self::Error> {
    let side = self.input_size as usize;
    let expected = side * side * 3;
    if input.len() != expected {
      return Err(ReplayError::InputLength {
        expected,
        actual: input.len(),
      });
    }
    Ok(&self.output)
  }
}

impl FromUrl for ReplayRuntime {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::Scheme {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }
    Self::load(url_path(url))
  }
}

impl FromUrlWithScheme for ReplayRuntime {
  const SCHEME: &'static str = "replay";
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("beifeng-replay-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn loads_dense_recording() {
    let dir = temp_dir("dense");
    std::fs::write(
      dir.join(MODEL_JSON),
      r#"{"anchors": [0.5, 0.5], "wh_scale": [1.0, 1.0],
          "metadata": {"input_size": 8, "grid": [1, 1], "output_exponent": -2}}"#,
    )
    .unwrap();
    std::fs::write(dir.join(DENSE_OUTPUT), [0u8, 0, 0, 0, 127, 127, 127]).unwrap();

    let mut runtime = ReplayRuntime::load(&dir).unwrap();
    assert_eq!(runtime.input_size(), 8);
    assert_eq!(runtime.anchors().len(), 1);
    let output = runtime.run(&vec![0.0; 8 * 8 * 3]).unwrap();
    match output {
      RawOutput::Dense(t) => {
        assert_eq!(t.len(), 7);
        assert_eq!(t.exponent, -2);
      }
      other => panic!("unexpected head {}", other.kind()),
    }
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn rejects_wrong_input_length() {
    let metadata = ModelMetadata::dense_default(1);
    let anchors = Arc::new(AnchorSpec::new(vec![[1.0, 1.0]], vec![[1.0, 1.0]]).unwrap());
    let mut runtime = ReplayRuntime::new(metadata, anchors, RawOutput::Dense(QuantTensor::default()));
    let err = runtime.run(&[0.0; 3]).unwrap_err();
    assert!(matches!(
      err,
      ReplayError::InputLength {
        expected: 12288,
        actual: 3
      }
    ));
  }

  #[test]
  fn rejects_foreign_scheme() {
    let url = Url::parse("file:///tmp/model").unwrap();
    assert!(matches!(
      ReplayRuntime::from_url(&url),
      Err(ReplayError::Scheme { .. })
    ));
  }
}
