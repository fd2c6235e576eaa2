// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/detector.rs - 检测器
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

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl,
  anchor::AnchorSpec,
  decode::Decoder,
  frame::RawFrame,
  metadata::ModelMetadata,
  model::{COCO, DetectResult, Model, ReplayError, ReplayRuntime, Runtime},
  pipeline::{Pipeline, PipelineConfig, PipelineError},
};

#[derive(Error, Debug)]
pub enum DetectorError<E: std::error::Error + 'static> {
  #[error("模型运行时错误: {0}")]
  Runtime(#[source] E),
  #[error("{0}")]
  Pipeline(#[from] PipelineError),
}

/// 运行时与后处理流水线的组合，对外表现为一个 `Model`
pub struct Detector<R> {
  pipeline: Pipeline,
  runtime: R,
}

impl<R: Runtime> Detector<R> {
  pub fn new(
    runtime: R,
    metadata: &ModelMetadata,
    anchors: Arc<AnchorSpec>,
    config: PipelineConfig,
    labels: &'static [&'static str],
  ) -> Result<Self, PipelineError> {
    if runtime.input_size() != metadata.input_size {
      return Err(PipelineError::InputSizeMismatch {
        runtime: runtime.input_size(),
        model: metadata.input_size,
      });
    }
    let decoder = Decoder::from_metadata(metadata, anchors)?;
    debug!("解码策略: {}", decoder.kind());
    let pipeline = Pipeline::new(config, metadata.input_size, decoder, labels);
    Ok(Self { pipeline, runtime })
  }

  pub fn pipeline(&self) -> &Pipeline {
    &self.pipeline
  }

  pub fn runtime(&self) -> &R {
    &self.runtime
  }
}

impl Detector<ReplayRuntime> {
  /// 由 `replay://<dir>` 构造回放检测器
  pub fn from_replay_url(url: &Url, config: PipelineConfig) -> Result<Self, ReplayError> {
    let runtime = ReplayRuntime::from_url(url)?;
    let metadata = runtime.metadata().clone();
    let anchors = runtime.anchors();
    info!("检测器配置: {:?}", config);
    Ok(Self::new(runtime, &metadata, anchors, config, COCO)?)
  }
}

impl<R> Model for Detector<R>
where
  R: Runtime,
  R::Error: std::error::Error + 'static,
{
  type Input = RawFrame;
  type Output = DetectResult;
  type Error = DetectorError<R::Error>;

  fn infer(&mut self, frame: &RawFrame) -> Result<DetectResult, Self::Error> {
    let viewport = self.pipeline.viewport_for(frame);
    let input = self.pipeline.preprocess(frame);
    let output = self.runtime.run(input).map_err(DetectorError::Runtime)?;
    Ok(self.pipeline.postprocess(output, &viewport)?)
  }
}
