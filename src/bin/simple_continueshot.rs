// 该文件是 Beifeng （北风） 项目的一部分。
// src/bin/simple_continueshot.rs - 连续帧检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use url::Url;

use beifeng::{
  FromUrl,
  model::Detector,
  nms::ClassMode,
  pipeline::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD, PipelineConfig},
  preprocess::CropMode,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Beifeng 连续检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型回放目录，例如 replay:///path/to/model
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源：image://<path> 或 raw://<path>?width=&height=&format=
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出：log://、fb://<path>、image://<path> 或 folder://<dir>
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 置信度阈值
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IoU 阈值
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou: f32,
  /// 强制按类别做 NMS
  #[arg(long)]
  pub class_aware: bool,
  /// 采样区域：full、center 或 x,y,w,h
  #[arg(long, default_value = "center", value_name = "CROP")]
  pub crop: CropMode,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = PipelineConfig {
    confidence_threshold: args.confidence,
    iou_threshold: args.iou,
    class_mode: args.class_aware.then_some(ClassMode::PerClass),
    crop: args.crop,
  };

  let input = beifeng::input::InputWrapper::from_url(&args.input)?;
  let model = Detector::from_replay_url(&args.model, config)?;
  let output = beifeng::output::OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interrupt_handler()
    .run_task(input, model, output)?;

  Ok(())
}
