// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/bin/predict_batch.rs - 批量表情识别
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use ekspresi::{
  FromUrl,
  classifier::ExpressionClassifier,
  input::InputWrapper,
  label::LabelSet,
  model::{ExpressionNetBuilder, YuNetBuilder},
  normalize::{TARGET_HEIGHT, TARGET_WIDTH},
  output::OutputWrapper,
  pipeline::PredictionPipeline,
  task::{BatchTask, Task},
};
use tracing::{info, warn};

/// Ekspresi 批量识别参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 人脸检测模型，例如 yunet:///models/face_detection_yunet.onnx?score=0.9
  #[arg(long, value_name = "MODEL")]
  pub detector: Url,
  /// 表情分类模型，例如 expression:///models/human_expression.onnx
  #[arg(long, value_name = "MODEL")]
  pub classifier: Url,
  /// 上传目录，例如 folder:///uploads
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出位置，例如 stdout://、json:///out/results.jsonl、folder:///out?annotate
  #[arg(long, value_name = "OUTPUT", default_value = "stdout://")]
  pub output: Url,
  /// 类别表（TOML），缺省使用内置类别
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 最多处理的请求数
  #[arg(long, value_name = "COUNT")]
  pub limit: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测模型: {}", args.detector);
  info!("分类模型: {}", args.classifier);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = match &args.labels {
    Some(path) => LabelSet::from_path(path)?,
    None => LabelSet::default(),
  };
  let detector = YuNetBuilder::from_url(&args.detector)?.build()?;
  let net =
    ExpressionNetBuilder::from_url(&args.classifier)?.build::<TARGET_WIDTH, TARGET_HEIGHT>()?;
  let channel_order = net.channel_order();
  let classifier = ExpressionClassifier::new(net);

  let pipeline =
    PredictionPipeline::new(&detector, &classifier, &labels).with_channel_order(channel_order);
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let summary = BatchTask::default()
    .with_limit(args.limit)
    .with_interrupt(true)
    .run_task(input, &pipeline, output)?;

  if summary.failed > 0 {
    warn!("{} 个请求失败", summary.failed);
  }
  info!("完成: {:?}", summary);

  Ok(())
}
