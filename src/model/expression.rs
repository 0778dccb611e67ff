// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/model/expression.rs - 表情分类模型
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

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, NhwcTensor},
  model::{
    Model,
    onnx::{self, OnnxError, Runnable},
  },
  normalize::ChannelOrder,
};

#[derive(Error, Debug)]
pub enum ExpressionNetError {
  #[error("ONNX 错误: {0}")]
  OnnxError(#[from] OnnxError),
  #[error("张量错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
}

/// 以 NHWC `[1, H, W, 3]` 张量为输入、输出各类别分数的分类网络
pub struct ExpressionNet<const W: u32, const H: u32> {
  runnable: Runnable,
  channel_order: ChannelOrder,
}

pub struct ExpressionNetBuilder {
  model_path: String,
  channel_order: ChannelOrder,
}

impl FromUrlWithScheme for ExpressionNetBuilder {
  const SCHEME: &'static str = "expression";
}

impl FromUrl for ExpressionNetBuilder {
  type Error = ExpressionNetError;

  /// `expression:///path/to/model.onnx?channels=bgr`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ExpressionNetError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = ExpressionNetBuilder::new(crate::url_path(url));
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "channels" => {
          let order = value
            .parse()
            .map_err(ExpressionNetError::InvalidParameter)?;
          builder = builder.channel_order(order);
        }
        _ => {
          return Err(ExpressionNetError::InvalidParameter(format!(
            "{key}={value}"
          )));
        }
      }
    }
    Ok(builder)
  }
}

impl ExpressionNetBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      channel_order: ChannelOrder::default(),
    }
  }

  pub fn channel_order(mut self, channel_order: ChannelOrder) -> Self {
    self.channel_order = channel_order;
    self
  }

  pub fn build<const W: u32, const H: u32>(
    self,
  ) -> Result<ExpressionNet<W, H>, ExpressionNetError> {
    let shape = [1, H as usize, W as usize, 3];
    let runnable = onnx::load_runnable(&self.model_path, Some(&shape))?;

    Ok(ExpressionNet {
      runnable,
      channel_order: self.channel_order,
    })
  }
}

impl<const W: u32, const H: u32> ExpressionNet<W, H> {
  /// 训练时使用的像素通道顺序
  pub fn channel_order(&self) -> ChannelOrder {
    self.channel_order
  }
}

impl<const W: u32, const H: u32> Model for ExpressionNet<W, H> {
  type Input = NhwcTensor<W, H>;
  type Output = Vec<f32>;
  type Error = ExpressionNetError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("设置模型输入");
    let tensor = input.to_tract()?;

    debug!("执行模型推理");
    let outputs = onnx::run(&self.runnable, tensor)?;

    let first = outputs
      .first()
      .ok_or_else(|| ExpressionNetError::InvalidOutput("模型没有输出".to_string()))?;
    let scores = first
      .as_slice::<f32>()
      .map_err(|e| ExpressionNetError::InvalidOutput(format!("输出不是 f32: {e}")))?
      .to_vec();
    debug!("模型推理结果: {:?}", scores);

    Ok(scores)
  }
}
