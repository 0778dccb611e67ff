// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/model.rs - 模型
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

use crate::bbox::{FaceRegion, RawBox};

/// 只读推理能力，加载后在多个请求之间共享
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Debug, Clone)]
pub struct DetectItem {
  pub score: f32,
  pub bbox: RawBox, // 原图像素坐标
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn first(&self) -> Option<&DetectItem> {
    self.items.first()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl From<&DetectResult> for FaceRegion {
  /// 多张人脸时只取第一个结果
  fn from(result: &DetectResult) -> Self {
    FaceRegion::from(result.first().map(|item| item.bbox))
  }
}

mod onnx;
pub use self::onnx::OnnxError;

mod yunet;
pub use self::yunet::{YuNet, YuNetBuilder, YuNetConfig, YuNetError};

mod expression;
pub use self::expression::{ExpressionNet, ExpressionNetBuilder, ExpressionNetError};
