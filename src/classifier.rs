// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/classifier.rs - 表情分类器
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

use crate::{label::LABEL_COUNT, model::Model, normalize::FaceTensor};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
  #[error("分类模型错误: {0}")]
  Backend(String),
  #[error("分数数量不匹配: 期望 {expected}, 实际 {actual}")]
  ScoreCount { expected: usize, actual: usize },
}

/// 包装任意分类模型，保证输出与类别表等长
pub struct ExpressionClassifier<M> {
  model: M,
}

impl<M> ExpressionClassifier<M>
where
  M: Model<Input = FaceTensor, Output = Vec<f32>>,
  M::Error: std::fmt::Display,
{
  pub fn new(model: M) -> Self {
    Self { model }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 返回每个类别的分数，顺序与类别表一致
  pub fn classify(&self, tensor: &FaceTensor) -> Result<Vec<f32>, ClassifyError> {
    let scores = self
      .model
      .infer(tensor)
      .map_err(|e| ClassifyError::Backend(e.to_string()))?;

    if scores.len() != LABEL_COUNT {
      return Err(ClassifyError::ScoreCount {
        expected: LABEL_COUNT,
        actual: scores.len(),
      });
    }

    debug!("分类分数: {:?}", scores);
    Ok(scores)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Fixed(Vec<f32>);

  impl Model for Fixed {
    type Input = FaceTensor;
    type Output = Vec<f32>;
    type Error = std::convert::Infallible;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Ok(self.0.clone())
    }
  }

  struct Broken;

  impl Model for Broken {
    type Input = FaceTensor;
    type Output = Vec<f32>;
    type Error = String;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Err("device lost".to_string())
    }
  }

  #[test]
  fn passes_scores_through() {
    let classifier = ExpressionClassifier::new(Fixed(vec![0.1, 0.2, 0.3, 0.2, 0.2]));
    let scores = classifier.classify(&FaceTensor::default()).unwrap();
    assert_eq!(scores, vec![0.1, 0.2, 0.3, 0.2, 0.2]);
  }

  #[test]
  fn rejects_wrong_score_count() {
    let classifier = ExpressionClassifier::new(Fixed(vec![0.5, 0.5]));
    assert_eq!(
      classifier.classify(&FaceTensor::default()),
      Err(ClassifyError::ScoreCount {
        expected: 5,
        actual: 2
      })
    );
  }

  #[test]
  fn reports_backend_failure() {
    let classifier = ExpressionClassifier::new(Broken);
    assert_eq!(
      classifier.classify(&FaceTensor::default()),
      Err(ClassifyError::Backend("device lost".to_string()))
    );
  }
}
