// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/response.rs - 对外的预测结果与错误
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::Prediction;

/// 允许上传的图像扩展名
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 一次请求的终止错误，消息直接展示给用户
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
  #[error("No file part")]
  NoFileSupplied,
  #[error("No selected file")]
  EmptyFileName,
  #[error("Invalid file format")]
  UnsupportedFormat,
  #[error("Invalid image or unreadable file")]
  InvalidImage,
  #[error("Inference failed: {0}")]
  Inference(String),
}

/// 返回给调用方的 JSON：`{"prediction": ...}` 或 `{"error": ...}`，二者必居其一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionResponse {
  #[serde(rename = "prediction")]
  Prediction(String),
  #[serde(rename = "error")]
  Error(String),
}

impl PredictionResponse {
  pub fn is_error(&self) -> bool {
    matches!(self, PredictionResponse::Error(_))
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string(self)
  }
}

impl From<&PredictError> for PredictionResponse {
  fn from(err: &PredictError) -> Self {
    PredictionResponse::Error(err.to_string())
  }
}

impl From<&Prediction> for PredictionResponse {
  fn from(prediction: &Prediction) -> Self {
    PredictionResponse::Prediction(prediction.label.clone())
  }
}

impl From<&Result<Prediction, PredictError>> for PredictionResponse {
  fn from(outcome: &Result<Prediction, PredictError>) -> Self {
    match outcome {
      Ok(prediction) => prediction.into(),
      Err(err) => err.into(),
    }
  }
}

/// 文件名需带扩展名，且扩展名（不区分大小写）在允许列表中
pub fn allowed_file(filename: &str) -> bool {
  filename
    .rsplit_once('.')
    .map(|(_, ext)| {
      let ext = ext.to_ascii_lowercase();
      ALLOWED_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}

/// 检查上传的文件名，依次对应“未上传”“文件名为空”“格式不支持”
pub fn validate_upload(filename: Option<&str>) -> Result<&str, PredictError> {
  let filename = filename.ok_or(PredictError::NoFileSupplied)?;
  if filename.is_empty() {
    return Err(PredictError::EmptyFileName);
  }
  if !allowed_file(filename) {
    return Err(PredictError::UnsupportedFormat);
  }
  Ok(filename)
}
