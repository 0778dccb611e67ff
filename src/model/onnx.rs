// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/model/onnx.rs - ONNX 图加载与执行
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

use thiserror::Error;
use tracing::{debug, info, warn};
use tract_onnx::prelude::{
  Datum, Framework, Graph, InferenceFact, InferenceModelExt, IntoTensor, SimplePlan, Tensor,
  TypedFact, TypedOp, tvec,
};

pub(crate) type Runnable =
  SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型文件不存在: {0}")]
  NotFound(String),
  #[error("ONNX 图解析失败: {0}")]
  ParseError(String),
  #[error("ONNX 图无法运行: {0}")]
  PlanError(String),
  #[error("ONNX 推理失败: {0}")]
  RunError(String),
}

/// 加载 ONNX 图。优化失败时退回到未优化的图。
pub(crate) fn load_runnable(
  path: &str,
  input_shape: Option<&[usize]>,
) -> Result<Runnable, OnnxError> {
  if !Path::new(path).exists() {
    return Err(OnnxError::NotFound(path.to_string()));
  }

  info!("加载模型文件: {}", path);
  if let Ok(meta) = std::fs::metadata(path) {
    debug!(
      "模型文件大小: {:.2} MB",
      meta.len() as f64 / (1024.0 * 1024.0)
    );
  }

  let parse = || {
    let mut model = tract_onnx::onnx()
      .model_for_path(path)
      .map_err(|e| OnnxError::ParseError(e.to_string()))?;
    if let Some(shape) = input_shape {
      model = model
        .with_input_fact(
          0,
          InferenceFact::dt_shape(f32::datum_type(), shape.iter().copied()),
        )
        .map_err(|e| OnnxError::ParseError(e.to_string()))?;
    }
    Ok::<_, OnnxError>(model)
  };

  let optimized = parse()?
    .into_optimized()
    .and_then(|model| model.into_runnable());

  match optimized {
    Ok(runnable) => {
      info!("模型加载完成");
      Ok(runnable)
    }
    Err(e) => {
      warn!("模型优化失败 ({}), 改用未优化的图", e);
      let runnable = parse()?
        .into_typed()
        .and_then(|model| model.into_decluttered())
        .and_then(|model| model.into_runnable())
        .map_err(|e| OnnxError::PlanError(e.to_string()))?;
      info!("模型加载完成（未优化）");
      Ok(runnable)
    }
  }
}

/// 执行单输入推理，返回全部输出张量
pub(crate) fn run(runnable: &Runnable, input: Tensor) -> Result<Vec<Tensor>, OnnxError> {
  let outputs = runnable
    .run(tvec![input.into()])
    .map_err(|e| OnnxError::RunError(e.to_string()))?;

  Ok(outputs.into_iter().map(|value| value.into_tensor()).collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  #[test]
  fn missing_model_is_reported() {
    let err = load_runnable("/nonexistent/model.onnx", None).unwrap_err();
    assert!(matches!(err, OnnxError::NotFound(_)));
  }

  #[test]
  fn garbage_model_fails_to_parse() {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(b"not a real onnx file").unwrap();
    let path = temp.path().to_string_lossy().to_string();
    let err = load_runnable(&path, Some(&[1, 4, 4, 3])).unwrap_err();
    assert!(matches!(err, OnnxError::ParseError(_)));
  }
}
