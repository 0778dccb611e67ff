// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/output.rs - 输出定义
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

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::BoundingBox,
  input::Upload,
  pipeline::Prediction,
  response::{PredictError, PredictionResponse},
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 一次请求的输出结果
pub type Outcome = Result<Prediction, PredictError>;

/// 写入文件的记录：响应本身加上文件名与裁剪区域
#[derive(Debug, Serialize)]
pub struct RecordEntry<'a> {
  pub file: Option<&'a str>,
  pub response: PredictionResponse,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub face: Option<BoundingBox>,
}

impl<'a> RecordEntry<'a> {
  pub fn new(upload: &'a Upload, outcome: &Outcome) -> Self {
    Self {
      file: upload.filename.as_deref(),
      response: outcome.into(),
      face: outcome.as_ref().ok().map(|prediction| prediction.face),
    }
  }
}

mod stdout;
pub use self::stdout::{StdoutOutput, StdoutOutputError};

mod json_lines;
pub use self::json_lines::{JsonLinesOutput, JsonLinesOutputError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("标准输出错误: {0}")]
  StdoutOutputError(#[from] StdoutOutputError),
  #[error("JSON 文件输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  Stdout(StdoutOutput),
  JsonLines(JsonLinesOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      StdoutOutput::SCHEME => Ok(OutputWrapper::Stdout(StdoutOutput::from_url(url)?)),
      JsonLinesOutput::SCHEME => Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecord(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<Upload, Outcome> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &Upload, result: &Outcome) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Stdout(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::JsonLines(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bbox::FaceRegion;

  #[test]
  fn record_carries_face_only_on_success() {
    let upload = Upload::new("me.png", Vec::new());
    let ok: Outcome = Ok(Prediction {
      label: "Senyum".to_string(),
      index: 3,
      scores: vec![0.0, 0.0, 0.0, 1.0, 0.0],
      face: BoundingBox::new(80, 80, 90, 90),
      region: FaceRegion::NotDetected,
    });
    let json = serde_json::to_string(&RecordEntry::new(&upload, &ok)).unwrap();
    assert_eq!(
      json,
      r#"{"file":"me.png","response":{"prediction":"Senyum"},"face":{"x":80,"y":80,"width":90,"height":90}}"#
    );

    let err: Outcome = Err(PredictError::InvalidImage);
    let json = serde_json::to_string(&RecordEntry::new(&upload, &err)).unwrap();
    assert_eq!(
      json,
      r#"{"file":"me.png","response":{"error":"Invalid image or unreadable file"}}"#
    );
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }
}
