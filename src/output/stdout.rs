// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/output/stdout.rs - 标准输出
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

use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Upload,
  output::{Outcome, RecordEntry, Render},
  response::PredictionResponse,
};

#[derive(Error, Debug)]
pub enum StdoutOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每个请求打印一行 JSON
///
/// 默认只打印响应本身，`stdout://?record` 时附带文件名与裁剪区域。
pub struct StdoutOutput {
  record: bool,
}

impl StdoutOutput {
  pub fn line(&self, upload: &Upload, outcome: &Outcome) -> Result<String, StdoutOutputError> {
    let line = if self.record {
      serde_json::to_string(&RecordEntry::new(upload, outcome))?
    } else {
      PredictionResponse::from(outcome).to_json()?
    };
    Ok(line)
  }
}

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = StdoutOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StdoutOutputError::SchemeMismatch);
    }
    let record = url.query_pairs().any(|(k, _)| k == "record");
    Ok(StdoutOutput { record })
  }
}

impl Render<Upload, Outcome> for StdoutOutput {
  type Error = StdoutOutputError;

  fn render_result(&self, frame: &Upload, result: &Outcome) -> Result<(), Self::Error> {
    let line = self.line(frame, result)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    Ok(())
  }
}
