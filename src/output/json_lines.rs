// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 文件输出
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

use std::{
  fs::{File, OpenOptions},
  io::Write,
  path::PathBuf,
  sync::Mutex,
};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Upload,
  output::{Outcome, RecordEntry, Render},
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("输出文件锁已损坏")]
  Poisoned,
}

/// 追加写入的记录文件，每行一条 [`RecordEntry`]
pub struct JsonLinesOutput {
  file: Mutex<File>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    let path = PathBuf::from(crate::url_path(url));
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    info!("结果写入 {}", path.display());

    Ok(JsonLinesOutput {
      file: Mutex::new(file),
    })
  }
}

impl Render<Upload, Outcome> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, frame: &Upload, result: &Outcome) -> Result<(), Self::Error> {
    let line = serde_json::to_string(&RecordEntry::new(frame, result))?;
    let mut file = self.file.lock().map_err(|_| JsonLinesOutputError::Poisoned)?;
    writeln!(file, "{line}")?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::response::PredictError;

  #[test]
  fn appends_one_line_per_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("results.jsonl");
    let url = Url::parse(&format!("json://{}", path.display())).unwrap();

    let output = JsonLinesOutput::from_url(&url).unwrap();
    output
      .render_result(&Upload::default(), &Err(PredictError::NoFileSupplied))
      .unwrap();
    output
      .render_result(
        &Upload::new("", Vec::new()),
        &Err(PredictError::EmptyFileName),
      )
      .unwrap();
    drop(output);

    let content = std::fs::read_to_string(&path).unwrap();
    let lines = content.lines().collect::<Vec<_>>();
    assert_eq!(
      lines,
      vec![
        r#"{"file":null,"response":{"error":"No file part"}}"#,
        r#"{"file":"","response":{"error":"No selected file"}}"#,
      ]
    );
  }
}
