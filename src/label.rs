// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/label.rs - 表情类别表
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

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// 分类模型输出的类别数
pub const LABEL_COUNT: usize = 5;

const DEFAULT_LABELS: [&str; LABEL_COUNT] = ["Marah", "Netral", "Sedih", "Senyum", "Terkejut"];

#[derive(Error, Debug)]
pub enum LabelSetError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("类别文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("类别数量不匹配: 期望 {expected}, 实际 {actual}")]
  CountMismatch { expected: usize, actual: usize },
  #[error("第 {0} 个类别名为空")]
  EmptyLabel(usize),
  #[error("类别名重复: {0}")]
  DuplicateLabel(String),
}

#[derive(Deserialize)]
struct LabelFile {
  labels: Vec<String>,
}

/// 有序的表情类别表，下标与模型输出一一对应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
  labels: [String; LABEL_COUNT],
}

impl Default for LabelSet {
  fn default() -> Self {
    Self {
      labels: DEFAULT_LABELS.map(String::from),
    }
  }
}

impl LabelSet {
  pub const LEN: usize = LABEL_COUNT;

  pub fn from_toml_str(content: &str) -> Result<Self, LabelSetError> {
    let file: LabelFile = toml::from_str(content)?;
    Self::try_from(file.labels)
  }

  pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LabelSetError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn position(&self, label: &str) -> Option<usize> {
    self.labels.iter().position(|l| l == label)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    LABEL_COUNT
  }

  pub fn is_empty(&self) -> bool {
    false
  }
}

impl TryFrom<Vec<String>> for LabelSet {
  type Error = LabelSetError;

  fn try_from(labels: Vec<String>) -> Result<Self, Self::Error> {
    let actual = labels.len();
    let labels: [String; LABEL_COUNT] =
      labels
        .try_into()
        .map_err(|_| LabelSetError::CountMismatch {
          expected: LABEL_COUNT,
          actual,
        })?;

    for (index, label) in labels.iter().enumerate() {
      if label.trim().is_empty() {
        return Err(LabelSetError::EmptyLabel(index));
      }
      if labels[..index].contains(label) {
        return Err(LabelSetError::DuplicateLabel(label.clone()));
      }
    }

    Ok(Self { labels })
  }
}
