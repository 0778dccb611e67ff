// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/input/upload_folder.rs - 上传目录输入
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

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Upload};

#[derive(Error, Debug)]
pub enum UploadFolderInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Not a directory: {0}")]
  NotADirectory(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 目录中的每个文件视为一次上传，按文件名排序
///
/// 不按扩展名过滤：不合规的文件名交给上传校验处理并产生对应的错误响应。
pub struct UploadFolderInput {
  pending: VecDeque<PathBuf>,
}

impl UploadFolderInput {
  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl FromUrlWithScheme for UploadFolderInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for UploadFolderInput {
  type Error = UploadFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(UploadFolderInputError::SchemaMismatch);
    }

    let path = PathBuf::from(crate::url_path(url));
    if !path.is_dir() {
      return Err(UploadFolderInputError::NotADirectory(path.display().to_string()));
    }

    let mut files = std::fs::read_dir(&path)?
      .filter_map(|entry| entry.ok())
      .map(|entry| entry.path())
      .filter(|path| path.is_file())
      .collect::<Vec<_>>();
    files.sort();

    info!("上传目录 {} 中共有 {} 个文件", path.display(), files.len());
    Ok(UploadFolderInput {
      pending: files.into(),
    })
  }
}

impl Iterator for UploadFolderInput {
  type Item = Upload;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.pending.pop_front()?;
    let filename = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    // 读取失败的文件以空字节继续，随后得到“无法读取”的错误响应
    let bytes = std::fs::read(&path).unwrap_or_else(|e| {
      warn!("读取 {} 失败: {}", path.display(), e);
      Vec::new()
    });
    Some(Upload::new(filename, bytes))
  }
}
