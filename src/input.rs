// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/input.rs - 上传图像输入
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

use crate::{FromUrl, FromUrlWithScheme};

/// 一次上传：文件名（可能缺失）与未解码的原始字节
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Upload {
  pub filename: Option<String>,
  pub bytes: Vec<u8>,
}

impl Upload {
  pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      filename: Some(filename.into()),
      bytes,
    }
  }
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

mod upload_folder;
pub use self::upload_folder::{UploadFolderInput, UploadFolderInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("Upload folder input error: {0}")]
  UploadFolderInputError(#[from] UploadFolderInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  UploadFolder(UploadFolderInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      UploadFolderInput::SCHEME => {
        let input = UploadFolderInput::from_url(url)?;
        Ok(InputWrapper::UploadFolder(input))
      }
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Upload;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::UploadFolder(input) => input.next(),
    }
  }
}
