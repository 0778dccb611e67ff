// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/frame.rs - NHWC 浮点张量定义
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
use tract_onnx::prelude::Tensor;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("张量构建失败: {0}")]
  Tensor(String),
}

/// 批大小为 1 的 NHWC 浮点张量，形状为 `[1, H, W, 3]`
#[derive(Debug, Clone, PartialEq)]
pub struct NhwcTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> NhwcTensor<W, H> {
  const LEN: usize = RGB_CHANNELS * W as usize * H as usize;

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, self.height(), self.width(), self.channels()]
  }

  /// 读取 (y, x, c) 处的值，越界时返回 None
  pub fn get(&self, y: usize, x: usize, c: usize) -> Option<f32> {
    if y >= self.height() || x >= self.width() || c >= RGB_CHANNELS {
      return None;
    }
    let index = (y * self.width() + x) * RGB_CHANNELS + c;
    self.data.get(index).copied()
  }

  /// 转换为 tract 推理所需的张量
  pub fn to_tract(&self) -> Result<Tensor, FrameError> {
    Tensor::from_shape(&self.shape(), &self.data).map_err(|e| FrameError::Tensor(e.to_string()))
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<f32>> for NhwcTensor<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameError::LengthMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for NhwcTensor<W, H> {
  fn default() -> Self {
    let data = vec![0f32; Self::LEN].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> AsRef<[f32]> for NhwcTensor<W, H> {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_tensor_has_batch_dimension() {
    let tensor = NhwcTensor::<4, 2>::default();
    assert_eq!(tensor.shape(), [1, 2, 4, 3]);
    assert_eq!(tensor.as_ref().len(), 24);
  }

  #[test]
  fn rejects_wrong_length() {
    let err = NhwcTensor::<4, 2>::try_from(vec![0.0; 10]).unwrap_err();
    assert!(matches!(
      err,
      FrameError::LengthMismatch {
        expected: 24,
        actual: 10
      }
    ));
  }

  #[test]
  fn indexes_in_row_major_hwc_order() {
    let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
    let tensor = NhwcTensor::<4, 2>::try_from(data).unwrap();
    assert_eq!(tensor.get(0, 0, 0), Some(0.0));
    assert_eq!(tensor.get(0, 1, 2), Some(5.0));
    assert_eq!(tensor.get(1, 0, 0), Some(12.0));
    assert_eq!(tensor.get(2, 0, 0), None);
  }

  #[test]
  fn converts_to_tract_tensor() {
    let tensor = NhwcTensor::<4, 2>::default();
    let converted = tensor.to_tract().unwrap();
    assert_eq!(converted.shape(), &[1, 2, 4, 3]);
  }
}
