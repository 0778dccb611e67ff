// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/normalize.rs - 人脸区域裁剪与归一化
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

use std::str::FromStr;

use image::{RgbImage, imageops, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::{
  bbox::BoundingBox,
  frame::{FrameError, NhwcTensor},
};

pub const TARGET_WIDTH: u32 = 224;
pub const TARGET_HEIGHT: u32 = 224;

/// 分类模型的输入张量 `[1, 224, 224, 3]`
pub type FaceTensor = NhwcTensor<TARGET_WIDTH, TARGET_HEIGHT>;

#[derive(Error, Debug)]
pub enum NormalizeError {
  #[error("Invalid image or unreadable file")]
  InvalidImage,
  #[error("裁剪区域 {bbox:?} 超出图像范围 {width}x{height}")]
  OutOfBounds {
    bbox: BoundingBox,
    width: u32,
    height: u32,
  },
  #[error("张量错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 写入张量时的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  Rgb,
  /// 与 OpenCV 读图一致，训练时使用的顺序
  #[default]
  Bgr,
}

impl FromStr for ChannelOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb" => Ok(ChannelOrder::Rgb),
      "bgr" => Ok(ChannelOrder::Bgr),
      other => Err(format!("未知的通道顺序: {other}")),
    }
  }
}

/// 将图像中的人脸区域裁剪、拉伸到 `W x H`，并把像素缩放到 `[0, 1]`
#[derive(Debug, Clone, Copy)]
pub struct FaceNormalizer<const W: u32, const H: u32> {
  filter: FilterType,
  channel_order: ChannelOrder,
}

impl<const W: u32, const H: u32> Default for FaceNormalizer<W, H> {
  fn default() -> Self {
    Self {
      filter: FilterType::Triangle,
      channel_order: ChannelOrder::default(),
    }
  }
}

impl<const W: u32, const H: u32> FaceNormalizer<W, H> {
  pub fn with_channel_order(mut self, channel_order: ChannelOrder) -> Self {
    self.channel_order = channel_order;
    self
  }

  pub fn channel_order(&self) -> ChannelOrder {
    self.channel_order
  }

  pub fn normalize(
    &self,
    image: &RgbImage,
    bbox: &BoundingBox,
  ) -> Result<NhwcTensor<W, H>, NormalizeError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(NormalizeError::InvalidImage);
    }
    if !bbox.fits_within(width, height) {
      return Err(NormalizeError::OutOfBounds {
        bbox: *bbox,
        width,
        height,
      });
    }

    let face = imageops::crop_imm(image, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
    // 不保持宽高比，直接拉伸到模型输入尺寸
    let resized = imageops::resize(&face, W, H, self.filter);
    debug!("人脸区域 {}x{} 缩放到 {}x{}", bbox.width, bbox.height, W, H);

    let mut data = Vec::with_capacity(3 * W as usize * H as usize);
    for pixel in resized.pixels() {
      let [r, g, b] = pixel.0;
      let ordered = match self.channel_order {
        ChannelOrder::Rgb => [r, g, b],
        ChannelOrder::Bgr => [b, g, r],
      };
      data.extend(ordered.iter().map(|&v| f32::from(v) / 255.0));
    }

    Ok(NhwcTensor::try_from(data)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
  }

  #[test]
  fn output_shape_and_range_for_any_box() {
    let image = gradient(400, 300);
    let normalizer = FaceNormalizer::<TARGET_WIDTH, TARGET_HEIGHT>::default();
    for bbox in [
      BoundingBox::new(0, 0, 1, 1),
      BoundingBox::new(80, 80, 90, 90),
      BoundingBox::new(0, 0, 400, 300),
      BoundingBox::new(399, 0, 1, 300),
    ] {
      let tensor = normalizer.normalize(&image, &bbox).unwrap();
      assert_eq!(tensor.shape(), [1, 224, 224, 3]);
      assert!(tensor.as_ref().iter().all(|v| (0.0..=1.0).contains(v)));
    }
  }

  #[test]
  fn uniform_color_scales_by_255() {
    let image = RgbImage::from_pixel(50, 40, Rgb([255, 0, 51]));
    let tensor = FaceNormalizer::<8, 8>::default()
      .with_channel_order(ChannelOrder::Rgb)
      .normalize(&image, &BoundingBox::new(10, 10, 20, 20))
      .unwrap();
    let close = |value: Option<f32>, expected: f32| (value.unwrap() - expected).abs() < 1e-2;
    assert!(close(tensor.get(3, 3, 0), 1.0));
    assert!(close(tensor.get(3, 3, 1), 0.0));
    assert!(close(tensor.get(3, 3, 2), 0.2));
  }

  #[test]
  fn bgr_order_swaps_red_and_blue() {
    let image = RgbImage::from_pixel(10, 10, Rgb([255, 128, 0]));
    let tensor = FaceNormalizer::<4, 4>::default()
      .normalize(&image, &BoundingBox::new(0, 0, 10, 10))
      .unwrap();
    assert!(tensor.get(0, 0, 0).unwrap() < 0.01);
    assert!(tensor.get(0, 0, 2).unwrap() > 0.99);
  }

  #[test]
  fn empty_image_is_invalid() {
    let image = RgbImage::new(0, 0);
    let err = FaceNormalizer::<4, 4>::default()
      .normalize(&image, &BoundingBox::new(0, 0, 1, 1))
      .unwrap_err();
    assert!(matches!(err, NormalizeError::InvalidImage));
    assert_eq!(err.to_string(), "Invalid image or unreadable file");
  }

  #[test]
  fn rejects_box_outside_image() {
    let image = gradient(20, 20);
    let err = FaceNormalizer::<4, 4>::default()
      .normalize(&image, &BoundingBox::new(15, 0, 10, 10))
      .unwrap_err();
    assert!(matches!(err, NormalizeError::OutOfBounds { .. }));
  }

  #[test]
  fn parses_channel_order() {
    assert_eq!("RGB".parse::<ChannelOrder>(), Ok(ChannelOrder::Rgb));
    assert_eq!("bgr".parse::<ChannelOrder>(), Ok(ChannelOrder::Bgr));
    assert!("yuv".parse::<ChannelOrder>().is_err());
  }
}
