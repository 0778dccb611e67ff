// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/pipeline.rs - 表情识别流水线
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

use std::{fmt::Display, path::Path};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  bbox::{self, BoundingBox, FACE_PADDING, FaceRegion},
  classifier::ExpressionClassifier,
  input::Upload,
  label::LabelSet,
  model::{DetectResult, Model},
  normalize::{
    ChannelOrder, FaceNormalizer, FaceTensor, NormalizeError, TARGET_HEIGHT, TARGET_WIDTH,
  },
  response::{PredictError, validate_upload},
};

/// 一次成功识别的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub label: String,
  pub index: usize,
  pub scores: Vec<f32>,
  /// 实际送入分类器的裁剪区域
  pub face: BoundingBox,
  pub region: FaceRegion,
}

/// 处理一次上传请求
pub trait Predict {
  fn predict_upload(&self, upload: &Upload) -> Result<Prediction, PredictError>;
}

impl<P: Predict + ?Sized> Predict for &P {
  fn predict_upload(&self, upload: &Upload) -> Result<Prediction, PredictError> {
    (**self).predict_upload(upload)
  }
}

/// 取最大分数的下标，并列时取最靠前者；NaN 不参与比较
pub fn argmax(scores: &[f32]) -> Option<usize> {
  let mut best: Option<(usize, f32)> = None;
  for (index, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, max)) if score <= max => {}
      _ => best = Some((index, score)),
    }
  }
  best.map(|(index, _)| index)
}

/// 将上传的字节解码为 RGB 图像
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PredictError> {
  let image = image::load_from_memory(bytes).map_err(|e| {
    warn!("图像解码失败: {}", e);
    PredictError::InvalidImage
  })?;
  let image = image.to_rgb8();
  if image.width() == 0 || image.height() == 0 {
    return Err(PredictError::InvalidImage);
  }
  Ok(image)
}

/// 检测 → 调整边框 → 归一化 → 分类 → 选择类别
///
/// 模型与类别表只以共享引用持有，可在多个请求、多个线程间复用。
pub struct PredictionPipeline<'a, D, C> {
  detector: &'a D,
  classifier: &'a ExpressionClassifier<C>,
  labels: &'a LabelSet,
  normalizer: FaceNormalizer<TARGET_WIDTH, TARGET_HEIGHT>,
}

impl<'a, D, C> PredictionPipeline<'a, D, C>
where
  D: Model<Input = RgbImage, Output = DetectResult>,
  D::Error: Display,
  C: Model<Input = FaceTensor, Output = Vec<f32>>,
  C::Error: Display,
{
  pub fn new(
    detector: &'a D,
    classifier: &'a ExpressionClassifier<C>,
    labels: &'a LabelSet,
  ) -> Self {
    Self {
      detector,
      classifier,
      labels,
      normalizer: FaceNormalizer::default(),
    }
  }

  pub fn with_channel_order(mut self, channel_order: ChannelOrder) -> Self {
    self.normalizer = self.normalizer.with_channel_order(channel_order);
    self
  }

  pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction, PredictError> {
    let image = decode_image(bytes)?;
    self.predict_image(&image)
  }

  /// 按上传的规则校验文件名后读取并识别
  pub fn predict_path<P: AsRef<Path>>(&self, path: P) -> Result<Prediction, PredictError> {
    let path = path.as_ref();
    let filename = path.file_name().map(|name| name.to_string_lossy());
    validate_upload(filename.as_deref())?;
    let bytes = std::fs::read(path).map_err(|e| {
      warn!("读取文件 {} 失败: {}", path.display(), e);
      PredictError::InvalidImage
    })?;
    self.predict_bytes(&bytes)
  }

  /// 检测人脸；检测器出错时视同未检测到人脸
  pub fn locate(&self, image: &RgbImage) -> FaceRegion {
    match self.detector.infer(image) {
      Ok(result) => {
        debug!("检测到 {} 张人脸", result.len());
        FaceRegion::from(&result)
      }
      Err(e) => {
        warn!("人脸检测失败，使用图像中心区域: {}", e);
        FaceRegion::NotDetected
      }
    }
  }

  pub fn predict_image(&self, image: &RgbImage) -> Result<Prediction, PredictError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(PredictError::InvalidImage);
    }

    let region = self.locate(image);
    let face = bbox::adjust(region, width, height, FACE_PADDING);
    debug!("人脸区域: {:?} -> {:?}", region, face);

    let tensor = self.normalizer.normalize(image, &face).map_err(|e| match e {
      NormalizeError::InvalidImage => PredictError::InvalidImage,
      other => PredictError::Inference(other.to_string()),
    })?;

    let scores = self
      .classifier
      .classify(&tensor)
      .map_err(|e| PredictError::Inference(e.to_string()))?;

    let index = argmax(&scores)
      .ok_or_else(|| PredictError::Inference("分类分数全部无效".to_string()))?;
    let label = self
      .labels
      .get(index)
      .ok_or_else(|| PredictError::Inference(format!("类别下标 {index} 超出类别表")))?
      .to_string();

    info!("识别结果: {} ({:.4})", label, scores[index]);
    Ok(Prediction {
      label,
      index,
      scores,
      face,
      region,
    })
  }
}

impl<D, C> Predict for PredictionPipeline<'_, D, C>
where
  D: Model<Input = RgbImage, Output = DetectResult>,
  D::Error: Display,
  C: Model<Input = FaceTensor, Output = Vec<f32>>,
  C::Error: Display,
{
  fn predict_upload(&self, upload: &Upload) -> Result<Prediction, PredictError> {
    let outcome = validate_upload(upload.filename.as_deref())
      .and_then(|_| self.predict_bytes(&upload.bytes));
    if let Err(e) = &outcome {
      warn!("请求 {:?} 失败: {}", upload.filename, e);
    }
    outcome
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn argmax_prefers_first_of_ties() {
    assert_eq!(argmax(&[0.1, 0.1, 0.5, 0.5, 0.1]), Some(2));
    assert_eq!(argmax(&[0.0, 0.0, 0.0, 1.0, 0.0]), Some(3));
    assert_eq!(argmax(&[0.2; 5]), Some(0));
  }

  #[test]
  fn argmax_skips_nan() {
    assert_eq!(argmax(&[f32::NAN, 0.1, 0.3]), Some(2));
    assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
    assert_eq!(argmax(&[]), None);
  }

  #[test]
  fn garbage_bytes_are_invalid_image() {
    assert_eq!(
      decode_image(b"definitely not an image"),
      Err(PredictError::InvalidImage)
    );
    assert_eq!(decode_image(&[]), Err(PredictError::InvalidImage));
  }
}
