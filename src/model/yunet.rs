// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/model/yunet.rs - YuNet 人脸检测模型
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

use std::cmp::Ordering;

use image::{RgbImage, imageops, imageops::FilterType};
use thiserror::Error;
use tracing::debug;
use tract_onnx::prelude::Tensor;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::RawBox,
  model::{
    DetectItem, DetectResult, Model,
    onnx::{self, OnnxError, Runnable},
  },
};

const YUNET_STRIDES: [usize; 3] = [8, 16, 32];
const YUNET_OUTPUTS_PER_STRIDE: usize = 4; // cls, obj, bbox, kps
const YUNET_FUSED_COLS: usize = 15; // bbox(4) + 关键点(10) + 分数(1)
const YUNET_LANDMARK_VALUES: usize = 10;
const YUNET_MAX_INPUT_SIDE: u32 = 4096;

#[derive(Error, Debug)]
pub enum YuNetError {
  #[error("ONNX 错误: {0}")]
  OnnxError(#[from] OnnxError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
}

/// 检测后处理参数
#[derive(Debug, Clone, PartialEq)]
pub struct YuNetConfig {
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub top_k: usize,
  /// 模型输入尺寸 (宽, 高)，需为 32 的倍数
  pub input_size: (u32, u32),
}

impl Default for YuNetConfig {
  fn default() -> Self {
    Self {
      score_threshold: 0.9,
      nms_threshold: 0.3,
      top_k: 5_000,
      input_size: (640, 640),
    }
  }
}

/// 原始候选框，坐标为模型输入空间
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
  x: f32,
  y: f32,
  width: f32,
  height: f32,
  score: f32,
}

impl Candidate {
  fn area(&self) -> f32 {
    self.width.max(0.0) * self.height.max(0.0)
  }

  fn iou(&self, other: &Self) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = (self.x + self.width).min(other.x + other.width);
    let y2 = (self.y + self.height).min(other.y + other.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if intersection <= 0.0 {
      return 0.0;
    }

    let union = self.area() + other.area() - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
  }
}

pub struct YuNet {
  runnable: Runnable,
  config: YuNetConfig,
}

pub struct YuNetBuilder {
  model_path: String,
  config: YuNetConfig,
}

impl FromUrlWithScheme for YuNetBuilder {
  const SCHEME: &'static str = "yunet";
}

impl FromUrl for YuNetBuilder {
  type Error = YuNetError;

  /// `yunet:///path/to/face_detection_yunet.onnx?score=0.9&nms=0.3&top_k=50&size=640`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YuNetError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = YuNetBuilder::new(crate::url_path(url));
    for (key, value) in url.query_pairs() {
      let invalid = || YuNetError::InvalidParameter(format!("{key}={value}"));
      builder = match key.as_ref() {
        "score" => builder.score_threshold(value.parse().map_err(|_| invalid())?),
        "nms" => builder.nms_threshold(value.parse().map_err(|_| invalid())?),
        "top_k" => builder.top_k(value.parse().map_err(|_| invalid())?),
        "size" => {
          let size = value.parse().map_err(|_| invalid())?;
          builder.input_size(size, size)
        }
        _ => return Err(invalid()),
      };
    }
    Ok(builder)
  }
}

impl YuNetBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      config: YuNetConfig::default(),
    }
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.config.score_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.config.nms_threshold = threshold;
    self
  }

  pub fn top_k(mut self, top_k: usize) -> Self {
    self.config.top_k = top_k;
    self
  }

  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.config.input_size = (width, height);
    self
  }

  pub fn config(&self) -> &YuNetConfig {
    &self.config
  }

  pub fn build(self) -> Result<YuNet, YuNetError> {
    let (width, height) = self.config.input_size;
    let valid = |side: u32| side > 0 && side % 32 == 0 && side <= YUNET_MAX_INPUT_SIDE;
    if !valid(width) || !valid(height) {
      return Err(YuNetError::InvalidParameter(format!(
        "输入尺寸 {width}x{height} 必须为 32 的正整数倍且不超过 {YUNET_MAX_INPUT_SIDE}"
      )));
    }

    let shape = [1, 3, height as usize, width as usize];
    let runnable = onnx::load_runnable(&self.model_path, Some(&shape))?;
    debug!("YuNet 检测参数: {:?}", self.config);

    Ok(YuNet {
      runnable,
      config: self.config,
    })
  }
}

impl YuNet {
  pub fn config(&self) -> &YuNetConfig {
    &self.config
  }
}

impl Model for YuNet {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = YuNetError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (orig_w, orig_h) = input.dimensions();
    let (input_w, input_h) = self.config.input_size;

    debug!("设置模型输入");
    let tensor = preprocess(input, input_w, input_h)?;

    debug!("执行模型推理");
    let outputs = onnx::run(&self.runnable, tensor)?;

    let candidates = match outputs.len() {
      1 => fused_candidates(&outputs[0])?,
      n if n == YUNET_STRIDES.len() * YUNET_OUTPUTS_PER_STRIDE => {
        stride_candidates(&outputs, input_w as usize, input_h as usize)?
      }
      other => {
        return Err(YuNetError::InvalidOutput(format!(
          "期望 1 或 {} 个输出, 实际为 {}",
          YUNET_STRIDES.len() * YUNET_OUTPUTS_PER_STRIDE,
          other
        )));
      }
    };

    let scale_x = orig_w as f32 / input_w as f32;
    let scale_y = orig_h as f32 / input_h as f32;
    let result = postprocess(candidates, scale_x, scale_y, &self.config);
    debug!("检测到 {} 张人脸", result.len());

    Ok(result)
  }
}

/// 缩放到模型输入尺寸，转为 `[1, 3, H, W]` 的 BGR 浮点张量（不做归一化）
fn preprocess(image: &RgbImage, width: u32, height: u32) -> Result<Tensor, YuNetError> {
  let resized = imageops::resize(image, width, height, FilterType::Triangle);
  let (w, h) = (width as usize, height as usize);
  let plane = w * h;
  let mut data = vec![0f32; plane * 3];

  for (x, y, pixel) in resized.enumerate_pixels() {
    let idx = y as usize * w + x as usize;
    data[idx] = f32::from(pixel[2]);
    data[plane + idx] = f32::from(pixel[1]);
    data[2 * plane + idx] = f32::from(pixel[0]);
  }

  Tensor::from_shape(&[1, 3, h, w], &data)
    .map_err(|e| YuNetError::InvalidOutput(format!("输入张量构建失败: {e}")))
}

fn f32_slice<'a>(tensor: &'a Tensor, name: &str) -> Result<&'a [f32], YuNetError> {
  tensor
    .as_slice::<f32>()
    .map_err(|e| YuNetError::InvalidOutput(format!("{name} 输出不是 f32: {e}")))
}

/// 已融合的 `[N, 15]` 或 `[1, N, 15]` 输出
fn fused_candidates(tensor: &Tensor) -> Result<Vec<Candidate>, YuNetError> {
  let rows = match tensor.shape() {
    [rows, YUNET_FUSED_COLS] => *rows,
    [1, rows, YUNET_FUSED_COLS] => *rows,
    other => {
      return Err(YuNetError::InvalidOutput(format!(
        "输出形状应为 [N, 15] 或 [1, N, 15], 实际为 {other:?}"
      )));
    }
  };

  let data = f32_slice(tensor, "fused")?;
  Ok(
    data
      .chunks_exact(YUNET_FUSED_COLS)
      .take(rows)
      .map(|row| Candidate {
        x: row[0],
        y: row[1],
        width: row[2],
        height: row[3],
        score: row[14],
      })
      .collect(),
  )
}

/// 按步长分组的 12 个输出：cls x3, obj x3, bbox x3, kps x3
fn stride_candidates(
  outputs: &[Tensor],
  input_w: usize,
  input_h: usize,
) -> Result<Vec<Candidate>, YuNetError> {
  let heads = YUNET_STRIDES.len();
  let mut candidates = Vec::new();

  for (head, &stride) in YUNET_STRIDES.iter().enumerate() {
    let cols = input_w / stride;
    let rows = input_h / stride;
    let cells = cols * rows;
    let stride_f = stride as f32;

    let cls = f32_slice(&outputs[head], "cls")?;
    let obj = f32_slice(&outputs[head + heads], "obj")?;
    let bbox = f32_slice(&outputs[head + heads * 2], "bbox")?;
    let kps = f32_slice(&outputs[head + heads * 3], "kps")?;

    if cls.len() != cells
      || obj.len() != cells
      || bbox.len() != cells * 4
      || kps.len() != cells * YUNET_LANDMARK_VALUES
    {
      return Err(YuNetError::InvalidOutput(format!(
        "步长 {stride} 输出长度不匹配: cls={}, obj={}, bbox={}, kps={}, 期望单元数 {cells}",
        cls.len(),
        obj.len(),
        bbox.len(),
        kps.len()
      )));
    }

    for row in 0..rows {
      for col in 0..cols {
        let idx = row * cols + col;
        let mut score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
        if !score.is_finite() {
          score = 0.0;
        }

        let offset = idx * 4;
        let cx = (col as f32 + bbox[offset]) * stride_f;
        let cy = (row as f32 + bbox[offset + 1]) * stride_f;
        let width = bbox[offset + 2].exp() * stride_f;
        let height = bbox[offset + 3].exp() * stride_f;

        candidates.push(Candidate {
          x: cx - width / 2.0,
          y: cy - height / 2.0,
          width,
          height,
          score,
        });
      }
    }
  }

  Ok(candidates)
}

/// 分数过滤、缩放回原图、按分数排序、截断并执行 NMS
fn postprocess(
  candidates: Vec<Candidate>,
  scale_x: f32,
  scale_y: f32,
  config: &YuNetConfig,
) -> DetectResult {
  let mut kept: Vec<Candidate> = candidates
    .into_iter()
    .filter(|c| c.score.is_finite() && c.score >= config.score_threshold)
    .map(|c| Candidate {
      x: c.x * scale_x,
      y: c.y * scale_y,
      width: c.width * scale_x,
      height: c.height * scale_y,
      score: c.score,
    })
    .filter(|c| c.width > 0.0 && c.height > 0.0)
    .collect();

  kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
  if config.top_k > 0 {
    kept.truncate(config.top_k);
  }

  let mut selected: Vec<Candidate> = Vec::with_capacity(kept.len());
  for candidate in kept {
    let suppressed = config.nms_threshold > 0.0
      && selected
        .iter()
        .any(|s| candidate.iou(s) > config.nms_threshold);
    if !suppressed {
      selected.push(candidate);
    }
  }

  selected
    .into_iter()
    .map(|c| DetectItem {
      score: c.score,
      bbox: RawBox::new(
        c.x.round() as i32,
        c.y.round() as i32,
        c.width.round() as i32,
        c.height.round() as i32,
      ),
    })
    .collect::<Vec<_>>()
    .into()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(x: f32, y: f32, width: f32, height: f32, score: f32) -> Candidate {
    Candidate {
      x,
      y,
      width,
      height,
      score,
    }
  }

  #[test]
  fn filters_scales_and_sorts() {
    let result = postprocess(
      vec![
        candidate(10.0, 20.0, 30.0, 40.0, 0.92),
        candidate(100.0, 100.0, 10.0, 10.0, 0.2),
        candidate(200.0, 50.0, 20.0, 20.0, 0.97),
      ],
      2.0,
      0.5,
      &YuNetConfig::default(),
    );

    assert_eq!(result.len(), 2);
    assert!((result.items[0].score - 0.97).abs() < f32::EPSILON);
    assert_eq!(result.items[0].bbox, RawBox::new(400, 25, 40, 10));
    assert_eq!(result.items[1].bbox, RawBox::new(20, 10, 60, 20));
  }

  #[test]
  fn suppresses_overlapping_boxes() {
    let result = postprocess(
      vec![
        candidate(0.0, 0.0, 10.0, 10.0, 0.95),
        candidate(1.0, 1.0, 10.0, 10.0, 0.99),
      ],
      1.0,
      1.0,
      &YuNetConfig::default(),
    );

    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].bbox, RawBox::new(1, 1, 10, 10));
  }

  #[test]
  fn reads_fused_output() {
    let mut row = [0f32; YUNET_FUSED_COLS];
    row[..4].copy_from_slice(&[5.0, 6.0, 7.0, 8.0]);
    row[14] = 0.95;
    let tensor = Tensor::from_shape(&[1, 1, YUNET_FUSED_COLS], &row).unwrap();

    let candidates = fused_candidates(&tensor).unwrap();
    assert_eq!(candidates, vec![candidate(5.0, 6.0, 7.0, 8.0, 0.95)]);

    let bad = Tensor::from_shape(&[2, 3], &[0f32; 6]).unwrap();
    assert!(fused_candidates(&bad).is_err());
  }

  #[test]
  fn decodes_stride_outputs() {
    // 32x32 输入: 步长 8 -> 4x4, 16 -> 2x2, 32 -> 1x1
    let (w, h) = (32usize, 32usize);
    let mut cls = Vec::new();
    let mut obj = Vec::new();
    let mut bbox = Vec::new();
    let mut kps = Vec::new();
    for &stride in YUNET_STRIDES.iter() {
      let cells = (w / stride) * (h / stride);
      cls.push(Tensor::from_shape(&[cells], &vec![1.0f32; cells]).unwrap());
      obj.push(Tensor::from_shape(&[cells], &vec![0.25f32; cells]).unwrap());
      bbox.push(Tensor::from_shape(&[cells, 4], &vec![0f32; cells * 4]).unwrap());
      kps.push(Tensor::from_shape(&[cells, 10], &vec![0f32; cells * 10]).unwrap());
    }
    let outputs: Vec<Tensor> = cls.into_iter().chain(obj).chain(bbox).chain(kps).collect();

    let candidates = stride_candidates(&outputs, w, h).unwrap();
    assert_eq!(candidates.len(), 16 + 4 + 1);
    // 步长 8 的 (0, 0) 单元: 中心 (0, 0), 边长 8
    assert_eq!(candidates[0], candidate(-4.0, -4.0, 8.0, 8.0, 0.5));
    // 步长 32 的唯一单元
    assert_eq!(candidates[20], candidate(-16.0, -16.0, 32.0, 32.0, 0.5));
  }

  #[test]
  fn preprocess_builds_bgr_planes() {
    let image = RgbImage::from_pixel(64, 64, image::Rgb([10, 20, 30]));
    let tensor = preprocess(&image, 32, 32).unwrap();
    assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
    let data = tensor.as_slice::<f32>().unwrap();
    assert_eq!(data[0], 30.0);
    assert_eq!(data[32 * 32], 20.0);
    assert_eq!(data[2 * 32 * 32], 10.0);
  }

  #[test]
  fn parses_url_parameters() {
    let url = Url::parse("yunet:///models/face.onnx?score=0.6&nms=0.4&top_k=10&size=320").unwrap();
    let builder = YuNetBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.config(),
      &YuNetConfig {
        score_threshold: 0.6,
        nms_threshold: 0.4,
        top_k: 10,
        input_size: (320, 320),
      }
    );
    assert_eq!(builder.model_path, "/models/face.onnx");
  }

  #[test]
  fn rejects_wrong_scheme_and_bad_parameters() {
    let wrong = Url::parse("expression:///models/face.onnx").unwrap();
    assert!(matches!(
      YuNetBuilder::from_url(&wrong),
      Err(YuNetError::SchemeMismatch(_))
    ));

    let bad = Url::parse("yunet:///models/face.onnx?score=high").unwrap();
    assert!(matches!(
      YuNetBuilder::from_url(&bad),
      Err(YuNetError::InvalidParameter(_))
    ));
  }

  #[test]
  fn build_checks_input_size_and_model_path() {
    let odd = YuNetBuilder::new("/nonexistent.onnx").input_size(100, 100).build();
    assert!(matches!(odd, Err(YuNetError::InvalidParameter(_))));

    let url = Url::parse("yunet:///nonexistent.onnx?size=65536").unwrap();
    let huge = YuNetBuilder::from_url(&url).unwrap().build();
    assert!(matches!(huge, Err(YuNetError::InvalidParameter(_))));

    let zero = YuNetBuilder::new("/nonexistent.onnx").input_size(0, 640).build();
    assert!(matches!(zero, Err(YuNetError::InvalidParameter(_))));

    let missing = YuNetBuilder::new("/nonexistent.onnx").build();
    assert!(matches!(
      missing,
      Err(YuNetError::OnnxError(OnnxError::NotFound(_)))
    ));
  }
}
