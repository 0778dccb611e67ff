// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU32, Ordering},
};

use chrono::{Datelike, Utc};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  bbox::BoundingBox,
  input::Upload,
  output::{Outcome, RecordEntry, Render},
  pipeline::decode_image,
};

const FACE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const FACE_LINE_WIDTH: u32 = 2;

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存每次请求的结果
///
/// `folder:///out` 只记录成功的识别，`?always` 时失败也记录；
/// `?annotate` 另存一张画出裁剪区域的 PNG。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  counter: AtomicU32,
  annotate: bool,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let annotate = uri.query_pairs().any(|(k, _)| k == "annotate");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(crate::url_path(uri)),
      counter: AtomicU32::new(0),
      annotate,
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn record_id(&self) -> u32 {
    self.counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  /// 当天目录下的文件名前缀（不含扩展名）
  fn record_stem(&self, upload: &Upload) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    let name = upload
      .filename
      .as_deref()
      .map(|name| {
        let stem = Path::new(name).file_stem().unwrap_or_default();
        // 避免 with_extension 截掉文件名中的点
        stem.to_string_lossy().replace('.', "_")
      })
      .filter(|name| !name.is_empty())
      .unwrap_or_else(|| "upload".to_string());

    Ok(directory.join(format!(
      "{}-{:04X}-{}",
      now.format("%H-%M-%S"),
      self.record_id(),
      name
    )))
  }
}

/// 在图像上画出裁剪区域
pub fn draw_face(image: &mut RgbImage, face: &BoundingBox) {
  for inset in 0..FACE_LINE_WIDTH {
    if face.width <= 2 * inset || face.height <= 2 * inset {
      break;
    }
    let rect = Rect::at((face.x + inset) as i32, (face.y + inset) as i32)
      .of_size(face.width - 2 * inset, face.height - 2 * inset);
    draw_hollow_rect_mut(image, rect, FACE_COLOR);
  }
}

impl Render<Upload, Outcome> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Upload, result: &Outcome) -> Result<(), Self::Error> {
    if result.is_err() && !self.always {
      return Ok(());
    }

    let stem = self.record_stem(frame)?;
    let entry = RecordEntry::new(frame, result);
    std::fs::write(stem.with_extension("json"), serde_json::to_vec(&entry)?)?;

    if let (true, Ok(prediction)) = (self.annotate, result) {
      // 成功的识别意味着字节可以解码
      if let Ok(mut image) = decode_image(&frame.bytes) {
        draw_face(&mut image, &prediction.face);
        image.save(stem.with_extension("png"))?;
      }
    }

    debug!("记录已保存: {}", stem.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{bbox::FaceRegion, pipeline::Prediction, response::PredictError};

  fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        files.extend(files_under(&path));
      } else {
        files.push(path);
      }
    }
    files.sort();
    files
  }

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 200, 200]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
  }

  fn smile(face: BoundingBox) -> Outcome {
    Ok(Prediction {
      label: "Senyum".to_string(),
      index: 3,
      scores: vec![0.0, 0.0, 0.0, 1.0, 0.0],
      face,
      region: FaceRegion::NotDetected,
    })
  }

  #[test]
  fn skips_failures_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let upload = Upload::new("bad.png", b"garbage".to_vec());

    output(dir.path(), "")
      .render_result(&upload, &Err(PredictError::InvalidImage))
      .unwrap();
    assert!(files_under(dir.path()).is_empty());

    output(dir.path(), "?always")
      .render_result(&upload, &Err(PredictError::InvalidImage))
      .unwrap();
    let files = files_under(dir.path());
    assert_eq!(files.len(), 1);
    assert!(files[0].to_string_lossy().ends_with("-0001-bad.json"));
  }

  #[test]
  fn annotates_successful_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let upload = Upload::new("me.png", png_bytes(64, 48));
    let face = BoundingBox::new(8, 4, 32, 32);

    output(dir.path(), "?annotate")
      .render_result(&upload, &smile(face))
      .unwrap();

    let files = files_under(dir.path());
    assert_eq!(files.len(), 2);
    let json = files.iter().find(|p| p.extension().unwrap() == "json").unwrap();
    let png = files.iter().find(|p| p.extension().unwrap() == "png").unwrap();

    let entry: serde_json::Value =
      serde_json::from_slice(&std::fs::read(json).unwrap()).unwrap();
    assert_eq!(entry["response"]["prediction"], "Senyum");
    assert_eq!(entry["face"]["width"], 32);

    let image = image::open(png).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (64, 48));
    assert_eq!(*image.get_pixel(8, 4), FACE_COLOR);
    assert_eq!(*image.get_pixel(20, 20), Rgb([200, 200, 200]));
  }

  #[test]
  fn draws_inside_the_box_only() {
    let mut image = RgbImage::new(10, 10);
    draw_face(&mut image, &BoundingBox::new(2, 2, 4, 4));
    assert_eq!(*image.get_pixel(2, 2), FACE_COLOR);
    assert_eq!(*image.get_pixel(5, 5), FACE_COLOR);
    assert_eq!(*image.get_pixel(6, 6), Rgb([0, 0, 0]));

    let mut tiny = RgbImage::new(1, 1);
    draw_face(&mut tiny, &BoundingBox::new(0, 0, 1, 1));
    assert_eq!(*tiny.get_pixel(0, 0), FACE_COLOR);
  }
}
