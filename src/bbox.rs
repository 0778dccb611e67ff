// 该文件是 Ekspresi （表情识别） 项目的一部分。
// src/bbox.rs - 人脸边框调整
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

use serde::Serialize;

/// 人脸框四周的默认扩展像素
pub const FACE_PADDING: u32 = 20;

/// 检测器给出的原始边框，可能越界，也可能带负坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl RawBox {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }
}

/// 调整后的裁剪区域，始终落在图像内部
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl BoundingBox {
  pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn right(&self) -> u64 {
    u64::from(self.x) + u64::from(self.width)
  }

  pub fn bottom(&self) -> u64 {
    u64::from(self.y) + u64::from(self.height)
  }

  /// 非空且完全位于 `width x height` 图像内
  pub fn fits_within(&self, width: u32, height: u32) -> bool {
    self.width > 0
      && self.height > 0
      && self.right() <= u64::from(width)
      && self.bottom() <= u64::from(height)
  }
}

/// 人脸定位结果：检测到则携带第一个边框，否则走居中兜底
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceRegion {
  Detected(RawBox),
  NotDetected,
}

impl From<Option<RawBox>> for FaceRegion {
  fn from(raw: Option<RawBox>) -> Self {
    match raw {
      Some(raw) => FaceRegion::Detected(raw),
      None => FaceRegion::NotDetected,
    }
  }
}

/// 将人脸区域调整为合法的裁剪框。
///
/// 检测到人脸时，先向四周扩展 `padding`，左上角截断到 0，
/// 再用截断后的原点限制宽高。靠近右侧或下侧边缘时，实际扩展量会小于 `padding`。
///
/// 未检测到人脸时，取以图像中心为中心、半边长为 `min(W, H) / 2` 的正方形。
///
/// 图像宽高需大于 0；结果至少为 1x1 像素。
pub fn adjust(
  region: FaceRegion,
  image_width: u32,
  image_height: u32,
  padding: u32,
) -> BoundingBox {
  let w = i64::from(image_width.max(1));
  let h = i64::from(image_height.max(1));

  let (x, y, box_w, box_h) = match region {
    FaceRegion::Detected(raw) => {
      let p = i64::from(padding);
      let x = (i64::from(raw.x) - p).max(0);
      let y = (i64::from(raw.y) - p).max(0);
      // 完全落在图像右侧或下方的边框，贴到最后一列/行
      let x = x.min(w - 1);
      let y = y.min(h - 1);
      let box_w = (i64::from(raw.width) + 2 * p).min(w - x);
      let box_h = (i64::from(raw.height) + 2 * p).min(h - y);
      (x, y, box_w, box_h)
    }
    FaceRegion::NotDetected => {
      let center_x = w / 2;
      let center_y = h / 2;
      let half = center_x.min(center_y);
      (center_x - half, center_y - half, 2 * half, 2 * half)
    }
  };

  // 所有分量已在 [0, u32::MAX] 范围内
  BoundingBox {
    x: x as u32,
    y: y as u32,
    width: box_w.max(1) as u32,
    height: box_h.max(1) as u32,
  }
}
