// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  frame::RgbNhwcFrame,
  model::{DetectResult, DetectionRecord, WithLabel},
  output::palette::Palette,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 22.0;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 没有字体时估算标签宽度
const LABEL_OFFSET: i32 = 5;
const LABEL_MIN_Y: i32 = 35; // 标签基线至少在第 35 行，避免贴顶被裁掉
const BOX_THICKNESS: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];

/// 没有指定字体时按顺序尝试的系统字体
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  palette: Palette,
}

impl Default for Draw {
  fn default() -> Self {
    Self::with_system_font()
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontVec::try_from_vec(data)?;
    debug!("加载字体: {}", path.as_ref().display());
    Ok(Self {
      font: Some(font),
      font_size: LABEL_FONT_SIZE,
      palette: Palette::default(),
    })
  }

  pub fn with_system_font() -> Self {
    for candidate in SYSTEM_FONT_CANDIDATES {
      if Path::new(candidate).exists()
        && let Ok(draw) = Self::with_font_file(candidate)
      {
        return draw;
      }
    }
    warn!("未找到可用字体，标签只绘制色块不绘制文字");
    Self::without_font()
  }

  pub fn without_font() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      palette: Palette::default(),
    }
  }

  /// 按指定字体或系统字体创建
  pub fn from_font_option(font: Option<&Path>) -> Result<Self, DrawError> {
    match font {
      Some(path) => Self::with_font_file(path),
      None => Ok(Self::with_system_font()),
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, record: &DetectionRecord) {
    let color = self.palette.color_of(&record.class);

    // 边框加粗为 2 像素，向内收缩；零宽或零高的框至少画出 1 像素的线
    for t in 0..BOX_THICKNESS {
      let w = record.w.saturating_sub(2 * t as u32);
      let h = record.h.saturating_sub(2 * t as u32);
      if t > 0 && (w == 0 || h == 0) {
        break;
      }
      let rect = Rect::at(record.x as i32 + t, record.y as i32 + t).of_size(w.max(1), h.max(1));
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!(
      "{} {:.2}",
      record.class,
      ceil_confidence(record.confidence)
    );
    self.draw_label(image, &label, record.x as i32, record.y as i32, color);
  }

  /// 标签以 (max(0, x), max(35, y)) 为文字左下角，四周留 5 像素色块
  fn draw_label(&self, image: &mut RgbImage, label: &str, x: i32, y: i32, color: Rgb<u8>) {
    let origin_x = x.max(0);
    let origin_y = y.max(LABEL_MIN_Y);
    let scale = PxScale::from(self.font_size);

    let (text_w, text_h) = match &self.font {
      Some(font) => text_size(scale, font, label),
      None => (
        (label.chars().count() as f32 * LABEL_CHAR_WIDTH) as u32,
        self.font_size as u32,
      ),
    };

    let rect = Rect::at(
      origin_x - LABEL_OFFSET,
      origin_y - text_h as i32 - LABEL_OFFSET,
    )
    .of_size(
      text_w + 2 * LABEL_OFFSET as u32,
      text_h + 2 * LABEL_OFFSET as u32,
    );
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb(LABEL_TEXT_COLOR),
        origin_x,
        origin_y - text_h as i32,
        scale,
        font,
        label,
      );
    }
  }

  pub fn draw_detections_on_image<T: WithLabel>(
    &self,
    image: &mut RgbImage,
    result: &DetectResult<T>,
  ) {
    let (width, height) = (image.width() as usize, image.height() as usize);
    for record in result.to_records(width, height) {
      self.draw_bbox_with_label(image, &record);
    }
  }

  pub fn draw_detection<T: WithLabel>(
    &self,
    frame: &RgbNhwcFrame,
    result: &DetectResult<T>,
  ) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}

/// 置信度向上取整到两位小数，0.861 显示为 0.87
pub fn ceil_confidence(confidence: f32) -> f32 {
  (confidence * 100.0).ceil() / 100.0
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, PpeLabel};

  fn result_with(kind: PpeLabel, bbox: [f32; 4]) -> DetectResult<PpeLabel> {
    DetectResult {
      items: vec![DetectItem {
        kind,
        score: 0.861,
        bbox,
      }]
      .into_boxed_slice(),
    }
  }

  #[test]
  fn confidence_is_rounded_up() {
    assert!((ceil_confidence(0.861) - 0.87).abs() < 1e-6);
    assert!((ceil_confidence(0.5) - 0.5).abs() < 1e-6);
  }

  #[test]
  fn violation_box_is_drawn_in_red() {
    let draw = Draw::without_font();
    let mut image = RgbImage::new(200, 200);
    let result = result_with(PpeLabel::NoHardhat, [0.25, 0.5, 0.75, 0.875]);
    draw.draw_detections_on_image(&mut image, &result);

    // 左边框两列、底边框（框为 (50, 100) 起 100x75）
    assert_eq!(*image.get_pixel(50, 150), Rgb([255, 0, 0]));
    assert_eq!(*image.get_pixel(51, 150), Rgb([255, 0, 0]));
    assert_eq!(*image.get_pixel(100, 174), Rgb([255, 0, 0]));
    assert_eq!(*image.get_pixel(100, 176), Rgb([0, 0, 0]));
    // 框内部保持原样
    assert_eq!(*image.get_pixel(100, 150), Rgb([0, 0, 0]));
    // 标签色块位于框的上方
    assert_eq!(*image.get_pixel(52, 95), Rgb([255, 0, 0]));
  }

  #[test]
  fn label_near_top_is_pushed_down() {
    let draw = Draw::without_font();
    let mut image = RgbImage::new(100, 100);
    let result = result_with(PpeLabel::Hardhat, [0.1, 0.0, 0.5, 0.5]);
    draw.draw_detections_on_image(&mut image, &result);

    // 基线为 35 行，色块覆盖到第 39 行
    assert_eq!(*image.get_pixel(20, 38), Rgb([0, 255, 0]));
    assert_eq!(*image.get_pixel(20, 45), Rgb([0, 0, 0]));
  }

  #[test]
  fn empty_box_still_gets_a_label() {
    let draw = Draw::without_font();
    let mut image = RgbImage::new(50, 50);
    let result = result_with(PpeLabel::Person, [0.5, 0.5, 0.5, 0.5]);
    draw.draw_detections_on_image(&mut image, &result);

    // 框退化为 (25, 25) 处的一个点，标签色块覆盖第 8 到 39 行
    assert_eq!(*image.get_pixel(25, 25), Rgb([0, 0, 255]));
    assert_eq!(*image.get_pixel(22, 20), Rgb([0, 0, 255]));
    assert_eq!(*image.get_pixel(10, 45), Rgb([0, 0, 0]));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::with_font_file("/definitely/missing/font.ttf"),
      Err(DrawError::IoError(_))
    ));
  }
}
