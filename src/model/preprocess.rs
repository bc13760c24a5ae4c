// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/model/preprocess.rs - letterbox 预处理
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

use image::{Rgb, RgbImage, imageops};
use ndarray::{Array, IxDyn};

use crate::{frame::RgbNhwcFrame, model::ModelError};

const LETTERBOX_FILL: u8 = 114;

/// 源图像到模型输入的等比缩放参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub source_width: f32,
  pub source_height: f32,
}

impl Letterbox {
  pub fn new(source_width: u32, source_height: u32, target_size: u32) -> Self {
    let max_dim = source_width.max(source_height).max(1);
    let scale = target_size as f32 / max_dim as f32;
    let new_width = ((source_width as f32 * scale) as u32).min(target_size);
    let new_height = ((source_height as f32 * scale) as u32).min(target_size);

    Self {
      scale,
      pad_x: ((target_size - new_width) / 2) as f32,
      pad_y: ((target_size - new_height) / 2) as f32,
      source_width: source_width as f32,
      source_height: source_height as f32,
    }
  }

  /// 把模型输入坐标系下的 [x1, y1, x2, y2] 映射回源图像，并归一化、裁剪到 [0, 1]
  pub fn to_source(&self, bbox: [f32; 4]) -> [f32; 4] {
    let x = |v: f32| ((v - self.pad_x) / self.scale / self.source_width.max(1.0)).clamp(0.0, 1.0);
    let y = |v: f32| ((v - self.pad_y) / self.scale / self.source_height.max(1.0)).clamp(0.0, 1.0);
    [x(bbox[0]), y(bbox[1]), x(bbox[2]), y(bbox[3])]
  }
}

/// 缩放并居中填充到 target_size 的正方形，输出 [1, 3, H, W]、取值 [0, 1] 的张量
pub fn letterbox(
  frame: &RgbNhwcFrame,
  target_size: u32,
) -> Result<(Array<f32, IxDyn>, Letterbox), ModelError> {
  if target_size == 0 {
    return Err(ModelError::ModelInvalid("模型输入尺寸不能为 0".to_string()));
  }

  let image = frame.to_rgb_image();
  let (width, height) = image.dimensions();
  let params = Letterbox::new(width, height, target_size);

  let new_width = ((width as f32 * params.scale) as u32).clamp(1, target_size);
  let new_height = ((height as f32 * params.scale) as u32).clamp(1, target_size);
  let resized = imageops::resize(
    &image,
    new_width,
    new_height,
    imageops::FilterType::Triangle,
  );

  let mut canvas = RgbImage::from_pixel(
    target_size,
    target_size,
    Rgb([LETTERBOX_FILL, LETTERBOX_FILL, LETTERBOX_FILL]),
  );
  imageops::replace(
    &mut canvas,
    &resized,
    params.pad_x as i64,
    params.pad_y as i64,
  );

  let size = target_size as usize;
  let plane = size * size;
  let mut input_data = vec![0f32; 3 * plane];
  for (x, y, pixel) in canvas.enumerate_pixels() {
    let idx = y as usize * size + x as usize;
    for c in 0..3 {
      input_data[c * plane + idx] = pixel[c] as f32 / 255.0;
    }
  }

  let input = Array::from_shape_vec(IxDyn(&[1, 3, size, size]), input_data)?;
  Ok((input, params))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wide_image_is_padded_vertically() {
    let params = Letterbox::new(1280, 720, 640);
    assert_eq!(params.scale, 0.5);
    assert_eq!(params.pad_x, 0.0);
    assert_eq!(params.pad_y, 140.0);
  }

  #[test]
  fn maps_model_box_back_to_source() {
    let params = Letterbox::new(1280, 720, 640);
    // 源图像中 (128, 72)-(640, 360) 的框在模型输入中为 (64, 176)-(320, 320)
    let bbox = params.to_source([64.0, 176.0, 320.0, 320.0]);
    let expected = [0.1, 0.1, 0.5, 0.5];
    for (got, want) in bbox.iter().zip(expected) {
      assert!((got - want).abs() < 1e-5, "{:?} != {:?}", bbox, expected);
    }
  }

  #[test]
  fn boxes_in_padding_are_clamped() {
    let params = Letterbox::new(1280, 720, 640);
    let bbox = params.to_source([-10.0, 0.0, 700.0, 639.0]);
    assert_eq!(bbox, [0.0, 0.0, 1.0, 1.0]);
  }

  #[test]
  fn tensor_has_nchw_shape_and_fill() {
    let mut frame = RgbNhwcFrame::with_shape(2, 4);
    frame.as_mut().fill(255);
    let (tensor, params) = letterbox(&frame, 8).unwrap();
    assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
    assert_eq!(params.pad_y, 2.0);
    // 顶部填充行为灰色，中间为白色
    assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
    assert!((tensor[[0, 2, 4, 4]] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn zero_target_size_is_an_error() {
    let frame = RgbNhwcFrame::with_shape(4, 4);
    assert!(matches!(
      letterbox(&frame, 0),
      Err(ModelError::ModelInvalid(_))
    ));
  }
}
