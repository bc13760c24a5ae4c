// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/input/upload.rs - 内存中的上传图像解码
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
use tracing::debug;

use crate::frame::RgbNhwcFrame;

#[derive(Error, Debug)]
pub enum UploadDecodeError {
  #[error("上传内容为空")]
  Empty,
  #[error("图像解码失败: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 按内容嗅探格式并解码成 RGB 帧，带透明通道或灰度的图像统一转换为 RGB
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbNhwcFrame, UploadDecodeError> {
  if bytes.is_empty() {
    return Err(UploadDecodeError::Empty);
  }

  let image = image::load_from_memory(bytes)?;
  debug!(
    "上传图像解码完成: {}x{} {:?}",
    image.width(),
    image.height(),
    image.color()
  );

  Ok(RgbNhwcFrame::from(image.to_rgb8()))
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{ImageFormat, Rgba, RgbaImage};

  use super::*;
  use crate::input::AsNhwcFrame;

  #[test]
  fn decodes_png_with_alpha_into_rgb() {
    let image = RgbaImage::from_pixel(4, 3, Rgba([200, 100, 50, 128]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();

    let frame = decode_image_bytes(buffer.get_ref()).unwrap();
    assert_eq!(frame.width(), 4);
    assert_eq!(frame.height(), 3);
    assert_eq!(&frame.as_nhwc()[..3], &[200, 100, 50]);
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    let result = decode_image_bytes(b"definitely not an image");
    assert!(matches!(result, Err(UploadDecodeError::ImageError(_))));
  }

  #[test]
  fn empty_upload_is_an_error() {
    assert!(matches!(
      decode_image_bytes(&[]),
      Err(UploadDecodeError::Empty)
    ));
  }
}
