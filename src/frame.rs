// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

use crate::input::AsNhwcFrame;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  DataLengthMismatch { expected: usize, actual: usize },
}

/// 尺寸可变的 RGB 帧，按 HWC 顺序存放像素。
///
/// 上传图片和视频帧的尺寸都不固定，因此形状保存在帧内而不是类型参数里。
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame {
  height: usize,
  width: usize,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let size = RGB_CHANNELS * height * width;
    Self {
      height,
      width,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  pub fn try_from_vec(height: usize, width: usize, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * height * width;
    if data.len() != expected {
      return Err(FrameError::DataLengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      height,
      width,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    let width = self.width;
    let data = &self.data;

    ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
      let idx = (y as usize * width + x as usize) * RGB_CHANNELS;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

impl From<RgbImage> for RgbNhwcFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    // RgbImage 的底层缓冲区本身就是 HWC 排列
    Self {
      height: height as usize,
      width: width as usize,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl AsMut<[u8]> for RgbNhwcFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}
