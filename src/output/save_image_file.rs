// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  input::decode_url_path,
  model::{DetectResult, WithLabel},
  output::{Render, draw::Draw},
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_draw(uri, Draw::default())
  }
}

impl SaveImageFileOutput {
  pub fn from_url_with_draw(uri: &Url, draw: Draw) -> Result<Self, SaveImageFileError> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(decode_url_path(uri)),
      draw,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl<T: WithLabel> Render<RgbNhwcFrame, DetectResult<T>> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &RgbNhwcFrame,
    result: &DetectResult<T>,
  ) -> Result<(), Self::Error> {
    let image = self.draw.draw_detection(frame, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, PpeLabel};

  #[test]
  fn saves_annotated_image_and_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/out.png");
    let url = Url::from_file_path(&target).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "image", 1)).unwrap();
    let output = SaveImageFileOutput::from_url_with_draw(&url, Draw::without_font()).unwrap();
    assert_eq!(output.path(), target.as_path());

    let frame = RgbNhwcFrame::with_shape(60, 80);
    let result = DetectResult {
      items: vec![DetectItem {
        kind: PpeLabel::NoMask,
        score: 0.9,
        bbox: [0.25, 0.5, 0.75, 1.0],
      }]
      .into_boxed_slice(),
    };
    output.render_result(&frame, &result).unwrap();

    let saved = image::open(&target).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (80, 60));
    assert_eq!(*saved.get_pixel(20, 45), image::Rgb([255, 0, 0]));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("gstvideo:///tmp/out.mp4").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url_with_draw(&url, Draw::without_font()),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
