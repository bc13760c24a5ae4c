// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/output/gstreamer_display_output.rs - 窗口实时显示
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

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  model::{DetectResult, WithLabel},
  output::{
    Render,
    draw::Draw,
    gstreamer_appsrc::{AppSrcPipeline, GStreamerAppSrcError, fps_from_query},
  },
};

const DISPLAY_PIPELINE: &str = "appsrc name=src ! videoconvert ! autovideosink sync=false";

/// `display://` 把标注后的帧显示在窗口中，窗口关闭后推帧返回错误
pub struct GStreamerDisplayOutput {
  pipeline: AppSrcPipeline,
  draw: Draw,
}

impl FromUrlWithScheme for GStreamerDisplayOutput {
  const SCHEME: &'static str = "display";
}

impl FromUrl for GStreamerDisplayOutput {
  type Error = GStreamerAppSrcError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_draw(url, Draw::default())
  }
}

impl GStreamerDisplayOutput {
  pub fn from_url_with_draw(url: &Url, draw: Draw) -> Result<Self, GStreamerAppSrcError> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerAppSrcError::SchemeMismatch(url.scheme().to_string()));
    }
    let pipeline = AppSrcPipeline::launch(DISPLAY_PIPELINE, fps_from_query(url))?;
    Ok(Self { pipeline, draw })
  }
}

impl<T: WithLabel> Render<RgbNhwcFrame, DetectResult<T>> for GStreamerDisplayOutput {
  type Error = GStreamerAppSrcError;

  fn render_result(
    &self,
    frame: &RgbNhwcFrame,
    result: &DetectResult<T>,
  ) -> Result<(), Self::Error> {
    let image = self.draw.draw_detection(frame, result);
    let (width, height) = (image.width() as usize, image.height() as usize);
    self.pipeline.push_rgb(width, height, image.into_raw())
  }
}
