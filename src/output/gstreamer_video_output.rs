// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出
//!
//! 把标注后的帧编码保存为视频文件，容器由扩展名决定：
//!
//! - `.mp4` / 其他：H.264 + MP4
//! - `.mkv`：H.264 + Matroska
//! - `.avi`：H.264 + AVI
//! - `.webm`：VP8 + WebM
//!
//! ```no_run
//! use ppe_sentry::{FromUrl, output::GStreamerVideoOutput};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("gstvideo:///tmp/annotated.mp4?fps=25")?;
//! let output = GStreamerVideoOutput::from_url(&url)?;
//! # Ok(())
//! # }
//! ```

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  input::decode_url_path,
  model::{DetectResult, WithLabel},
  output::{
    Render,
    draw::Draw,
    gstreamer_appsrc::{AppSrcPipeline, GStreamerAppSrcError, fps_from_query},
  },
};

pub struct GStreamerVideoOutput {
  pipeline: AppSrcPipeline,
  draw: Draw,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gstvideo";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerAppSrcError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_draw(url, Draw::default())
  }
}

/// 按扩展名选择编码与封装
fn encoder_pipeline(file_path: &str) -> String {
  let location = format!("\"{}\"", file_path.replace('"', "\\\""));
  let lower = file_path.to_ascii_lowercase();
  if lower.ends_with(".mkv") {
    format!(
      "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! matroskamux ! filesink location={}",
      location
    )
  } else if lower.ends_with(".avi") {
    format!(
      "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc ! avimux ! filesink location={}",
      location
    )
  } else if lower.ends_with(".webm") {
    format!(
      "appsrc name=src ! videoconvert ! vp8enc ! webmmux ! filesink location={}",
      location
    )
  } else {
    format!(
      "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast tune=zerolatency ! h264parse ! mp4mux ! filesink location={}",
      location
    )
  }
}

impl GStreamerVideoOutput {
  pub fn from_url_with_draw(url: &Url, draw: Draw) -> Result<Self, GStreamerAppSrcError> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerAppSrcError::SchemeMismatch(url.scheme().to_string()));
    }

    let file_path = decode_url_path(url);
    if let Some(parent) = std::path::Path::new(&file_path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|e| {
        GStreamerAppSrcError::PipelineError(format!("无法创建输出目录: {}", e))
      })?;
    }

    let pipeline = AppSrcPipeline::launch(&encoder_pipeline(&file_path), fps_from_query(url))?;
    Ok(Self { pipeline, draw })
  }
}

impl<T: WithLabel> Render<RgbNhwcFrame, DetectResult<T>> for GStreamerVideoOutput {
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

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn container_follows_extension() {
    assert!(encoder_pipeline("/tmp/a.mp4").contains("mp4mux"));
    assert!(encoder_pipeline("/tmp/a.MKV").contains("matroskamux"));
    assert!(encoder_pipeline("/tmp/a.avi").contains("avimux"));
    assert!(encoder_pipeline("/tmp/a.webm").contains("vp8enc"));
    assert!(encoder_pipeline("/tmp/a.mov").contains("mp4mux"));
  }

  #[test]
  fn location_is_quoted() {
    let desc = encoder_pipeline("/tmp/site videos/out.mp4");
    assert!(desc.ends_with("location=\"/tmp/site videos/out.mp4\""));
  }
}
