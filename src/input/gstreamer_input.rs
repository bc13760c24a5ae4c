// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 通过 GStreamer 管道读取视频文件或摄像头，逐帧输出 RGB 图像。
//!
//! ## URL 格式
//!
//! - `gst://file/<绝对路径>?rotate=90` 读取视频文件
//! - `gst://camera/dev/video0?width=1280&height=720&fps=30` 读取 V4L2 摄像头
//!
//! 管道在流结束（EOS）或读取失败时停止产出帧，调用方的循环随之结束。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame, input::decode_url_path};

const CAMERA_DEFAULT_WIDTH: u32 = 1280;
const CAMERA_DEFAULT_HEIGHT: u32 = 720;
const CAMERA_DEFAULT_FPS: u32 = 30;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// URL 的 host 既不是 file 也不是 camera
  #[error("Unknown GStreamer source kind: {0}")]
  UnknownSource(String),
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        width,
        height,
        fps,
      } => {
        let io_mode_str = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! videoconvert ! videoscale ! video/x-raw,width={},height={},framerate={}/1",
          camera, io_mode_str, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl Default for GStreamerInputPipelineBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl GStreamerInputPipelineBuilder {
  pub fn new() -> Self {
    Self { items: Vec::new() }
  }

  pub fn file(mut self, path: &str) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::FileSource(path.to_string()));
    self
  }

  pub fn camera(mut self, device: &str, width: u32, height: u32, fps: u32) -> Self {
    self.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: device.to_string(),
      io_mode: None,
      width,
      height,
      fps,
    });
    self
  }

  pub fn target_format(mut self, format: &str) -> Self {
    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: format.to_string(),
    });
    self
  }

  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      width: parse("width", CAMERA_DEFAULT_WIDTH),
      height: parse("height", CAMERA_DEFAULT_HEIGHT),
      fps: parse("fps", CAMERA_DEFAULT_FPS),
    }];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));

    GStreamerInputPipelineBuilder { items }
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));

    GStreamerInputPipelineBuilder { items }
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let method = match rotate? {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method })
  }

  /// 完整的管道描述，末尾固定为名为 sink 的 appsink
  pub fn pipeline_description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 文件源不丢帧，保证每一帧都被处理；摄像头只保留最新的帧
    let drop = !self
      .items
      .iter()
      .any(|item| matches!(item, GStreamerInputBuilderItem::FileSource(_)));
    format!(
      "{} ! appsink max-buffers=2 drop={} sync=false name=sink",
      basic_pipeline, drop
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.pipeline_description();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput { pipeline, appsink })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let path = decode_url_path(url);
    let mut builder = match url.host_str() {
      Some("camera") => Self::build_camera_pipeline(&path, &query),
      Some("file") => Self::build_file_pipeline(&path, &query),
      other => {
        return Err(GStreamerInputError::UnknownSource(
          other.unwrap_or_default().to_string(),
        ));
      }
    };

    builder.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });

    Ok(builder)
  }
}

/// GStreamer 视频输入
///
/// 管理 GStreamer 管道和 appsink，提供视频帧迭代功能。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  pub fn into_frames(self) -> GStreamerInputFrames {
    GStreamerInputFrames {
      inner: self,
      index: 0,
    }
  }

  fn pull_sample(&self) -> Option<gst::Sample> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(sample),
      Err(_) if self.appsink.is_eos() => {
        info!("视频流结束");
        None
      }
      Err(e) => {
        warn!("读取帧失败: {}", e);
        None
      }
    }
  }
}

/// 逐帧产出 RGB 帧，流结束或读取失败后返回 None
pub struct GStreamerInputFrames {
  inner: GStreamerInput,
  index: u64,
}

impl Iterator for GStreamerInputFrames {
  type Item = RgbNhwcFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.inner.pull_sample()?;
    match convert_sample_to_nhwc(sample) {
      Ok(frame) => {
        self.index += 1;
        debug!(
          "第 {} 帧: {}x{}",
          self.index,
          frame.width(),
          frame.height()
        );
        Some(frame)
      }
      Err(e) => {
        warn!("Failed to fetch sample: {}", e);
        None
      }
    }
  }
}

fn convert_sample_to_nhwc(sample: gst::Sample) -> Result<RgbNhwcFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  // 行宽可能带填充
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected_size = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut frame = RgbNhwcFrame::with_shape(height, width);
  let frame_slice = frame.as_mut();

  match video_info.format() {
    gst_video::VideoFormat::Rgb => {
      for h in 0..height {
        let src = &data[h * stride..h * stride + width * 3];
        frame_slice[h * width * 3..(h + 1) * width * 3].copy_from_slice(src);
      }
    }
    gst_video::VideoFormat::Bgr => {
      for h in 0..height {
        for w in 0..width {
          for c in 0..3 {
            let src_idx = h * stride + w * 3 + (2 - c);
            let dst_idx = (h * width + w) * 3 + c;
            frame_slice[dst_idx] = data[src_idx];
          }
        }
      }
    }
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  }

  Ok(frame)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_url_builds_decode_pipeline() {
    let url = Url::parse("gst://file/data/Videos/ppe-3-1.mp4").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.pipeline_description(),
      "filesrc location=\"/data/Videos/ppe-3-1.mp4\" ! decodebin ! \
       videoconvert ! video/x-raw,format=RGB ! appsink max-buffers=2 drop=false sync=false name=sink"
    );
  }

  #[test]
  fn camera_url_reads_query() {
    let url = Url::parse("gst://camera/dev/video0?width=640&height=480&fps=15&rotate=180").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.items[0],
      GStreamerInputBuilderItem::CameraSource {
        camera: "/dev/video0".to_string(),
        io_mode: None,
        width: 640,
        height: 480,
        fps: 15,
      }
    );
    assert_eq!(
      builder.items[1],
      GStreamerInputBuilderItem::VideoFlip { method: 2 }
    );
    assert!(builder.pipeline_description().contains("drop=true"));
  }

  #[test]
  fn unknown_host_is_rejected() {
    let url = Url::parse("gst://rtsp/stream").unwrap();
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&url),
      Err(GStreamerInputError::UnknownSource(host)) if host == "rtsp"
    ));
  }
}
