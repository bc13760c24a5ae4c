// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/output/gstreamer_appsrc.rs - 基于 appsrc 的 GStreamer 推帧管道
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

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

const APPSRC_NAME: &str = "src";
const EOS_TIMEOUT_SECONDS: u64 = 5;

#[derive(Error, Debug)]
pub enum GStreamerAppSrcError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("管道中找不到 appsrc 元素")]
  AppSrcNotFound,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("帧尺寸变化: 管道为 {expected:?}, 实际为 {actual:?}")]
  FrameSizeChanged {
    expected: (usize, usize),
    actual: (usize, usize),
  },
}

struct PushState {
  frame_size: Option<(usize, usize)>,
  frame_count: u64,
}

/// appsrc 开头的输出管道
///
/// caps 在收到第一帧时按帧尺寸设置，之后的帧必须保持同样尺寸。
pub(crate) struct AppSrcPipeline {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: u32,
  state: Mutex<PushState>,
}

impl AppSrcPipeline {
  /// `description` 必须包含一个 `appsrc name=src`
  pub(crate) fn launch(description: &str, fps: u32) -> Result<Self, GStreamerAppSrcError> {
    gst::init()?;

    info!("创建输出管道: {}", description);
    let pipeline = gst::parse::launch(description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerAppSrcError::PipelineError("无法创建管道".to_string()))?;

    let appsrc = pipeline
      .by_name(APPSRC_NAME)
      .and_then(|element| element.downcast::<gst_app::AppSrc>().ok())
      .ok_or(GStreamerAppSrcError::AppSrcNotFound)?;
    appsrc.set_format(gst::Format::Time);
    appsrc.set_is_live(false);

    pipeline.set_state(gst::State::Playing)?;

    Ok(Self {
      pipeline,
      appsrc,
      fps: fps.max(1),
      state: Mutex::new(PushState {
        frame_size: None,
        frame_count: 0,
      }),
    })
  }

  fn check_bus(&self) -> Result<(), GStreamerAppSrcError> {
    let Some(bus) = self.pipeline.bus() else {
      return Ok(());
    };
    if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error])
      && let gst::MessageView::Error(err) = msg.view()
    {
      return Err(GStreamerAppSrcError::PipelineError(format!(
        "{} ({:?})",
        err.error(),
        err.debug()
      )));
    }
    Ok(())
  }

  /// 推送一帧紧密排列的 RGB 数据
  pub(crate) fn push_rgb(
    &self,
    width: usize,
    height: usize,
    data: Vec<u8>,
  ) -> Result<(), GStreamerAppSrcError> {
    self.check_bus()?;

    let mut state = self.state.lock();
    match state.frame_size {
      None => {
        let caps = gst::Caps::builder("video/x-raw")
          .field("format", "RGB")
          .field("width", width as i32)
          .field("height", height as i32)
          .field("framerate", gst::Fraction::new(self.fps as i32, 1))
          .build();
        self.appsrc.set_caps(Some(&caps));
        info!("输出管道: {}x{} @ {} fps", width, height, self.fps);
        state.frame_size = Some((width, height));
      }
      Some(expected) if expected != (width, height) => {
        return Err(GStreamerAppSrcError::FrameSizeChanged {
          expected,
          actual: (width, height),
        });
      }
      Some(_) => {}
    }

    let frame_duration = 1_000_000_000 / self.fps as u64;
    let timestamp = state.frame_count * frame_duration;
    state.frame_count += 1;

    let mut buffer = gst::Buffer::from_mut_slice(data);
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or_else(|| GStreamerAppSrcError::PipelineError("缓冲区不可写".to_string()))?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(timestamp));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| GStreamerAppSrcError::PipelineError(format!("推送缓冲区失败: {:?}", e)))?;
    debug!("已推送第 {} 帧", state.frame_count);
    Ok(())
  }
}

impl Drop for AppSrcPipeline {
  fn drop(&mut self) {
    // 发送 EOS 并等待封装器写完文件尾
    if self.appsrc.end_of_stream().is_ok()
      && let Some(bus) = self.pipeline.bus()
    {
      bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECONDS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止输出管道: {}", e);
    }

    info!("输出管道关闭, 共写入 {} 帧", self.state.lock().frame_count);
  }
}

/// 解析 `fps` 查询参数，默认 30
pub(crate) fn fps_from_query(url: &url::Url) -> u32 {
  url
    .query_pairs()
    .find(|(k, _)| k == "fps")
    .and_then(|(_, v)| v.parse().ok())
    .unwrap_or(30)
}
