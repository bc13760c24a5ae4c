// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/bin/ppe_video.rs - 视频流标注入口
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use ppe_sentry::{
  FromUrl,
  config::{VideoArgs, init_tracing},
  input::InputWrapper,
  model::YoloOnnxBuilder,
  output::{OutputWrapper, draw::Draw},
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  init_tracing();

  let args = VideoArgs::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let model = YoloOnnxBuilder::from_url(&args.model)?
    .confidence(args.confidence)
    .build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let draw = Draw::from_font_option(args.font.as_deref())?;
  let output = OutputWrapper::from_url_with_draw(&args.output, draw)?;

  let task = ContinuousTask::default().with_frame_number(args.frame_number);
  task.install_ctrlc_handler()?;
  task.run_task(input.into_frames(), model, output)?;

  Ok(())
}
