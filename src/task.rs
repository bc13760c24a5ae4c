// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/task.rs - 推理任务循环
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  model::{DetectResult, Model, WithLabel},
  output::{Render, palette::CategoryTally},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

fn log_detections<T: WithLabel>(frame_index: usize, result: &DetectResult<T>) {
  let tally = CategoryTally::of(result);
  let classes: Vec<String> = result.items.iter().map(|d| d.kind.to_label_str()).collect();
  info!(
    "第 {} 帧: {} 个目标, 违规 {} 合规 {} 其他 {}",
    frame_index,
    result.items.len(),
    tally.violations,
    tally.compliant,
    tally.neutral
  );
  debug!("第 {} 帧类别: {:?}", frame_index, classes);
}

/// 只处理输入的第一帧
pub struct OneShotTask;

impl<
  F,
  T: WithLabel,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectResult<T>, Error = ME>,
  O: Render<F, DetectResult<T>, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    log_detections(1, &result);
    output.render_result(&frame, &result)?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 逐帧推理、绘制、输出，直到输入结束、达到帧数上限或收到中断
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Arc<AtomicBool>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 外部设置后，循环在当前帧处理完后退出
  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  /// 注册 Ctrl-C 处理，每个进程只能调用一次
  pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
    let stop = self.stop.clone();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      stop.store(true, Ordering::SeqCst);
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
  }
}

impl<
  F,
  T: WithLabel,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectResult<T>, Error = ME>,
  O: Render<F, DetectResult<T>, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");

    let started = Instant::now();
    let mut frame_index = 0usize;
    let mut now = Instant::now();
    for frame in input {
      if self.stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      frame_index += 1;
      let result = model.infer(&frame)?;
      let elapsed_a = now.elapsed();
      log_detections(frame_index, &result);
      output.render_result(&frame, &result)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      debug!("推理耗时: {:.2?} / 含渲染 {:.2?}", elapsed_a, elapsed_b);

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    let total = started.elapsed();
    if frame_index > 0 {
      info!(
        "任务完成，共 {} 帧，平均 {:.1} fps",
        frame_index,
        frame_index as f64 / total.as_secs_f64().max(f64::EPSILON)
      );
    } else {
      warn!("输入没有产生任何帧");
    }
    Ok(())
  }
}
