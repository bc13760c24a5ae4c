// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/bin/ppe_server.rs - HTTP 检测服务入口
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
use tracing::{info, warn};

use ppe_sentry::{
  config::{ServerArgs, init_tracing},
  server::{AppState, DetectionService, create_router},
};

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();

  let args = ServerArgs::parse();
  info!("模型文件路径: {}", args.model);
  info!("置信度阈值: {}", args.confidence);

  let model_url = args.model.clone();
  let confidence = args.confidence;
  let service =
    tokio::task::spawn_blocking(move || DetectionService::load(&model_url, confidence)).await?;
  if !service.model_loaded() {
    warn!("模型未加载，/api/detect 将返回错误");
  }

  let app = create_router(AppState::new(service), args.max_upload_bytes());

  let listener = tokio::net::TcpListener::bind(args.bind).await?;
  info!("HTTP 服务监听 {}", listener.local_addr()?);

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!("收到中断信号，停止服务...");
    })
    .await?;

  Ok(())
}
