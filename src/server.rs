// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/server.rs - HTTP 检测服务
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

//! # HTTP 检测服务
//!
//! - `GET /api/health` 返回 `{"status": "healthy", "model_loaded": bool}`
//! - `POST /api/detect` 接收 multipart 字段 `file`，返回
//!   `{"success": true, "detections": [...]}`，任何失败都返回 500 和
//!   `{"success": false, "error": "..."}`

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::Serialize;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  input::{UploadDecodeError, decode_image_bytes},
  model::{DetectionRecord, Model, ModelError, PpeDetector, YoloOnnxBuilder},
};

const UPLOAD_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("Model not loaded")]
  ModelNotLoaded,
  #[error("No file uploaded")]
  MissingFile,
  #[error("Invalid multipart request: {0}")]
  Multipart(String),
  #[error("Failed to decode image: {0}")]
  Decode(#[from] UploadDecodeError),
  #[error("Inference failed: {0}")]
  Inference(#[from] ModelError),
  #[error("Inference task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
  pub status: &'static str,
  pub model_loaded: bool,
}

#[derive(Serialize, Debug)]
pub struct DetectResponse {
  pub success: bool,
  pub detections: Vec<DetectionRecord>,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
  pub success: bool,
  pub error: String,
}

impl IntoResponse for DetectError {
  fn into_response(self) -> Response {
    warn!("检测请求失败: {}", self);
    let body = ErrorResponse {
      success: false,
      error: self.to_string(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
  }
}

/// 启动时构造一次，之后只读
pub struct DetectionService {
  detector: Option<Arc<PpeDetector>>,
  load_error: Option<String>,
  confidence_threshold: f32,
}

impl DetectionService {
  /// 加载模型；失败时返回未加载状态的服务而不是错误
  pub fn load(model_url: &Url, confidence_threshold: f32) -> Self {
    let detector = YoloOnnxBuilder::from_url(model_url)
      .and_then(|builder| builder.confidence(confidence_threshold).build());
    match detector {
      Ok(model) => {
        info!("模型加载成功: {}", model_url);
        Self::with_detector(Arc::new(model), confidence_threshold)
      }
      Err(e) => {
        error!("模型加载失败: {}, 服务以未加载状态运行", e);
        Self::unloaded(e.to_string(), confidence_threshold)
      }
    }
  }

  pub fn with_detector(detector: Arc<PpeDetector>, confidence_threshold: f32) -> Self {
    Self {
      detector: Some(detector),
      load_error: None,
      confidence_threshold,
    }
  }

  pub fn unloaded(reason: impl Into<String>, confidence_threshold: f32) -> Self {
    Self {
      detector: None,
      load_error: Some(reason.into()),
      confidence_threshold,
    }
  }

  pub fn model_loaded(&self) -> bool {
    self.detector.is_some()
  }

  pub fn load_error(&self) -> Option<&str> {
    self.load_error.as_deref()
  }

  /// 解码上传的图像并推理，阻塞调用
  pub fn detect_bytes(&self, bytes: &[u8]) -> Result<Vec<DetectionRecord>, DetectError> {
    let detector = self.detector.as_ref().ok_or(DetectError::ModelNotLoaded)?;
    let frame = decode_image_bytes(bytes)?;
    debug!("上传图像 {}x{}", frame.width(), frame.height());

    let result = detector.infer(&frame)?;
    let records: Vec<DetectionRecord> = result
      .to_records(frame.width(), frame.height())
      .into_iter()
      .filter(|record| record.confidence >= self.confidence_threshold)
      .collect();
    info!("检测到 {} 个目标", records.len());
    Ok(records)
  }
}

#[derive(Clone)]
pub struct AppState {
  pub service: Arc<DetectionService>,
}

impl AppState {
  pub fn new(service: DetectionService) -> Self {
    Self {
      service: Arc::new(service),
    }
  }
}

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
  Router::new()
    .route("/api/health", get(health_handler))
    .route("/api/detect", post(detect_handler))
    .layer(DefaultBodyLimit::max(max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
  Json(HealthResponse {
    status: "healthy",
    model_loaded: state.service.model_loaded(),
  })
}

async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, DetectError> {
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| DetectError::Multipart(e.to_string()))?
  {
    if field.name() == Some(UPLOAD_FIELD) {
      let bytes = field
        .bytes()
        .await
        .map_err(|e| DetectError::Multipart(e.to_string()))?;
      return Ok(bytes.to_vec());
    }
  }
  Err(DetectError::MissingFile)
}

async fn detect_handler(
  State(state): State<AppState>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, DetectError> {
  if !state.service.model_loaded() {
    return Err(DetectError::ModelNotLoaded);
  }

  let mut multipart = multipart.map_err(|e| DetectError::Multipart(e.to_string()))?;
  let bytes = read_upload(&mut multipart).await?;
  debug!("收到上传文件 {} 字节", bytes.len());

  let service = state.service.clone();
  let detections = tokio::task::spawn_blocking(move || service.detect_bytes(&bytes)).await??;

  Ok(Json(DetectResponse {
    success: true,
    detections,
  }))
}
