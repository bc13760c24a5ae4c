// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// tests/api_tests.rs - HTTP 接口测试
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
  io::Cursor,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use image::{ImageFormat, Rgb, RgbImage};
use ppe_sentry::{
  frame::RgbNhwcFrame,
  model::{DetectItem, DetectResult, Model, ModelError, PpeLabel},
  server::{AppState, DetectionService, create_router},
};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "ppe-sentry-test-boundary";
const MAX_UPLOAD: usize = 16 * 1024 * 1024;

/// 返回固定检测结果并记录调用次数
#[derive(Default)]
struct FakeDetector {
  calls: AtomicUsize,
}

impl Model for FakeDetector {
  type Input = RgbNhwcFrame;
  type Output = DetectResult<PpeLabel>;
  type Error = ModelError;

  fn infer(&self, _input: &RgbNhwcFrame) -> Result<Self::Output, Self::Error> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(DetectResult {
      items: vec![
        DetectItem {
          kind: PpeLabel::NoHardhat,
          score: 0.91,
          bbox: [0.1, 0.125, 0.5, 0.625],
        },
        DetectItem {
          kind: PpeLabel::Person,
          score: 0.12,
          bbox: [0.0, 0.0, 1.0, 1.0],
        },
        DetectItem {
          kind: PpeLabel::SafetyVest,
          score: 1.0,
          bbox: [0.7, 0.7, 0.7, 0.9],
        },
      ]
      .into_boxed_slice(),
    })
  }
}

fn loaded_router() -> (Router, Arc<FakeDetector>) {
  let detector = Arc::new(FakeDetector::default());
  let service = DetectionService::with_detector(detector.clone(), 0.3);
  (create_router(AppState::new(service), MAX_UPLOAD), detector)
}

fn unloaded_router() -> Router {
  let service = DetectionService::unloaded("weights missing", 0.3);
  create_router(AppState::new(service), MAX_UPLOAD)
}

fn png_bytes() -> Vec<u8> {
  let image = RgbImage::from_pixel(64, 48, Rgb([30, 120, 200]));
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Png).unwrap();
  buffer.into_inner()
}

fn multipart_request(field: &str, content: &[u8]) -> Request<Body> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
  body.extend_from_slice(
    format!(
      "Content-Disposition: form-data; name=\"{}\"; filename=\"upload.png\"\r\n",
      field
    )
    .as_bytes(),
  );
  body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

  Request::builder()
    .method("POST")
    .uri("/api/detect")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={}", BOUNDARY),
    )
    .body(Body::from(body))
    .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
  let response = app.oneshot(request).await.unwrap();
  let status = response.status();
  let body = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  (status, serde_json::from_slice(&body).unwrap())
}

fn health_request() -> Request<Body> {
  Request::builder()
    .uri("/api/health")
    .body(Body::empty())
    .unwrap()
}

#[tokio::test]
async fn health_reports_loaded_model() {
  let (app, _) = loaded_router();
  let (status, json) = send(app, health_request()).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(json["status"], "healthy");
  assert_eq!(json["model_loaded"], true);
}

#[tokio::test]
async fn health_reports_missing_model() {
  let (status, json) = send(unloaded_router(), health_request()).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(json["status"], "healthy");
  assert_eq!(json["model_loaded"], false);
}

#[tokio::test]
async fn detect_without_model_fails() {
  let (status, json) = send(unloaded_router(), multipart_request("file", &png_bytes())).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(json["success"], false);
  assert_eq!(json["error"], "Model not loaded");
}

#[tokio::test]
async fn detect_returns_pixel_records_above_threshold() {
  let (app, detector) = loaded_router();
  let (status, json) = send(app, multipart_request("file", &png_bytes())).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(json["success"], true);
  assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

  let detections = json["detections"].as_array().unwrap();
  assert_eq!(detections.len(), 2);
  for detection in detections {
    let confidence = detection["confidence"].as_f64().unwrap();
    assert!((0.3..=1.0).contains(&confidence));
    assert!(detection["w"].as_u64().is_some());
    assert!(detection["h"].as_u64().is_some());
  }

  let first = &detections[0];
  assert_eq!(first["class"], "NO-Hardhat");
  // 64x48: x 6.4px，宽 25.6px
  assert_eq!(first["x"], 6);
  assert_eq!(first["y"], 6);
  assert_eq!(first["w"], 25);
  assert_eq!(first["h"], 24);
  assert_eq!(detections[1]["class"], "Safety Vest");
  assert_eq!(detections[1]["w"], 0);
}

#[tokio::test]
async fn malformed_upload_fails_without_inference() {
  let (app, detector) = loaded_router();
  let (status, json) = send(app, multipart_request("file", b"definitely not an image")).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(json["success"], false);
  assert!(json["error"].as_str().is_some());
  assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_file_field_fails() {
  let (app, detector) = loaded_router();
  let (status, json) = send(app, multipart_request("image", &png_bytes())).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(json["success"], false);
  assert_eq!(json["error"], "No file uploaded");
  assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_multipart_body_uses_failure_shape() {
  let (app, _) = loaded_router();
  let request = Request::builder()
    .method("POST")
    .uri("/api/detect")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{}"))
    .unwrap();
  let (status, json) = send(app, request).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(json["success"], false);
}
