// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/model/yolo.rs - ONNX Runtime 上的 YOLO 检测模型
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

use std::collections::HashMap;

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::{Value, ValueType},
};
use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  input::decode_url_path,
  model::{DetectResult, Model, ModelError, PpeLabel, decode_yolo_output, letterbox},
};

const YOLO_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLO_DEFAULT_THREADS: usize = 4;
const YOLO_DEFAULT_CONFIDENCE: f32 = 0.25;
const YOLO_DEFAULT_IOU: f32 = 0.7;
const YOLO_DEFAULT_MAX_DETECTIONS: usize = 300;

/// 加载后只读的 YOLO 模型句柄
///
/// ONNX Runtime 的 `Session::run` 需要 `&mut`，这里用互斥锁包起来，
/// 使 `Model::infer` 保持 `&self`，可以放进 `Arc` 在线程间共享。
pub struct YoloOnnx {
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  input_size: u32,
  confidence_threshold: f32,
  iou_threshold: f32,
  max_detections: usize,
}

pub struct YoloOnnxBuilder {
  model_path: String,
  threads: usize,
  input_size: u32,
  confidence_threshold: f32,
  iou_threshold: f32,
  max_detections: usize,
}

fn positive_query<T>(query: &HashMap<String, String>, key: &str) -> Result<Option<T>, ModelError>
where
  T: std::str::FromStr + PartialEq + Default,
{
  match query.get(key).and_then(|v| v.parse::<T>().ok()) {
    Some(value) if value == T::default() => Err(ModelError::ModelPathError(format!(
      "参数 {} 必须大于 0",
      key
    ))),
    other => Ok(other),
  }
}

impl FromUrlWithScheme for YoloOnnxBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for YoloOnnxBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::ModelPathError(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut builder = YoloOnnxBuilder::new(decode_url_path(url));
    if let Some(threads) = positive_query(&query, "threads")? {
      builder.threads = threads;
    }
    if let Some(size) = positive_query(&query, "size")? {
      builder.input_size = size;
    }
    if let Some(max_det) = positive_query(&query, "max_det")? {
      builder.max_detections = max_det;
    }
    if let Some(iou) = query.get("iou").and_then(|v| v.parse().ok()) {
      builder.iou_threshold = iou;
    }

    Ok(builder)
  }
}

impl YoloOnnxBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      threads: YOLO_DEFAULT_THREADS,
      input_size: YOLO_DEFAULT_INPUT_SIZE,
      confidence_threshold: YOLO_DEFAULT_CONFIDENCE,
      iou_threshold: YOLO_DEFAULT_IOU,
      max_detections: YOLO_DEFAULT_MAX_DETECTIONS,
    }
  }

  pub fn confidence(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn build(self) -> Result<YoloOnnx, ModelError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()
      .map_err(|e| ModelError::OrtError(format!("无法创建会话构建器: {}", e)))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| ModelError::OrtError(format!("无法设置优化级别: {}", e)))?
      .with_intra_threads(self.threads)
      .map_err(|e| ModelError::OrtError(format!("无法设置线程数: {}", e)))?
      .commit_from_memory(&model_data)
      .map_err(|e| ModelError::ModelInvalid(format!("{}", e)))?;

    if session.inputs.len() != 1 || session.outputs.is_empty() {
      return Err(ModelError::ModelInvalid(format!(
        "预期 1 个输入和至少 1 个输出, 实际为 {} 个输入 {} 个输出",
        session.inputs.len(),
        session.outputs.len()
      )));
    }

    let input_name = session.inputs[0].name.clone();
    let output_name = session.outputs[0].name.clone();

    // 静态输入形状 [1, 3, H, W] 时以模型为准，动态形状时使用配置的尺寸
    let input_size = match &session.inputs[0].input_type {
      ValueType::Tensor { shape, .. } => {
        let dims = shape.to_vec();
        debug!("模型输入 {}: {:?}", input_name, dims);
        match dims.as_slice() {
          [_, 3, h, w] if *h > 0 && h == w => *w as u32,
          _ => self.input_size,
        }
      }
      other => {
        return Err(ModelError::ModelInvalid(format!(
          "模型输入不是张量: {:?}",
          other
        )));
      }
    };

    info!(
      "模型加载完成: 输入 {} ({}x{}), 输出 {}",
      input_name, input_size, input_size, output_name
    );

    Ok(YoloOnnx {
      session: Mutex::new(session),
      input_name,
      output_name,
      input_size,
      confidence_threshold: self.confidence_threshold,
      iou_threshold: self.iou_threshold,
      max_detections: self.max_detections,
    })
  }
}

impl Model for YoloOnnx {
  type Input = RgbNhwcFrame;
  type Output = DetectResult<PpeLabel>;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("预处理输入 {}x{}", input.width(), input.height());
    let (tensor, letterbox) = letterbox(input, self.input_size)?;
    let input_value = Value::from_array(tensor)
      .map_err(|e| ModelError::OrtError(format!("无法创建输入张量: {}", e)))?;

    let mut session = self.session.lock();
    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => &input_value])
      .map_err(|e| ModelError::OrtError(format!("推理失败: {}", e)))?;

    let output = outputs[self.output_name.as_str()]
      .try_extract_array::<f32>()
      .map_err(|e| ModelError::OrtError(format!("无法读取输出张量: {}", e)))?;

    debug!("后处理模型输出 {:?}", output.shape());
    decode_yolo_output(
      &output,
      self.confidence_threshold,
      self.iou_threshold,
      self.max_detections,
      &letterbox,
    )
  }
}
