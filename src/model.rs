// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;
use thiserror::Error;

use crate::frame::RgbNhwcFrame;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// HTTP 服务和视频循环共用的检测器对象
pub type PpeDetector =
  dyn Model<Input = RgbNhwcFrame, Output = DetectResult<PpeLabel>, Error = ModelError> + Send + Sync;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(String),
  #[error("张量形状错误: {0}")]
  ShapeError(#[from] ndarray::ShapeError),
  #[error("模型输出形状不符合预期: {0:?}")]
  UnexpectedOutput(Vec<usize>),
}

#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，相对源图像归一化
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> Default for DetectResult<T> {
  fn default() -> Self {
    Self {
      items: Box::new([]),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

/// PPE 数据集的类别表，顺序与训练时一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PpeLabel {
  FallDetected,
  Gloves,
  Goggles,
  Hardhat,
  Ladder,
  Mask,
  NoGloves,
  NoGoggles,
  NoHardhat,
  NoMask,
  NoSafetyVest,
  Person,
  SafetyCone,
  SafetyVest,
  Unknown(u32),
}

impl PpeLabel {
  pub const ALL: [PpeLabel; 14] = [
    PpeLabel::FallDetected,
    PpeLabel::Gloves,
    PpeLabel::Goggles,
    PpeLabel::Hardhat,
    PpeLabel::Ladder,
    PpeLabel::Mask,
    PpeLabel::NoGloves,
    PpeLabel::NoGoggles,
    PpeLabel::NoHardhat,
    PpeLabel::NoMask,
    PpeLabel::NoSafetyVest,
    PpeLabel::Person,
    PpeLabel::SafetyCone,
    PpeLabel::SafetyVest,
  ];

  pub fn name(&self) -> Option<&'static str> {
    let name = match self {
      PpeLabel::FallDetected => "Fall-Detected",
      PpeLabel::Gloves => "Gloves",
      PpeLabel::Goggles => "Goggles",
      PpeLabel::Hardhat => "Hardhat",
      PpeLabel::Ladder => "Ladder",
      PpeLabel::Mask => "Mask",
      PpeLabel::NoGloves => "NO-Gloves",
      PpeLabel::NoGoggles => "NO-Goggles",
      PpeLabel::NoHardhat => "NO-Hardhat",
      PpeLabel::NoMask => "NO-Mask",
      PpeLabel::NoSafetyVest => "NO-Safety Vest",
      PpeLabel::Person => "Person",
      PpeLabel::SafetyCone => "Safety Cone",
      PpeLabel::SafetyVest => "Safety Vest",
      PpeLabel::Unknown(_) => return None,
    };
    Some(name)
  }
}

impl WithLabel for PpeLabel {
  fn to_label_str(&self) -> String {
    match self.name() {
      Some(name) => name.to_string(),
      None => format!("class_{}", self.to_label_id()),
    }
  }

  fn to_label_id(&self) -> u32 {
    match self {
      PpeLabel::Unknown(id) => *id,
      known => PpeLabel::ALL
        .iter()
        .position(|label| label == known)
        .map(|idx| idx as u32)
        .unwrap_or(u32::MAX),
    }
  }

  fn from_label_id(id: u32) -> Self {
    PpeLabel::ALL
      .get(id as usize)
      .copied()
      .unwrap_or(PpeLabel::Unknown(id))
  }
}

/// 对外输出的检测记录，坐标为源图像像素
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
  pub class: String,
  pub confidence: f32,
  pub x: u32,
  pub y: u32,
  pub w: u32,
  pub h: u32,
}

impl DetectionRecord {
  pub fn from_item<T: WithLabel>(item: &DetectItem<T>, width: usize, height: usize) -> Self {
    let (w, h) = (width as f32, height as f32);
    let [x_min, y_min, x_max, y_max] = item.bbox;

    // 宽高为像素跨度的截断值；负数和 NaN 转换时饱和到 0
    Self {
      class: item.kind.to_label_str(),
      confidence: item.score.clamp(0.0, 1.0),
      x: (x_min * w) as u32,
      y: (y_min * h) as u32,
      w: ((x_max - x_min) * w).max(0.0) as u32,
      h: ((y_max - y_min) * h).max(0.0) as u32,
    }
  }
}

impl<T: WithLabel> DetectResult<T> {
  pub fn to_records(&self, width: usize, height: usize) -> Vec<DetectionRecord> {
    self
      .items
      .iter()
      .map(|item| DetectionRecord::from_item(item, width, height))
      .collect()
  }
}

mod postprocess;
mod preprocess;
mod yolo;
pub use self::postprocess::{decode_yolo_output, iou, nms};
pub use self::preprocess::{Letterbox, letterbox};
pub use self::yolo::{YoloOnnx, YoloOnnxBuilder};
