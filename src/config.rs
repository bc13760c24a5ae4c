// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/config.rs - 命令行参数与日志初始化
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

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use url::Url;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "webm", "mov"];

/// 初始化日志，级别取自 `RUST_LOG`，默认 info
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .init();
}

/// HTTP 检测服务参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
  /// 监听地址
  #[arg(long, env = "PPE_BIND", default_value = "127.0.0.1:5000")]
  pub bind: SocketAddr,

  /// 模型位置，`onnx://` URL 或本地路径
  #[arg(
    long,
    env = "PPE_MODEL",
    value_name = "MODEL",
    default_value = "model_weights/best.onnx",
    value_parser = parse_model_location
  )]
  pub model: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, env = "PPE_CONFIDENCE", default_value = "0.3", value_parser = parse_threshold)]
  pub confidence: f32,

  /// 上传文件大小上限（MiB）
  #[arg(long, env = "PPE_MAX_UPLOAD_MB", default_value = "16")]
  pub max_upload_mb: usize,
}

impl ServerArgs {
  /// 上传上限换算为字节，溢出时取 `usize::MAX`
  pub fn max_upload_bytes(&self) -> usize {
    self.max_upload_mb.saturating_mul(1024 * 1024)
  }
}

/// 视频标注参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct VideoArgs {
  /// 模型位置，`onnx://` URL 或本地路径
  #[arg(
    long,
    env = "PPE_MODEL",
    value_name = "MODEL",
    default_value = "best.onnx",
    value_parser = parse_model_location
  )]
  pub model: Url,

  /// 输入来源: `gst://file/...`、`gst://camera/dev/video0`、视频文件路径或 V4L2 设备
  #[arg(
    long,
    env = "PPE_INPUT",
    value_name = "SOURCE",
    default_value = "Videos/ppe-3-1.mp4",
    value_parser = parse_video_source
  )]
  pub input: Url,

  /// 输出: `display://`、`gstvideo:///out.mp4`、`image:///out.png` 或文件路径
  #[arg(
    long,
    env = "PPE_OUTPUT",
    value_name = "OUTPUT",
    default_value = "display://",
    value_parser = parse_sink
  )]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, env = "PPE_CONFIDENCE", default_value = "0.25", value_parser = parse_threshold)]
  pub confidence: f32,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 标签字体（TTF/OTF）
  #[arg(long, env = "PPE_FONT", value_name = "FONT")]
  pub font: Option<PathBuf>,
}

/// 单张图像标注参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct OneShotArgs {
  #[arg(long, value_name = "MODEL", value_parser = parse_model_location)]
  pub model: Url,

  #[arg(long, value_name = "SOURCE", value_parser = parse_image_source)]
  pub input: Url,

  #[arg(long, value_name = "OUTPUT", value_parser = parse_sink)]
  pub output: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_parser = parse_threshold)]
  pub confidence: f32,

  /// 标签字体（TTF/OTF）
  #[arg(long, env = "PPE_FONT", value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn looks_like_url(value: &str) -> bool {
  value.contains("://")
}

/// 本地路径转为 `<prefix><绝对路径>` 形式的 URL，相对路径以当前目录为基准
fn path_to_url(value: &str, prefix: &str) -> Result<Url, String> {
  let path = PathBuf::from(value);
  let absolute = if path.is_absolute() {
    path
  } else {
    std::env::current_dir()
      .map_err(|e| format!("无法获取当前目录: {}", e))?
      .join(path)
  };
  let file_url =
    Url::from_file_path(&absolute).map_err(|_| format!("无效路径: {}", absolute.display()))?;
  Url::parse(&format!("{}{}", prefix, file_url.path())).map_err(|e| e.to_string())
}

fn has_extension(value: &str, extensions: &[&str]) -> bool {
  std::path::Path::new(value)
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

pub fn parse_model_location(value: &str) -> Result<Url, String> {
  if looks_like_url(value) {
    Url::parse(value).map_err(|e| e.to_string())
  } else {
    path_to_url(value, "onnx://")
  }
}

pub fn parse_video_source(value: &str) -> Result<Url, String> {
  if looks_like_url(value) {
    Url::parse(value).map_err(|e| e.to_string())
  } else if value.starts_with("/dev/video") {
    Url::parse(&format!("gst://camera{}", value)).map_err(|e| e.to_string())
  } else {
    path_to_url(value, "gst://file")
  }
}

pub fn parse_image_source(value: &str) -> Result<Url, String> {
  if looks_like_url(value) {
    Url::parse(value).map_err(|e| e.to_string())
  } else {
    path_to_url(value, "image://")
  }
}

/// 视频扩展名写成视频文件，其余路径按图像保存
pub fn parse_sink(value: &str) -> Result<Url, String> {
  if looks_like_url(value) {
    Url::parse(value).map_err(|e| e.to_string())
  } else if has_extension(value, VIDEO_EXTENSIONS) {
    path_to_url(value, "gstvideo://")
  } else {
    path_to_url(value, "image://")
  }
}

pub fn parse_threshold(value: &str) -> Result<f32, String> {
  let threshold: f32 = value.parse().map_err(|e| format!("{}", e))?;
  if (0.0..=1.0).contains(&threshold) {
    Ok(threshold)
  } else {
    Err(format!("阈值必须在 0.0 到 1.0 之间, 实际为 {}", threshold))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn urls_pass_through_unchanged() {
    let url = parse_model_location("onnx:///opt/best.onnx?threads=2").unwrap();
    assert_eq!(url.scheme(), "onnx");
    assert_eq!(url.path(), "/opt/best.onnx");
    assert_eq!(parse_sink("display://").unwrap().scheme(), "display");
  }

  #[test]
  fn relative_paths_are_resolved_against_current_dir() {
    let url = parse_model_location("model_weights/best.onnx").unwrap();
    let expected = std::env::current_dir()
      .unwrap()
      .join("model_weights/best.onnx");
    assert_eq!(url.scheme(), "onnx");
    assert_eq!(
      crate::input::decode_url_path(&url),
      expected.to_string_lossy()
    );
  }

  #[test]
  fn video_source_paths_and_devices() {
    let url = parse_video_source("/data/Videos/ppe 3.mp4").unwrap();
    assert_eq!(url.scheme(), "gst");
    assert_eq!(url.host_str(), Some("file"));
    assert_eq!(crate::input::decode_url_path(&url), "/data/Videos/ppe 3.mp4");

    let camera = parse_video_source("/dev/video0").unwrap();
    assert_eq!(camera.host_str(), Some("camera"));
    assert_eq!(camera.path(), "/dev/video0");
  }

  #[test]
  fn sink_paths_choose_by_extension() {
    assert_eq!(parse_sink("/tmp/out.mp4").unwrap().scheme(), "gstvideo");
    assert_eq!(parse_sink("/tmp/out.png").unwrap().scheme(), "image");
  }

  #[test]
  fn threshold_must_be_a_probability() {
    assert_eq!(parse_threshold("0.3"), Ok(0.3));
    assert!(parse_threshold("1.5").is_err());
    assert!(parse_threshold("abc").is_err());
  }

  #[test]
  fn server_defaults() {
    let args = ServerArgs::try_parse_from(["ppe-server"]).unwrap();
    assert_eq!(args.bind, "127.0.0.1:5000".parse().unwrap());
    assert_eq!(args.confidence, 0.3);
    assert_eq!(args.max_upload_mb, 16);
    assert_eq!(args.max_upload_bytes(), 16 * 1024 * 1024);
    assert!(args.model.path().ends_with("/model_weights/best.onnx"));
  }

  #[test]
  fn huge_upload_limit_saturates() {
    let value = usize::MAX.to_string();
    let args = ServerArgs::try_parse_from(["ppe-server", "--max-upload-mb", &value]).unwrap();
    assert_eq!(args.max_upload_bytes(), usize::MAX);
  }
}
