// 该文件是 PPE Sentry（安全装备哨兵）项目的一部分。
// src/output/palette.rs - 类别到安全分类到颜色的映射表
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

use image::Rgb;

use crate::model::{DetectResult, WithLabel};

/// 检测类别的安全分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyCategory {
  /// 缺少防护装备或发生跌倒
  Violation,
  /// 佩戴了对应的防护装备
  Compliant,
  /// 人、梯子、锥桶等中性目标
  Neutral,
}

/// 类别名称 -> 安全分类，未列出的类别视为中性
const CLASS_CATEGORIES: &[(&str, SafetyCategory)] = &[
  ("NO-Hardhat", SafetyCategory::Violation),
  ("NO-Safety Vest", SafetyCategory::Violation),
  ("NO-Mask", SafetyCategory::Violation),
  ("NO-Gloves", SafetyCategory::Violation),
  ("NO-Goggles", SafetyCategory::Violation),
  ("Fall-Detected", SafetyCategory::Violation),
  ("Hardhat", SafetyCategory::Compliant),
  ("Safety Vest", SafetyCategory::Compliant),
  ("Mask", SafetyCategory::Compliant),
  ("Gloves", SafetyCategory::Compliant),
  ("Goggles", SafetyCategory::Compliant),
];

impl SafetyCategory {
  pub fn of(class_name: &str) -> Self {
    CLASS_CATEGORIES
      .iter()
      .find(|(name, _)| *name == class_name)
      .map(|(_, category)| *category)
      .unwrap_or(SafetyCategory::Neutral)
  }
}

/// 安全分类 -> 颜色（RGB）
#[derive(Debug, Clone, Copy)]
pub struct Palette {
  pub violation: Rgb<u8>,
  pub compliant: Rgb<u8>,
  pub neutral: Rgb<u8>,
}

impl Default for Palette {
  fn default() -> Self {
    Self {
      violation: Rgb([255, 0, 0]),
      compliant: Rgb([0, 255, 0]),
      neutral: Rgb([0, 0, 255]),
    }
  }
}

impl Palette {
  pub fn color_of_category(&self, category: SafetyCategory) -> Rgb<u8> {
    match category {
      SafetyCategory::Violation => self.violation,
      SafetyCategory::Compliant => self.compliant,
      SafetyCategory::Neutral => self.neutral,
    }
  }

  pub fn color_of(&self, class_name: &str) -> Rgb<u8> {
    self.color_of_category(SafetyCategory::of(class_name))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryTally {
  pub violations: usize,
  pub compliant: usize,
  pub neutral: usize,
}

impl CategoryTally {
  pub fn of<T: WithLabel>(result: &DetectResult<T>) -> Self {
    result
      .items
      .iter()
      .fold(Self::default(), |mut tally, item| {
        match SafetyCategory::of(&item.kind.to_label_str()) {
          SafetyCategory::Violation => tally.violations += 1,
          SafetyCategory::Compliant => tally.compliant += 1,
          SafetyCategory::Neutral => tally.neutral += 1,
        }
        tally
      })
  }
}
