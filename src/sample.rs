//! 样本 - 数据流的最小单元
//!
//! @yutiansut @quantaxis
//!
//! 一个样本就是 (时间戳, 数值)：
//! - 时间戳为毫秒级 Unix 时间
//! - 数值为 NaN 表示"尚不可计算"（预热期）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 时间戳（毫秒）
pub type Timestamp = i64;

/// 一条时间序列样本（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// 时间戳（毫秒）
    pub timestamp: Timestamp,
    /// 数值
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// 预热期占位样本
    pub fn nan(timestamp: Timestamp) -> Self {
        Self::new(timestamp, f64::NAN)
    }

    pub fn is_nan(&self) -> bool {
        self.value.is_nan()
    }

    /// 转换为 UTC 时间，超出 chrono 表示范围时返回 None
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// 按位比较（NaN 与 NaN 视为相等），用于确定性校验
    pub fn bit_eq(&self, other: &Sample) -> bool {
        self.timestamp == other.timestamp && self.value.to_bits() == other.value.to_bits()
    }
}

impl From<(Timestamp, f64)> for Sample {
    fn from((timestamp, value): (Timestamp, f64)) -> Self {
        Self::new(timestamp, value)
    }
}

/// 更新类型：新增一个元素，或修订最后一个元素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    /// 新 K 线开始（提交并前进）
    Append,
    /// 当前 K 线尚未完成，价格被修订（基于已提交状态重算）
    Amend,
}

impl UpdateKind {
    pub fn is_amendment(&self) -> bool {
        matches!(self, UpdateKind::Amend)
    }

    pub fn is_new(&self) -> bool {
        matches!(self, UpdateKind::Append)
    }
}
