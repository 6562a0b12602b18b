//! K 线与逐字段序列
//!
//! @yutiansut @quantaxis

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sample::{Sample, Timestamp, UpdateKind};
use crate::series::{CheckPass, Series, SeriesRef};
use crate::{IndicatorError, Result};

/// K 线数据
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// K 线开始时间（毫秒）
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// 以首笔成交价开一根新 K 线
    pub fn new(timestamp: Timestamp, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// 用盘中新成交更新 K 线
    pub fn update(&mut self, price: f64, volume: f64) {
        self.close = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.volume += volume;
    }

    /// (high + low) / 2
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// (high + low + close) / 3
    pub fn hlc3(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// (open + high + low + close) / 4
    pub fn ohlc4(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }

    pub fn get(&self, field: BarField) -> f64 {
        match field {
            BarField::Open => self.open,
            BarField::High => self.high,
            BarField::Low => self.low,
            BarField::Close => self.close,
            BarField::Volume => self.volume,
            BarField::Hl2 => self.hl2(),
            BarField::Hlc3 => self.hlc3(),
            BarField::Ohlc4 => self.ohlc4(),
        }
    }

    pub fn sample(&self, field: BarField) -> Sample {
        Sample::new(self.timestamp, self.get(field))
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// K 线字段（含派生价格）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarField {
    Open,
    High,
    Low,
    Close,
    Volume,
    Hl2,
    Hlc3,
    Ohlc4,
}

impl BarField {
    pub const ALL: [BarField; 8] = [
        BarField::Open,
        BarField::High,
        BarField::Low,
        BarField::Close,
        BarField::Volume,
        BarField::Hl2,
        BarField::Hlc3,
        BarField::Ohlc4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BarField::Open => "open",
            BarField::High => "high",
            BarField::Low => "low",
            BarField::Close => "close",
            BarField::Volume => "volume",
            BarField::Hl2 => "hl2",
            BarField::Hlc3 => "hlc3",
            BarField::Ohlc4 => "ohlc4",
        }
    }
}

impl fmt::Display for BarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarField {
    type Err = IndicatorError;

    fn from_str(s: &str) -> Result<Self> {
        BarField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| IndicatorError::InvalidConfiguration(format!("Unknown bar field: {}", s)))
    }
}

/// K 线拆分出的逐字段序列
///
/// 每个字段一条独立序列，指标订阅自己需要的字段。
#[derive(Debug)]
pub struct BarSeries {
    fields: Vec<(BarField, SeriesRef)>,
}

impl BarSeries {
    pub fn new() -> Self {
        Self {
            fields: BarField::ALL
                .iter()
                .map(|&f| (f, Series::new(f.as_str())))
                .collect(),
        }
    }

    pub fn series(&self, field: BarField) -> &SeriesRef {
        // fields 按 BarField::ALL 顺序构建
        &self.fields[field as usize].1
    }

    pub fn open(&self) -> &SeriesRef {
        self.series(BarField::Open)
    }

    pub fn high(&self) -> &SeriesRef {
        self.series(BarField::High)
    }

    pub fn low(&self) -> &SeriesRef {
        self.series(BarField::Low)
    }

    pub fn close(&self) -> &SeriesRef {
        self.series(BarField::Close)
    }

    pub fn volume(&self) -> &SeriesRef {
        self.series(BarField::Volume)
    }

    pub fn hl2(&self) -> &SeriesRef {
        self.series(BarField::Hl2)
    }

    pub fn hlc3(&self) -> &SeriesRef {
        self.series(BarField::Hlc3)
    }

    pub fn ohlc4(&self) -> &SeriesRef {
        self.series(BarField::Ohlc4)
    }

    /// 新 K 线 (Append) 或修订当前 K 线 (Amend)，依次写入每个字段序列
    ///
    /// 所有字段先一起试算，任一字段被拒绝时不写入任何字段。
    pub fn push(&self, bar: &Bar, kind: UpdateKind) -> Result<()> {
        let pass = CheckPass::next();
        for (_, series) in &self.fields {
            series.check(bar.timestamp, kind, pass)?;
        }
        for (field, series) in &self.fields {
            series.commit(bar.sample(*field), kind)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.close().len()
    }

    pub fn is_empty(&self) -> bool {
        self.close().is_empty()
    }
}

impl Default for BarSeries {
    fn default() -> Self {
        Self::new()
    }
}
