//! 线性加权移动平均 / 双重加权移动平均
//!
//! @yutiansut @quantaxis
//!
//! 权重：最新值为 n，最旧值为 1。加权和 W 增量维护：
//! - 窗口未满：`W' = W + len·v`
//! - 窗口已满：`W' = W − S + n·v`（S 为推入前的窗口和，旧值权重整体减一）

use super::ring_buffer::CircularBuffer;
use super::Indicator;
use crate::sample::{Sample, UpdateKind};
use crate::state::{check_period, Versioned, Warmup};
use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// WMA
// ═══════════════════════════════════════════════════════════════════════════

/// 线性加权移动平均，O(1) 增量
#[derive(Debug, Clone)]
pub struct Wma {
    name: String,
    period: usize,
    buffer: CircularBuffer,
    weighted: Versioned<f64>,
    // 最近一次 Append 推入前的窗口状态，Amend 复用
    prior_sum: f64,
    prior_full: bool,
    warmup: Warmup,
}

impl Wma {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("WMA", period)?;
        let name = format!("WMA({})", period);
        Ok(Self {
            warmup: Warmup::new(name.clone(), period),
            name,
            period,
            buffer: CircularBuffer::new(period),
            weighted: Versioned::new(0.0),
            prior_sum: 0.0,
            prior_full: false,
        })
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.warmup.set_emit_nan(emit_nan);
        self
    }

    /// 未经门控的加权均值
    fn step(&mut self, value: f64, kind: UpdateKind) -> f64 {
        if kind.is_new() {
            self.prior_sum = self.buffer.sum();
            self.prior_full = self.buffer.is_full();
            self.buffer.push(value);
        } else {
            self.buffer.replace_last(value);
        }

        let len = self.buffer.len() as f64;
        let w = self.weighted.begin(kind);
        *w = if self.prior_full {
            *w - self.prior_sum + len * value
        } else {
            *w + len * value
        };
        *w / (len * (len + 1.0) / 2.0)
    }
}

impl Indicator for Wma {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> usize {
        self.period
    }

    fn warmup_period(&self) -> usize {
        self.warmup.threshold()
    }

    fn is_hot(&self) -> bool {
        self.warmup.is_hot()
    }

    fn consume(&mut self, sample: Sample, kind: UpdateKind) -> Result<Sample> {
        self.warmup.advance(kind)?;
        let wma = self.step(sample.value, kind);
        Ok(Sample::new(sample.timestamp, self.warmup.gate(wma)))
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.weighted.reset(0.0);
        self.prior_sum = 0.0;
        self.prior_full = false;
        self.warmup.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DWMA - WMA(WMA)
// ═══════════════════════════════════════════════════════════════════════════

/// 双重加权移动平均，预热阈值 = 2·period − 1
#[derive(Debug, Clone)]
pub struct Dwma {
    name: String,
    period: usize,
    inner: Wma,
    outer: Wma,
    warmup: Warmup,
}

impl Dwma {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("DWMA", period)?;
        let name = format!("DWMA({})", period);
        Ok(Self {
            warmup: Warmup::new(name.clone(), 2 * period - 1),
            name,
            period,
            inner: Wma::new(period)?,
            outer: Wma::new(period)?,
        })
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.warmup.set_emit_nan(emit_nan);
        self
    }
}

impl Indicator for Dwma {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> usize {
        self.period
    }

    fn warmup_period(&self) -> usize {
        self.warmup.threshold()
    }

    fn is_hot(&self) -> bool {
        self.warmup.is_hot()
    }

    fn consume(&mut self, sample: Sample, kind: UpdateKind) -> Result<Sample> {
        // 先校验基线，内外两级都不会出错
        self.warmup.advance(kind)?;
        let first = self.inner.step(sample.value, kind);
        let second = self.outer.step(first, kind);
        Ok(Sample::new(sample.timestamp, self.warmup.gate(second)))
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.outer.reset();
        self.warmup.reset();
    }
}
