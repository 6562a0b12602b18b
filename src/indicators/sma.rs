//! 简单移动平均 / 累积移动平均
//!
//! @yutiansut @quantaxis

use super::ring_buffer::CircularBuffer;
use super::Indicator;
use crate::sample::{Sample, UpdateKind};
use crate::state::{check_period, Warmup};
use crate::Result;

// ═══════════════════════════════════════════════════════════════════════════
// SMA - 简单移动平均
// ═══════════════════════════════════════════════════════════════════════════

/// 简单移动平均
///
/// 窗口未满时输出已有数据的均值；预热阈值 = period
#[derive(Debug, Clone)]
pub struct Sma {
    name: String,
    period: usize,
    buffer: CircularBuffer,
    warmup: Warmup,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("SMA", period)?;
        let name = format!("SMA({})", period);
        Ok(Self {
            warmup: Warmup::new(name.clone(), period),
            name,
            period,
            buffer: CircularBuffer::new(period),
        })
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.warmup.set_emit_nan(emit_nan);
        self
    }
}

impl Indicator for Sma {
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
        match kind {
            UpdateKind::Append => {
                self.buffer.push(sample.value);
            }
            UpdateKind::Amend => {
                self.buffer.replace_last(sample.value);
            }
        }
        Ok(Sample::new(
            sample.timestamp,
            self.warmup.gate(self.buffer.average()),
        ))
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.warmup.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CMA - 累积移动平均（全历史窗口）
// ═══════════════════════════════════════════════════════════════════════════

/// 累积移动平均：无界窗口，第一个输入即就绪
#[derive(Debug, Clone)]
pub struct Cma {
    buffer: CircularBuffer,
    warmup: Warmup,
}

impl Cma {
    pub fn new() -> Self {
        Self {
            buffer: CircularBuffer::unbounded(),
            warmup: Warmup::new("CMA", 1),
        }
    }
}

impl Default for Cma {
    fn default() -> Self {
        Self::new()
    }
}

impl Indicator for Cma {
    fn name(&self) -> &str {
        self.warmup.name()
    }

    fn period(&self) -> usize {
        0
    }

    fn warmup_period(&self) -> usize {
        self.warmup.threshold()
    }

    fn is_hot(&self) -> bool {
        self.warmup.is_hot()
    }

    fn consume(&mut self, sample: Sample, kind: UpdateKind) -> Result<Sample> {
        self.warmup.advance(kind)?;
        match kind {
            UpdateKind::Append => {
                self.buffer.push(sample.value);
            }
            UpdateKind::Amend => {
                self.buffer.replace_last(sample.value);
            }
        }
        Ok(Sample::new(sample.timestamp, self.buffer.average()))
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.warmup.reset();
    }
}
