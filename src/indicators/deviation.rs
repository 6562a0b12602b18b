//! 窗口离散度 - 均方差 / 标准差
//!
//! @yutiansut @quantaxis
//!
//! 方差由环形缓冲区增量维护的 sum / sum_sq 得出，不重扫窗口。

use super::ring_buffer::CircularBuffer;
use super::Indicator;
use crate::sample::{Sample, UpdateKind};
use crate::state::{check_period, Warmup};
use crate::Result;

/// 窗口内相对均值的均方差（总体方差）
#[derive(Debug, Clone)]
pub struct Mse {
    name: String,
    period: usize,
    buffer: CircularBuffer,
    warmup: Warmup,
}

impl Mse {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("MSE", period)?;
        let name = format!("MSE({})", period);
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

    fn variance(&mut self, sample: Sample, kind: UpdateKind) -> Result<f64> {
        self.warmup.advance(kind)?;
        match kind {
            UpdateKind::Append => {
                self.buffer.push(sample.value);
            }
            UpdateKind::Amend => {
                self.buffer.replace_last(sample.value);
            }
        }
        Ok(self.buffer.variance())
    }
}

impl Indicator for Mse {
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
        let mse = self.variance(sample, kind)?;
        Ok(Sample::new(sample.timestamp, self.warmup.gate(mse)))
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.warmup.reset();
    }
}

/// 窗口总体标准差
#[derive(Debug, Clone)]
pub struct StdDev {
    name: String,
    inner: Mse,
}

impl StdDev {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("STDDEV", period)?;
        let name = format!("STDDEV({})", period);
        let mut inner = Mse::new(period)?;
        inner.name = name.clone();
        inner.warmup = Warmup::new(name.clone(), period);
        Ok(Self { name, inner })
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.inner.warmup.set_emit_nan(emit_nan);
        self
    }
}

impl Indicator for StdDev {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> usize {
        self.inner.period
    }

    fn warmup_period(&self) -> usize {
        self.inner.warmup_period()
    }

    fn is_hot(&self) -> bool {
        self.inner.is_hot()
    }

    fn consume(&mut self, sample: Sample, kind: UpdateKind) -> Result<Sample> {
        let sd = self.inner.variance(sample, kind)?.sqrt();
        Ok(Sample::new(sample.timestamp, self.inner.warmup.gate(sd)))
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}
