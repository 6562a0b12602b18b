//! 偏差缩放自适应移动平均 (Deviation Scaled Moving Average)
//!
//! @yutiansut @quantaxis
//!
//! 计算步骤：
//! 1. `zeros = value − last_dsma` 得到近似零均值信号
//! 2. SuperSmoother 二阶滤波得到 `filt`
//! 3. 以 `filt²` 的滑动窗口求 RMS，`filt / rms` 即以标准差为单位的偏离
//! 4. `alpha = min(|filt / rms| · 5 / period, 1)`，`dsma = alpha·value + (1−alpha)·last_dsma`

use std::f64::consts::PI;

use super::ring_buffer::CircularBuffer;
use super::Indicator;
use crate::sample::{Sample, UpdateKind};
use crate::state::{check_period, Versioned, Warmup};
use crate::Result;

#[derive(Debug, Clone, Default)]
struct DsmaState {
    last: f64,
    filt1: f64,
    filt2: f64,
    zeros1: f64,
    init: bool,
}

/// SuperSmoother 滤波系数
#[derive(Debug, Clone, Copy)]
struct SuperSmoother {
    c1: f64,
    c2: f64,
    c3: f64,
}

impl SuperSmoother {
    fn new(period: usize) -> Self {
        let arg = 1.414 * PI / (0.5 * period as f64);
        let a1 = (-arg).exp();
        let b1 = 2.0 * a1 * arg.cos();
        let c2 = b1;
        let c3 = -a1 * a1;
        Self {
            c1: 1.0 - c2 - c3,
            c2,
            c3,
        }
    }
}

/// DSMA，预热阈值 = 2·period
#[derive(Debug, Clone)]
pub struct Dsma {
    name: String,
    period: usize,
    filter: SuperSmoother,
    squares: CircularBuffer,
    state: Versioned<DsmaState>,
    warmup: Warmup,
}

impl Dsma {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("DSMA", period)?;
        let name = format!("DSMA({})", period);
        Ok(Self {
            warmup: Warmup::new(name.clone(), 2 * period),
            name,
            period,
            filter: SuperSmoother::new(period),
            squares: CircularBuffer::new(period),
            state: Versioned::default(),
        })
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.warmup.set_emit_nan(emit_nan);
        self
    }
}

impl Indicator for Dsma {
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
        let value = sample.value;
        let f = self.filter;
        let s = self.state.begin(kind);

        if !s.init {
            s.last = value;
            s.init = true;
            return Ok(Sample::new(sample.timestamp, self.warmup.gate(value)));
        }

        let zeros = value - s.last;
        let filt = f.c1 * (zeros + s.zeros1) / 2.0 + f.c2 * s.filt1 + f.c3 * s.filt2;

        match kind {
            UpdateKind::Append => {
                self.squares.push(filt * filt);
            }
            UpdateKind::Amend => {
                self.squares.replace_last(filt * filt);
            }
        }

        let period = self.period as f64;
        let rms = (self.squares.sum() / period).max(0.0).sqrt();
        let scaled = if rms > 0.0 { filt / rms } else { 0.0 };
        let alpha = (scaled.abs() * 5.0 / period).min(1.0);
        let dsma = alpha * value + (1.0 - alpha) * s.last;

        s.zeros1 = zeros;
        s.filt2 = s.filt1;
        s.filt1 = filt;
        s.last = dsma;

        Ok(Sample::new(sample.timestamp, self.warmup.gate(dsma)))
    }

    fn reset(&mut self) {
        self.squares.clear();
        self.state.reset(DsmaState::default());
        self.warmup.reset();
    }
}
