//! 指数移动平均
//!
//! @yutiansut @quantaxis
//!
//! 前 period 个输入用已缓冲输入的简单均值作为种子，之后切换到递推：
//! `ema = value·k + prev·(1−k)`，`k = 2/(period+1)`

use super::ring_buffer::CircularBuffer;
use super::Indicator;
use crate::sample::{Sample, UpdateKind};
use crate::state::{check_period, Versioned, Warmup};
use crate::Result;

/// EMA 平滑系数
pub fn ema_alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

#[derive(Debug, Clone, Default)]
struct EmaState {
    ema: f64,
}

/// 指数移动平均 (SMA 种子)
#[derive(Debug, Clone)]
pub struct Ema {
    name: String,
    period: usize,
    alpha: f64,
    seed: CircularBuffer,
    state: Versioned<EmaState>,
    warmup: Warmup,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("EMA", period)?;
        let name = format!("EMA({})", period);
        Ok(Self {
            warmup: Warmup::new(name.clone(), period),
            name,
            period,
            alpha: ema_alpha(period),
            seed: CircularBuffer::new(period),
            state: Versioned::default(),
        })
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.warmup.set_emit_nan(emit_nan);
        self
    }

    /// 最近一次计算的 EMA 值（未经 NaN 门控）
    pub fn value(&self) -> f64 {
        self.state.tentative().ema
    }
}

impl Indicator for Ema {
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
        let index = self.warmup.advance(kind)?;
        let s = self.state.begin(kind);

        s.ema = if index < self.period {
            match kind {
                UpdateKind::Append => {
                    self.seed.push(sample.value);
                }
                UpdateKind::Amend => {
                    self.seed.replace_last(sample.value);
                }
            }
            self.seed.average()
        } else {
            sample.value * self.alpha + s.ema * (1.0 - self.alpha)
        };

        Ok(Sample::new(sample.timestamp, self.warmup.gate(s.ema)))
    }

    fn reset(&mut self) {
        self.seed.clear();
        self.state.reset(EmaState::default());
        self.warmup.reset();
    }
}
