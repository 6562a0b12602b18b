//! 三重指数移动平均
//!
//! @yutiansut @quantaxis
//!
//! ```text
//! e1 = EMA(value), e2 = EMA(e1), e3 = EMA(e2)
//! TEMA = 3·(e1 − e2) + e3
//! ```
//!
//! 三级递推共享一份 Versioned 状态，修订时三级同时回滚。

use super::ema::ema_alpha;
use super::ring_buffer::CircularBuffer;
use super::Indicator;
use crate::sample::{Sample, UpdateKind};
use crate::state::{check_period, Versioned, Warmup};
use crate::Result;

#[derive(Debug, Clone, Default)]
struct TemaState {
    e1: f64,
    e2: f64,
    e3: f64,
}

/// 三重指数移动平均，预热阈值 = 3·period
#[derive(Debug, Clone)]
pub struct Tema {
    name: String,
    period: usize,
    alpha: f64,
    seed: CircularBuffer,
    state: Versioned<TemaState>,
    warmup: Warmup,
}

impl Tema {
    pub fn new(period: usize) -> Result<Self> {
        let period = check_period("TEMA", period)?;
        let name = format!("TEMA({})", period);
        Ok(Self {
            warmup: Warmup::new(name.clone(), 3 * period),
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
}

impl Indicator for Tema {
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
        let k = self.alpha;
        let s = self.state.begin(kind);

        if index < self.period {
            match kind {
                UpdateKind::Append => {
                    self.seed.push(sample.value);
                }
                UpdateKind::Amend => {
                    self.seed.replace_last(sample.value);
                }
            }
            let sma = self.seed.average();
            s.e1 = sma;
            s.e2 = sma;
            s.e3 = sma;
        } else {
            s.e1 = sample.value * k + s.e1 * (1.0 - k);
            s.e2 = s.e1 * k + s.e2 * (1.0 - k);
            s.e3 = s.e2 * k + s.e3 * (1.0 - k);
        }

        let tema = 3.0 * (s.e1 - s.e2) + s.e3;
        Ok(Sample::new(sample.timestamp, self.warmup.gate(tema)))
    }

    fn reset(&mut self) {
        self.seed.clear();
        self.state.reset(TemaState::default());
        self.warmup.reset();
    }
}
