//! 几何布朗运动模拟行情
//!
//! @yutiansut @quantaxis
//!
//! 价格步进：`S' = S · exp((μ − σ²/2)·dt + σ·√dt·z)`，z 为标准正态。
//! 固定种子下输出完全确定，用于测试、基准和演示。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use super::bar::Bar;
use crate::sample::{Timestamp, UpdateKind};
use crate::{IndicatorError, Result};

/// 模拟参数（μ、σ 均按单根 K 线计）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_start_price")]
    pub start_price: f64,
    #[serde(default)]
    pub drift: f64,
    #[serde(default = "default_volatility")]
    pub volatility: f64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: i64,
    #[serde(default)]
    pub start_timestamp: Timestamp,
    /// next_bar 内部的步数
    #[serde(default = "default_substeps")]
    pub substeps: usize,
}

fn default_seed() -> u64 {
    42
}

fn default_start_price() -> f64 {
    100.0
}

fn default_volatility() -> f64 {
    0.01
}

fn default_interval_ms() -> i64 {
    60_000
}

fn default_substeps() -> usize {
    4
}

impl Default for GbmConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            start_price: default_start_price(),
            drift: 0.0,
            volatility: default_volatility(),
            interval_ms: default_interval_ms(),
            start_timestamp: 0,
            substeps: default_substeps(),
        }
    }
}

/// 几何布朗运动 K 线生成器
#[derive(Debug, Clone)]
pub struct GbmFeed {
    config: GbmConfig,
    rng: StdRng,
    /// 单根 K 线的对数收益扰动 N(0, σ)
    noise: Normal<f64>,
    price: f64,
    next_timestamp: Timestamp,
}

impl GbmFeed {
    pub fn new(config: GbmConfig) -> Result<Self> {
        if !(config.start_price > 0.0 && config.start_price.is_finite()) {
            return Err(IndicatorError::InvalidConfiguration(format!(
                "GBM: start_price must be positive, got {}",
                config.start_price
            )));
        }
        if config.interval_ms <= 0 {
            return Err(IndicatorError::InvalidConfiguration(format!(
                "GBM: interval_ms must be positive, got {}",
                config.interval_ms
            )));
        }
        let noise = Normal::new(0.0, config.volatility).map_err(|e| {
            IndicatorError::InvalidConfiguration(format!(
                "GBM: volatility {}: {}",
                config.volatility, e
            ))
        })?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            noise,
            price: config.start_price,
            next_timestamp: config.start_timestamp,
            config,
        })
    }

    pub fn with_seed(seed: u64) -> Result<Self> {
        Self::new(GbmConfig {
            seed,
            ..GbmConfig::default()
        })
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn config(&self) -> &GbmConfig {
        &self.config
    }

    /// 按 K 线的 `fraction` 推进价格
    fn step(&mut self, fraction: f64) -> f64 {
        let mu = self.config.drift;
        let sigma = self.config.volatility;
        let shock: f64 = self.rng.sample(self.noise);
        self.price *= ((mu - 0.5 * sigma * sigma) * fraction + fraction.sqrt() * shock).exp();
        self.price
    }

    fn trade_volume(&mut self) -> f64 {
        self.rng.gen_range(1..=100) as f64
    }

    fn open_bar(&mut self, fraction: f64) -> Bar {
        let price = self.step(fraction);
        let mut bar = Bar::new(self.next_timestamp, price);
        bar.volume = self.trade_volume();
        self.next_timestamp += self.config.interval_ms;
        bar
    }

    /// 生成下一根已完成的 K 线
    pub fn next_bar(&mut self) -> Bar {
        let steps = self.config.substeps.max(1);
        let fraction = 1.0 / steps as f64;
        let mut bar = self.open_bar(fraction);
        for _ in 1..steps {
            let price = self.step(fraction);
            let volume = self.trade_volume();
            bar.update(price, volume);
        }
        bar
    }

    /// 生成 `n` 根 K 线
    pub fn bars(&mut self, n: usize) -> Vec<Bar> {
        (0..n).map(|_| self.next_bar()).collect()
    }

    /// 盘中 tick 流：每根 K 线 `per_bar` 个 tick，首个为 Append，其余为 Amend
    pub fn ticks(&mut self, per_bar: usize) -> TickStream<'_> {
        TickStream {
            feed: self,
            per_bar: per_bar.max(1),
            current: None,
            tick: 0,
        }
    }
}

/// 无限 tick 流，配合 `take` 使用
pub struct TickStream<'a> {
    feed: &'a mut GbmFeed,
    per_bar: usize,
    current: Option<Bar>,
    tick: usize,
}

impl Iterator for TickStream<'_> {
    type Item = (Bar, UpdateKind);

    fn next(&mut self) -> Option<Self::Item> {
        let fraction = 1.0 / self.per_bar as f64;
        let item = match self.current {
            Some(mut bar) if self.tick < self.per_bar => {
                let price = self.feed.step(fraction);
                let volume = self.feed.trade_volume();
                bar.update(price, volume);
                (bar, UpdateKind::Amend)
            }
            _ => {
                self.tick = 0;
                (self.feed.open_bar(fraction), UpdateKind::Append)
            }
        };
        self.current = Some(item.0);
        self.tick += 1;
        Some(item)
    }
}
