//! GBM 行情回放演示
//!
//! 1. 加载指标图配置（默认 config/indicators.toml）
//! 2. 用几何布朗运动 tick 流驱动（每根 K 线多次盘中修订）
//! 3. 快慢均线交叉时记录信号
//! 4. 每根 K 线收盘后输出一行 JSON
//!
//! 运行: cargo run --example gbm_replay -- --config config/indicators.toml --bars 200 --ticks 4 --seed 42

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Serialize;

use qaindicator::{Bar, EngineConfig, GbmConfig, GbmFeed, IndicatorGraph, UpdateKind};

/// 回放参数
#[derive(Debug, Clone)]
struct ReplayOptions {
    config_path: Option<String>,
    bars: usize,
    ticks_per_bar: usize,
    seed: u64,
    fast: String,
    slow: String,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            bars: 200,
            ticks_per_bar: 4,
            seed: 42,
            fast: "ema_fast".to_string(),
            slow: "ema_slow".to_string(),
        }
    }
}

impl ReplayOptions {
    fn from_args() -> anyhow::Result<Self> {
        let mut opts = Self::default();
        let args: Vec<String> = std::env::args().collect();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match (args[i].as_str(), value) {
                ("--config" | "-c", Some(v)) => opts.config_path = Some(v.clone()),
                ("--bars" | "-n", Some(v)) => opts.bars = v.parse().context("--bars")?,
                ("--ticks" | "-t", Some(v)) => opts.ticks_per_bar = v.parse().context("--ticks")?,
                ("--seed" | "-s", Some(v)) => opts.seed = v.parse().context("--seed")?,
                ("--fast", Some(v)) => opts.fast = v.clone(),
                ("--slow", Some(v)) => opts.slow = v.clone(),
                (other, _) => anyhow::bail!("unknown or incomplete argument: {}", other),
            }
            i += 2;
        }
        Ok(opts)
    }
}

/// 收盘 K 线输出记录
#[derive(Debug, Serialize)]
struct BarRecord<'a> {
    bar: &'a Bar,
    time: Option<String>,
    hot: bool,
    values: BTreeMap<&'a str, Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trend {
    Up,
    Down,
}

fn trend(graph: &IndicatorGraph, fast: &str, slow: &str) -> Option<Trend> {
    if !graph.is_hot(fast)? || !graph.is_hot(slow)? {
        return None;
    }
    let f = graph.last_value(fast)?;
    let s = graph.last_value(slow)?;
    if f > s {
        Some(Trend::Up)
    } else if f < s {
        Some(Trend::Down)
    } else {
        None
    }
}

fn emit_closed_bar(graph: &IndicatorGraph, bar: &Bar) -> anyhow::Result<()> {
    let values = graph
        .ids()
        .iter()
        .map(|id| (id.as_str(), graph.last_value(id).filter(|v| v.is_finite())))
        .collect();
    let record = BarRecord {
        bar,
        time: bar.datetime().map(|t| t.to_rfc3339()),
        hot: graph.all_hot(),
        values,
    };
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = ReplayOptions::from_args()?;
    let config = match &opts.config_path {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_default()
            .or_else(|_| EngineConfig::from_toml_str(include_str!("../config/indicators.toml")))?,
    };
    let graph = IndicatorGraph::from_config(&config)?;
    for id in [&opts.fast, &opts.slow] {
        if graph.series(id).is_none() {
            anyhow::bail!("crossover series {} is not in the graph", id);
        }
    }

    log::info!("Replaying {} bars x {} ticks (seed {})", opts.bars, opts.ticks_per_bar, opts.seed);

    let mut feed = GbmFeed::new(GbmConfig {
        seed: opts.seed,
        ..GbmConfig::default()
    })?;

    let mut last_trend: Option<Trend> = None;
    let mut pending: Option<Bar> = None;
    let mut signals = 0usize;

    for (bar, kind) in feed.ticks(opts.ticks_per_bar).take(opts.bars * opts.ticks_per_bar) {
        // 新 K 线开盘即意味着上一根已收盘
        if kind == UpdateKind::Append {
            if let Some(closed) = pending.take() {
                emit_closed_bar(&graph, &closed)?;
            }
        }
        graph.push_bar(&bar, kind)?;
        pending = Some(bar);

        let current = trend(&graph, &opts.fast, &opts.slow);
        if current.is_some() && current != last_trend {
            if last_trend.is_some() {
                signals += 1;
                log::info!(
                    "[{}] {:?} cross at {:.4} ({})",
                    bar.timestamp,
                    current,
                    bar.close,
                    if kind == UpdateKind::Amend { "intrabar" } else { "open" }
                );
            }
            last_trend = current;
        }
    }
    if let Some(closed) = pending {
        emit_closed_bar(&graph, &closed)?;
    }

    log::info!("Done: {} crossover signals", signals);
    Ok(())
}
