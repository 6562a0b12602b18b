//! # QAINDICATOR-RS
//!
//! 增量技术指标计算引擎 - 面向实时、可修订的行情序列
//!
//! ## 核心能力
//!
//! - **样本 / 序列**: 时间戳 + 数值，Append（新 K 线）与 Amend（修订当前 K 线）
//! - **环形缓冲区**: O(1) 滑动窗口 sum / average / variance / min / max
//! - **指标契约**: 已提交 / 临时 双份状态，修订幂等，预热与就绪标志
//! - **数据流图**: 指标订阅上游序列，推送式级联计算
//!
//! ## 架构设计
//!
//! ```text
//! 行情源 (Append / Amend)
//!     ↓
//! Source Series (series/)
//!     ↓ 同步通知，按订阅顺序
//! IndicatorNode / FanInNode (graph/)
//!     ↓ consume(sample, kind)
//! Indicator (indicators/) ← Versioned + Warmup (state/)
//!     ↓
//! Output Series → 下游指标 ...
//! ```
//!
//! ## 并发模型
//!
//! 单线程、同步、协作式传播：一次 `append` / `amend` 在返回前完成整个下游级联。
//! 不同品种的独立图之间没有共享可变状态，可放在不同线程；同一张图只能由一个线程驱动。

// ============================================================================
// 外部依赖
// ============================================================================

pub use chrono;
pub use log;
pub use serde;
pub use thiserror;

// ============================================================================
// 内部模块
// ============================================================================

/// 样本与更新类型
pub mod sample;

/// 可订阅的时间序列
pub mod series;

/// 已提交 / 临时 状态与预热逻辑
pub mod state;

/// 指标实现与环形缓冲区
pub mod indicators;

/// 指标数据流图
pub mod graph;

/// 配置管理
pub mod config;

/// K 线拆分与模拟行情
pub mod market;

// ============================================================================
// 重导出常用类型
// ============================================================================

pub use config::{EngineConfig, IndicatorConfig, IndicatorKind};
pub use graph::{FanInNode, IndicatorGraph, IndicatorNode, NodeType};
pub use indicators::{
    BinaryOp, Band, Binary, CircularBuffer, Cma, CompositeIndicator, Dsma, Dwma, Ema, Indicator,
    Mse, Sma, StdDev, Tema, Wma,
};
pub use market::{Bar, BarField, BarSeries, GbmConfig, GbmFeed};
pub use sample::{Sample, Timestamp, UpdateKind};
pub use series::{Callback, CheckPass, Listener, Series, SeriesId, SeriesRef, SubscriptionId};
pub use state::{NanFilter, Versioned, Warmup};

// ============================================================================
// 全局错误类型
// ============================================================================

/// 指标引擎错误类型
///
/// 所有错误都是同步的、局限于触发调用的；失败的调用不会修改发生错误的节点状态。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Order violation on {series}: timestamp {found} precedes {last}")]
    OrderViolation {
        series: String,
        last: Timestamp,
        found: Timestamp,
    },

    #[error("Cannot amend empty series: {0}")]
    EmptySeries(String),

    #[error("No baseline state: {0} received an amendment before any new sample")]
    NoBaselineState(String),

    #[error("Desynchronized inputs on {node}: expected timestamp {expected}, found {found}")]
    DesynchronizedInputs {
        node: String,
        expected: Timestamp,
        found: Timestamp,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, IndicatorError>;

// ============================================================================
// 测试模块
// ============================================================================
