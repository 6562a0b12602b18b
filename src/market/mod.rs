//! 行情边界模块
//!
//! @yutiansut @quantaxis
//!
//! - bar: K 线拆分为逐字段序列（open/high/low/close/volume 及 hl2/hlc3/ohlc4）
//! - gbm: 几何布朗运动模拟行情，带盘中修订 tick 流

pub mod bar;
pub mod gbm;

pub use bar::{Bar, BarField, BarSeries};
pub use gbm::{GbmConfig, GbmFeed, TickStream};
