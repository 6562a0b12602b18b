//! 配置管理模块
//!
//! 用 TOML 描述一整张指标图：
//!
//! ```toml
//! sources = ["close"]
//!
//! [engine]
//! emit_nan = false
//!
//! [[indicators]]
//! id = "ema_fast"
//! kind = "ema"
//! period = 12
//! inputs = ["close"]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::indicators::{
    Band, Binary, BinaryOp, Cma, CompositeIndicator, Dsma, Dwma, Ema, Indicator, Mse, Sma, StdDev,
    Tema, Wma,
};
use crate::{IndicatorError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
}

/// 引擎级默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSection {
    /// 预热期内输出 NaN（单个指标可覆盖）
    #[serde(default)]
    pub emit_nan: bool,
}

/// 单个指标节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub id: String,
    pub inputs: Vec<String>,
    #[serde(default)]
    pub emit_nan: Option<bool>,
    #[serde(flatten)]
    pub kind: IndicatorKind,
}

/// 指标类型及其参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma { period: usize },
    Ema { period: usize },
    Tema { period: usize },
    Wma { period: usize },
    Dwma { period: usize },
    Dsma { period: usize },
    Mse { period: usize },
    #[serde(alias = "stddev")]
    StdDev { period: usize },
    Cma,
    Band { multiplier: f64 },
    Binary { op: BinaryOp },
}

impl IndicatorKind {
    /// 输入数量
    pub fn arity(&self) -> usize {
        if self.is_composite() {
            2
        } else {
            1
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, IndicatorKind::Band { .. } | IndicatorKind::Binary { .. })
    }

    /// 构建单输入指标
    pub fn build_single(&self, emit_nan: bool) -> Result<Box<dyn Indicator>> {
        let indicator: Box<dyn Indicator> = match *self {
            IndicatorKind::Sma { period } => Box::new(Sma::new(period)?.with_nan(emit_nan)),
            IndicatorKind::Ema { period } => Box::new(Ema::new(period)?.with_nan(emit_nan)),
            IndicatorKind::Tema { period } => Box::new(Tema::new(period)?.with_nan(emit_nan)),
            IndicatorKind::Wma { period } => Box::new(Wma::new(period)?.with_nan(emit_nan)),
            IndicatorKind::Dwma { period } => Box::new(Dwma::new(period)?.with_nan(emit_nan)),
            IndicatorKind::Dsma { period } => Box::new(Dsma::new(period)?.with_nan(emit_nan)),
            IndicatorKind::Mse { period } => Box::new(Mse::new(period)?.with_nan(emit_nan)),
            IndicatorKind::StdDev { period } => Box::new(StdDev::new(period)?.with_nan(emit_nan)),
            IndicatorKind::Cma => Box::new(Cma::new()),
            IndicatorKind::Band { .. } | IndicatorKind::Binary { .. } => {
                return Err(IndicatorError::InvalidConfiguration(format!(
                    "{:?} is a multi-input indicator",
                    self
                )))
            }
        };
        Ok(indicator)
    }

    /// 构建多输入指标，`warmup` 为上游阈值的最大值
    pub fn build_composite(
        &self,
        emit_nan: bool,
        warmup: usize,
    ) -> Result<Box<dyn CompositeIndicator>> {
        match *self {
            IndicatorKind::Band { multiplier } => Ok(Box::new(
                Band::new(multiplier)?
                    .with_warmup(warmup)
                    .with_nan(emit_nan),
            )),
            IndicatorKind::Binary { op } => Ok(Box::new(
                Binary::new(op).with_warmup(warmup).with_nan(emit_nan),
            )),
            _ => Err(IndicatorError::InvalidConfiguration(format!(
                "{:?} is a single-input indicator",
                self
            ))),
        }
    }
}

impl EngineConfig {
    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            IndicatorError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// 加载默认配置文件
    pub fn load_default() -> Result<Self> {
        Self::load_from_file("config/indicators.toml")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| IndicatorError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    /// 指标实际使用的 NaN 门控设置
    pub fn emit_nan_for(&self, indicator: &IndicatorConfig) -> bool {
        indicator.emit_nan.unwrap_or(self.engine.emit_nan)
    }
}
