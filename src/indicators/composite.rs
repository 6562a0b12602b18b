//! 复合（扇入）指标
//!
//! @yutiansut @quantaxis
//!
//! 组合多个上游序列在同一时间戳上的值。复合指标本身没有递推状态，
//! 预热阈值由图在构建时设为各上游阈值的最大值。

use serde::{Deserialize, Serialize};

use super::CompositeIndicator;
use crate::sample::{Sample, Timestamp, UpdateKind};
use crate::state::Warmup;
use crate::{IndicatorError, Result};

/// 取出两个输入；数量不对时返回 `InvalidConfiguration`，不修改状态
fn pair(name: &str, inputs: &[f64]) -> Result<(f64, f64)> {
    match inputs {
        [a, b] => Ok((*a, *b)),
        _ => Err(IndicatorError::InvalidConfiguration(format!(
            "{} expects 2 inputs, got {}",
            name,
            inputs.len()
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Band - 通道
// ═══════════════════════════════════════════════════════════════════════════

/// 通道线：`middle + multiplier · deviation`
///
/// 输入顺序：[中轨, 离散度]。布林带上下轨即 multiplier = ±2 的两条 Band。
#[derive(Debug, Clone)]
pub struct Band {
    name: String,
    multiplier: f64,
    warmup: Warmup,
}

impl Band {
    pub fn new(multiplier: f64) -> Result<Self> {
        if !multiplier.is_finite() {
            return Err(IndicatorError::InvalidConfiguration(format!(
                "BAND: multiplier must be finite, got {}",
                multiplier
            )));
        }
        let name = format!("BAND({})", multiplier);
        Ok(Self {
            warmup: Warmup::new(name.clone(), 1),
            name,
            multiplier,
        })
    }

    pub fn with_warmup(mut self, threshold: usize) -> Self {
        let emit_nan = self.warmup.emits_nan();
        self.warmup = Warmup::new(self.name.clone(), threshold.max(1)).with_nan(emit_nan);
        self
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.warmup.set_emit_nan(emit_nan);
        self
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl CompositeIndicator for Band {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        2
    }

    fn warmup_period(&self) -> usize {
        self.warmup.threshold()
    }

    fn is_hot(&self) -> bool {
        self.warmup.is_hot()
    }

    fn combine(&mut self, timestamp: Timestamp, inputs: &[f64], kind: UpdateKind) -> Result<Sample> {
        let (middle, deviation) = pair(&self.name, inputs)?;
        self.warmup.advance(kind)?;
        let value = middle + self.multiplier * deviation;
        Ok(Sample::new(timestamp, self.warmup.gate(value)))
    }

    fn reset(&mut self) {
        self.warmup.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Binary - 二元运算
// ═══════════════════════════════════════════════════════════════════════════

/// 二元运算类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// 除数为 0 时返回 NaN
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => {
                if b == 0.0 {
                    f64::NAN
                } else {
                    a / b
                }
            }
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// 两个输入的逐点运算，如 MACD 线 = EMA(12) − EMA(26)
#[derive(Debug, Clone)]
pub struct Binary {
    name: String,
    op: BinaryOp,
    warmup: Warmup,
}

impl Binary {
    pub fn new(op: BinaryOp) -> Self {
        let name = format!("BINARY({})", op.symbol());
        Self {
            warmup: Warmup::new(name.clone(), 1),
            name,
            op,
        }
    }

    pub fn with_warmup(mut self, threshold: usize) -> Self {
        let emit_nan = self.warmup.emits_nan();
        self.warmup = Warmup::new(self.name.clone(), threshold.max(1)).with_nan(emit_nan);
        self
    }

    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.warmup.set_emit_nan(emit_nan);
        self
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

impl CompositeIndicator for Binary {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        2
    }

    fn warmup_period(&self) -> usize {
        self.warmup.threshold()
    }

    fn is_hot(&self) -> bool {
        self.warmup.is_hot()
    }

    fn combine(&mut self, timestamp: Timestamp, inputs: &[f64], kind: UpdateKind) -> Result<Sample> {
        let (a, b) = pair(&self.name, inputs)?;
        self.warmup.advance(kind)?;
        let value = self.op.apply(a, b);
        Ok(Sample::new(timestamp, self.warmup.gate(value)))
    }

    fn reset(&mut self) {
        self.warmup.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band() {
        let mut upper = Band::new(2.0).unwrap();
        let out = upper
            .consume(&[Sample::new(5, 100.0), Sample::new(5, 1.5)], UpdateKind::Append)
            .unwrap();
        assert_eq!(out, Sample::new(5, 103.0));

        let mut lower = Band::new(-2.0).unwrap();
        let out = lower
            .consume(&[Sample::new(5, 100.0), Sample::new(5, 1.5)], UpdateKind::Append)
            .unwrap();
        assert_eq!(out.value, 97.0);
    }

    #[test]
    fn test_band_rejects_non_finite_multiplier() {
        assert!(Band::new(f64::NAN).is_err());
    }

    #[test]
    fn test_desynchronized_inputs() {
        let mut band = Band::new(1.0).unwrap();
        let err = band
            .consume(&[Sample::new(5, 1.0), Sample::new(6, 1.0)], UpdateKind::Append)
            .unwrap_err();
        assert_eq!(
            err,
            IndicatorError::DesynchronizedInputs {
                node: "BAND(1)".to_string(),
                expected: 5,
                found: 6
            }
        );
        // 出错的轮次不计入预热
        assert!(!band.is_hot());
    }

    #[test]
    fn test_wrong_arity() {
        let mut bin = Binary::new(BinaryOp::Add);
        let err = bin.consume(&[Sample::new(1, 1.0)], UpdateKind::Append).unwrap_err();
        assert!(matches!(err, IndicatorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_combine_checks_input_count() {
        let mut band = Band::new(2.0).unwrap();
        let err = band.combine(1, &[100.0], UpdateKind::Append).unwrap_err();
        assert!(matches!(err, IndicatorError::InvalidConfiguration(_)));
        let mut bin = Binary::new(BinaryOp::Add);
        assert!(bin.combine(1, &[], UpdateKind::Append).is_err());
        assert!(bin.combine(1, &[1.0, 2.0, 3.0], UpdateKind::Append).is_err());

        // 失败的调用不计入预热，随后正常计算
        assert_eq!(bin.combine(1, &[1.0, 2.0], UpdateKind::Append).unwrap().value, 3.0);
        assert!(band.combine(1, &[100.0], UpdateKind::Amend).is_err());
        assert_eq!(band.combine(1, &[100.0, 1.5], UpdateKind::Append).unwrap().value, 103.0);
    }

    #[test]
    fn test_binary_ops() {
        assert_eq!(BinaryOp::Add.apply(3.0, 2.0), 5.0);
        assert_eq!(BinaryOp::Sub.apply(3.0, 2.0), 1.0);
        assert_eq!(BinaryOp::Mul.apply(3.0, 2.0), 6.0);
        assert_eq!(BinaryOp::Div.apply(3.0, 2.0), 1.5);
        assert!(BinaryOp::Div.apply(3.0, 0.0).is_nan());
    }

    #[test]
    fn test_binary_warmup_and_amend() {
        let mut bin = Binary::new(BinaryOp::Sub).with_warmup(2).with_nan(true);
        assert!(bin
            .consume(&[Sample::new(1, 1.0), Sample::new(1, 1.0)], UpdateKind::Amend)
            .is_err());

        let out = bin
            .consume(&[Sample::new(1, 5.0), Sample::new(1, 2.0)], UpdateKind::Append)
            .unwrap();
        assert!(out.is_nan());
        let out = bin
            .consume(&[Sample::new(2, 5.0), Sample::new(2, 2.0)], UpdateKind::Append)
            .unwrap();
        assert_eq!(out.value, 3.0);
        let out = bin
            .consume(&[Sample::new(2, 9.0), Sample::new(2, 2.0)], UpdateKind::Amend)
            .unwrap();
        assert_eq!(out.value, 7.0);
        assert!(bin.is_hot());
    }

    #[test]
    fn test_binary_op_serde() {
        let op: BinaryOp = serde_json::from_str("\"div\"").unwrap();
        assert_eq!(op, BinaryOp::Div);
        assert_eq!(serde_json::to_string(&BinaryOp::Sub).unwrap(), "\"sub\"");
    }
}
