//! 增量指标模块
//!
//! @yutiansut @quantaxis
//!
//! 提供各类增量指标：
//! - 环形缓冲区 (滑动窗口数据结构)
//! - 均线 (SMA, EMA, TEMA, WMA, DWMA, DSMA, CMA)
//! - 离散度 (MSE, StdDev)
//! - 复合指标 (Band, Binary) - 多输入扇入

pub mod ring_buffer;
pub mod sma;
pub mod ema;
pub mod tema;
pub mod wma;
pub mod dsma;
pub mod deviation;
pub mod composite;

pub use ring_buffer::*;
pub use sma::*;
pub use ema::*;
pub use tema::*;
pub use wma::*;
pub use dsma::*;
pub use deviation::*;
pub use composite::*;

use crate::sample::{Sample, Timestamp, UpdateKind};
use crate::{IndicatorError, Result};

/// 增量指标核心 Trait
///
/// 设计原则:
/// 1. 状态封装: 每个指标管理自己的已提交 / 临时 状态
/// 2. 一进一出: 每个输入恰好产生一个输出样本，时间戳与输入相同
/// 3. 修订幂等: Amend 总是从最近一次 Append 之后的基线重算
pub trait Indicator {
    /// 指标名称，如 `EMA(12)`
    fn name(&self) -> &str;

    /// 窗口长度（无界窗口为 0）
    fn period(&self) -> usize;

    /// 就绪所需的输入数量
    fn warmup_period(&self) -> usize;

    /// 是否已完成预热（一旦为真不再回退）
    fn is_hot(&self) -> bool;

    /// 增量更新 (核心)
    fn consume(&mut self, sample: Sample, kind: UpdateKind) -> Result<Sample>;

    /// 重置到初始状态
    fn reset(&mut self);

    /// 新 K 线
    fn push(&mut self, sample: Sample) -> Result<Sample> {
        self.consume(sample, UpdateKind::Append)
    }

    /// 修订当前 K 线
    fn amend(&mut self, sample: Sample) -> Result<Sample> {
        self.consume(sample, UpdateKind::Amend)
    }
}

/// 多输入（扇入）指标 Trait
pub trait CompositeIndicator {
    fn name(&self) -> &str;

    /// 输入数量
    fn arity(&self) -> usize;

    fn warmup_period(&self) -> usize;

    fn is_hot(&self) -> bool;

    /// 按输入顺序合并同一时间戳的各输入值
    ///
    /// `inputs` 数量与 `arity()` 不符时返回 `InvalidConfiguration`，不修改状态。
    fn combine(&mut self, timestamp: Timestamp, inputs: &[f64], kind: UpdateKind)
        -> Result<Sample>;

    fn reset(&mut self);

    /// 校验输入对齐后合并
    fn consume(&mut self, inputs: &[Sample], kind: UpdateKind) -> Result<Sample> {
        if inputs.is_empty() || inputs.len() != self.arity() {
            return Err(IndicatorError::InvalidConfiguration(format!(
                "{} expects {} inputs, got {}",
                self.name(),
                self.arity(),
                inputs.len()
            )));
        }
        let timestamp = inputs[0].timestamp;
        if let Some(off) = inputs.iter().find(|s| s.timestamp != timestamp) {
            return Err(IndicatorError::DesynchronizedInputs {
                node: self.name().to_string(),
                expected: timestamp,
                found: off.timestamp,
            });
        }
        let values: Vec<f64> = inputs.iter().map(|s| s.value).collect();
        self.combine(timestamp, &values, kind)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// 确定性的测试价格序列
    pub fn prices(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = i as f64;
                100.0 + (x * 0.37).sin() * 5.0 + (x * 0.05).cos() * 3.0 + x * 0.1
            })
            .collect()
    }

    /// 逐个 Append，返回输出值
    pub fn run(ind: &mut dyn Indicator, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| ind.push(Sample::new(i as i64, v)).unwrap().value)
            .collect()
    }

    /// amend(x1) 再 amend(x2) 必须与只 amend(x2) 的结果完全一致，
    /// 且随后的 Append 也不受影响
    pub fn assert_amend_idempotent<F>(make: F)
    where
        F: Fn() -> Box<dyn Indicator>,
    {
        let history = prices(60);
        for cut in [1usize, 2, 5, 20, 59] {
            let mut a = make();
            let mut b = make();
            run(a.as_mut(), &history[..cut]);
            run(b.as_mut(), &history[..cut]);

            let t = (cut - 1) as i64;
            a.amend(Sample::new(t, 250.0)).unwrap();
            a.amend(Sample::new(t, 1.0)).unwrap();
            let out_a = a.amend(Sample::new(t, 97.5)).unwrap();
            let out_b = b.amend(Sample::new(t, 97.5)).unwrap();
            assert!(
                out_a.bit_eq(&out_b),
                "{} after {} inputs: {:?} vs {:?}",
                a.name(),
                cut,
                out_a,
                out_b
            );

            let next_a = a.push(Sample::new(cut as i64, 101.0)).unwrap();
            let next_b = b.push(Sample::new(cut as i64, 101.0)).unwrap();
            assert!(next_a.bit_eq(&next_b), "{} next after {}", a.name(), cut);
        }
    }

    /// 修订到原值等价于没有修订
    pub fn assert_amend_to_same_value_is_noop<F>(make: F)
    where
        F: Fn() -> Box<dyn Indicator>,
    {
        let history = prices(40);
        let mut a = make();
        let mut b = make();
        for (i, &v) in history.iter().enumerate() {
            let t = i as i64;
            let out_a = a.push(Sample::new(t, v)).unwrap();
            a.amend(Sample::new(t, v + 3.0)).unwrap();
            let amended = a.amend(Sample::new(t, v)).unwrap();
            let out_b = b.push(Sample::new(t, v)).unwrap();
            assert!(out_a.bit_eq(&out_b));
            assert!((amended.value - out_b.value).abs() < 1e-9 || (amended.is_nan() && out_b.is_nan()));
        }
    }

    pub fn assert_rejects_amend_without_baseline(mut ind: Box<dyn Indicator>) {
        let err = ind.amend(Sample::new(0, 1.0)).unwrap_err();
        assert!(matches!(err, IndicatorError::NoBaselineState(_)));
        // 失败的调用不影响后续计算
        assert!(ind.push(Sample::new(0, 1.0)).is_ok());
    }
}
