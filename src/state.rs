//! 增量状态管理
//!
//! @yutiansut @quantaxis
//!
//! 实时行情中当前 K 线在收盘前会被反复修订，因此每个递推变量需要两份：
//! - committed: 截至上一个已确认（Append）输入的状态
//! - tentative: 针对当前仍可修订的输入计算出的临时状态
//!
//! Append 时 tentative → committed（提交并前进）；
//! Amend 时 committed → tentative（丢弃上次修订，从基线重算）。

use crate::sample::UpdateKind;
use crate::{IndicatorError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// Versioned - 已提交 / 临时 双份状态
// ═══════════════════════════════════════════════════════════════════════════

/// 递推状态的双份副本
#[derive(Debug, Clone, Default)]
pub struct Versioned<T> {
    committed: T,
    tentative: T,
}

impl<T: Clone> Versioned<T> {
    pub fn new(initial: T) -> Self {
        Self {
            committed: initial.clone(),
            tentative: initial,
        }
    }

    /// 开始处理一个输入，返回可写的临时状态
    ///
    /// - Append: 上一步的临时状态成为新的基线
    /// - Amend: 临时状态回滚到基线，多次修订互不叠加
    pub fn begin(&mut self, kind: UpdateKind) -> &mut T {
        match kind {
            UpdateKind::Append => self.committed = self.tentative.clone(),
            UpdateKind::Amend => self.tentative = self.committed.clone(),
        }
        &mut self.tentative
    }

    /// 已提交状态
    pub fn committed(&self) -> &T {
        &self.committed
    }

    /// 最近一次计算的临时状态
    pub fn tentative(&self) -> &T {
        &self.tentative
    }

    pub fn reset(&mut self, initial: T) {
        self.committed = initial.clone();
        self.tentative = initial;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Warmup - 预热 / 就绪 / NaN 门控
// ═══════════════════════════════════════════════════════════════════════════

/// 各指标共用的预热逻辑
///
/// `count` 只统计 Append 输入；Amend 不改变计数，因此就绪标志一旦为真就不会回退。
#[derive(Debug, Clone)]
pub struct Warmup {
    name: String,
    threshold: usize,
    emit_nan: bool,
    count: usize,
    hot: bool,
}

impl Warmup {
    pub fn new(name: impl Into<String>, threshold: usize) -> Self {
        Self {
            name: name.into(),
            threshold,
            emit_nan: false,
            count: 0,
            hot: threshold == 0,
        }
    }

    /// 预热期内输出 NaN 而不是种子值
    pub fn with_nan(mut self, emit_nan: bool) -> Self {
        self.emit_nan = emit_nan;
        self
    }

    pub fn set_emit_nan(&mut self, emit_nan: bool) {
        self.emit_nan = emit_nan;
    }

    /// 登记一个输入，返回该输入的序号（从 0 开始）
    ///
    /// 在任何 Append 之前收到 Amend 时返回 `NoBaselineState`，且不修改任何状态。
    pub fn advance(&mut self, kind: UpdateKind) -> Result<usize> {
        match kind {
            UpdateKind::Amend if self.count == 0 => {
                Err(IndicatorError::NoBaselineState(self.name.clone()))
            }
            UpdateKind::Amend => Ok(self.count - 1),
            UpdateKind::Append => {
                self.count += 1;
                if self.count >= self.threshold {
                    self.hot = true;
                }
                Ok(self.count - 1)
            }
        }
    }

    /// 预热期内且开启 NaN 门控时返回 NaN
    pub fn gate(&self, value: f64) -> f64 {
        if self.emit_nan && !self.hot {
            f64::NAN
        } else {
            value
        }
    }

    pub fn is_hot(&self) -> bool {
        self.hot
    }

    pub fn emits_nan(&self) -> bool {
        self.emit_nan
    }

    /// 已提交的输入数量
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.hot = self.threshold == 0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NanFilter - 不可计算输入过滤
// ═══════════════════════════════════════════════════════════════════════════

/// 把上游的 NaN（尚不可计算）挡在公式状态之外
///
/// - NaN 输入不进入缓冲区和递推状态，也不计入预热
/// - 以 NaN 开盘的 K 线被修订为有效值时，该修订作为这根 K 线的首个输入 (Append)
/// - 已有有效值的 K 线被修订为 NaN 时，公式状态保留最近一次有效修订
#[derive(Debug, Clone, Copy, Default)]
pub struct NanFilter {
    bar_fed: bool,
}

impl NanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应交给公式的更新类型；`None` 表示跳过这个输入
    pub fn admit(&self, value: f64, kind: UpdateKind) -> Option<UpdateKind> {
        if value.is_nan() {
            return None;
        }
        match kind {
            UpdateKind::Amend if self.bar_fed => Some(UpdateKind::Amend),
            _ => Some(UpdateKind::Append),
        }
    }

    /// 公式成功处理（或跳过）输入后登记
    pub fn record(&mut self, value: f64, kind: UpdateKind) {
        if !value.is_nan() {
            self.bar_fed = true;
        } else if kind == UpdateKind::Append {
            self.bar_fed = false;
        }
    }

    /// 当前 K 线是否已有有效值进入公式
    pub fn bar_fed(&self) -> bool {
        self.bar_fed
    }

    pub fn reset(&mut self) {
        self.bar_fed = false;
    }
}

/// 校验周期参数
pub fn check_period(name: &str, period: usize) -> Result<usize> {
    if period < 1 {
        return Err(IndicatorError::InvalidConfiguration(format!(
            "{}: period must be >= 1, got {}",
            name, period
        )));
    }
    Ok(period)
}
