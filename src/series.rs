//! 可订阅的时间序列 - 数据流图节点
//!
//! @yutiansut @quantaxis
//!
//! - 独占持有自己的样本序列（时间戳非递减）
//! - 只有最后一个元素可以被修订 (amend)
//! - 以弱引用持有订阅者：订阅关系不延长订阅者生命周期
//! - 每次变更同步、按订阅顺序通知订阅者，没有队列也没有重排
//!
//! 每次更新分两步：
//! 1. 试算 (check)：沿整个下游校验这次更新能否被接受，不修改任何状态
//! 2. 提交 (commit)：写入样本并通知订阅者
//!
//! 试算失败时整张图保持调用前的状态。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::sample::{Sample, Timestamp, UpdateKind};
use crate::{IndicatorError, Result};

static NEXT_SERIES_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CHECK_PASS: AtomicU64 = AtomicU64::new(1);

/// 序列 ID（进程内唯一）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(u64);

/// 订阅 ID，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// 一次试算的标识
///
/// 同一次试算（例如一根 K 线写入多个源序列）内的所有 `check` 调用共享同一个值，
/// 扇入节点据此累积本次试算中已经"到达"的输入。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckPass(u64);

impl CheckPass {
    pub fn next() -> Self {
        Self(NEXT_CHECK_PASS.fetch_add(1, Ordering::Relaxed))
    }
}

/// 共享的序列引用
pub type SeriesRef = Rc<Series>;

// ═══════════════════════════════════════════════════════════════════════════
// 订阅者接口
// ═══════════════════════════════════════════════════════════════════════════

/// 下游观察者
pub trait Listener {
    /// 试算：这次更新能否被接受，不得修改任何状态
    ///
    /// 图内节点在这里完成全部校验，因此提交阶段不会失败。
    fn check(
        &self,
        _source: SeriesId,
        _timestamp: Timestamp,
        _kind: UpdateKind,
        _pass: CheckPass,
    ) -> Result<()> {
        Ok(())
    }

    /// 提交：在触发 `append` / `amend` 的调用栈上同步执行
    ///
    /// 这里返回的错误不会中断对其它订阅者的通知，也不会回滚已写入的样本。
    fn on_update(&self, source: SeriesId, sample: Sample, kind: UpdateKind) -> Result<()>;
}

/// 闭包订阅者，供平台适配层和测试使用
pub struct Callback<F> {
    f: RefCell<F>,
}

impl<F> Callback<F>
where
    F: FnMut(Sample, UpdateKind) -> Result<()>,
{
    pub fn new(f: F) -> Rc<Self> {
        Rc::new(Self { f: RefCell::new(f) })
    }
}

impl<F> Listener for Callback<F>
where
    F: FnMut(Sample, UpdateKind) -> Result<()>,
{
    fn on_update(&self, _source: SeriesId, sample: Sample, kind: UpdateKind) -> Result<()> {
        (self.f.borrow_mut())(sample, kind)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Series
// ═══════════════════════════════════════════════════════════════════════════

/// 可追加、可修订尾部、变更即通知的时间序列
pub struct Series {
    id: SeriesId,
    name: String,
    samples: RefCell<Vec<Sample>>,
    listeners: RefCell<Vec<(SubscriptionId, Weak<dyn Listener>)>>,
    next_subscription: Cell<u64>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> SeriesRef {
        Rc::new(Self {
            id: SeriesId(NEXT_SERIES_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            samples: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            next_subscription: Cell::new(0),
        })
    }

    pub fn id(&self) -> SeriesId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 追加新元素并通知订阅者
    ///
    /// 时间戳早于当前最后一个元素，或下游拒绝这次更新时返回错误，整个下游保持不变。
    pub fn append(&self, sample: Sample) -> Result<()> {
        self.push(sample, UpdateKind::Append)
    }

    /// 原地替换最后一个元素并通知订阅者
    ///
    /// 序列为空时返回 `EmptySeries`；新时间戳早于被替换元素时返回 `OrderViolation`。
    pub fn amend(&self, sample: Sample) -> Result<()> {
        self.push(sample, UpdateKind::Amend)
    }

    /// 按更新类型分派：先试算，通过后提交
    pub fn push(&self, sample: Sample, kind: UpdateKind) -> Result<()> {
        self.check(sample.timestamp, kind, CheckPass::next())?;
        self.commit(sample, kind)
    }

    /// 试算本序列及其整个下游，不修改任何状态
    pub fn check(&self, timestamp: Timestamp, kind: UpdateKind, pass: CheckPass) -> Result<()> {
        {
            let samples = self.samples.borrow();
            match (kind, samples.last()) {
                (UpdateKind::Amend, None) => {
                    return Err(IndicatorError::EmptySeries(self.name.clone()))
                }
                (_, Some(last)) if timestamp < last.timestamp => {
                    return Err(self.order_violation(last.timestamp, timestamp))
                }
                _ => {}
            }
        }
        for listener in self.live_listeners() {
            listener.check(self.id, timestamp, kind, pass)?;
        }
        Ok(())
    }

    /// 写入并通知订阅者，调用方必须已经用 `check` 校验过这次更新
    pub(crate) fn commit(&self, sample: Sample, kind: UpdateKind) -> Result<()> {
        {
            let mut samples = self.samples.borrow_mut();
            match kind {
                UpdateKind::Append => samples.push(sample),
                UpdateKind::Amend => match samples.last_mut() {
                    Some(last) => *last = sample,
                    None => return Err(IndicatorError::EmptySeries(self.name.clone())),
                },
            }
        }
        log::trace!("[Series {}] {:?} {:?}", self.name, kind, sample);
        self.notify(sample, kind)
    }

    /// 注册订阅者（弱引用）
    pub fn subscribe<L: Listener + 'static>(&self, listener: &Rc<L>) -> SubscriptionId {
        let weak: Weak<L> = Rc::downgrade(listener);
        self.subscribe_weak(weak)
    }

    pub fn subscribe_weak(&self, listener: Weak<dyn Listener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// 取消订阅，返回是否找到该订阅
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    /// 仍然存活的订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(_, w)| w.strong_count() > 0)
            .count()
    }

    pub fn len(&self) -> usize {
        self.samples.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.borrow().is_empty()
    }

    /// 最后一个元素（当前可被修订的元素）
    pub fn last(&self) -> Option<Sample> {
        self.samples.borrow().last().copied()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last().map(|s| s.value)
    }

    pub fn get(&self, index: usize) -> Option<Sample> {
        self.samples.borrow().get(index).copied()
    }

    /// 样本快照
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.borrow().clone()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.borrow().iter().map(|s| s.value).collect()
    }

    /// 清空样本（不通知订阅者，订阅关系保留）
    pub fn clear(&self) {
        self.samples.borrow_mut().clear();
    }

    // 先拷贝订阅列表，订阅者在回调中可以安全地订阅 / 取消订阅
    fn live_listeners(&self) -> Vec<Rc<dyn Listener>> {
        self.listeners
            .borrow()
            .iter()
            .filter_map(|(_, w)| w.upgrade())
            .collect()
    }

    fn notify(&self, sample: Sample, kind: UpdateKind) -> Result<()> {
        let listeners: Vec<Weak<dyn Listener>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, w)| w.clone())
            .collect();

        let mut has_dead = false;
        let mut first_error = None;
        for weak in listeners {
            match weak.upgrade() {
                Some(listener) => {
                    if let Err(e) = listener.on_update(self.id, sample, kind) {
                        log::warn!("[Series {}] subscriber failed on {:?}: {}", self.name, kind, e);
                        first_error.get_or_insert(e);
                    }
                }
                None => has_dead = true,
            }
        }

        if has_dead {
            let mut listeners = self.listeners.borrow_mut();
            let before = listeners.len();
            listeners.retain(|(_, w)| w.strong_count() > 0);
            log::debug!(
                "[Series {}] pruned {} dropped subscriber(s)",
                self.name,
                before - listeners.len()
            );
        }

        first_error.map_or(Ok(()), Err)
    }

    fn order_violation(&self, last: i64, found: i64) -> IndicatorError {
        IndicatorError::OrderViolation {
            series: self.name.clone(),
            last,
            found,
        }
    }
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Series")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 测试
// ═══════════════════════════════════════════════════════════════════════════
