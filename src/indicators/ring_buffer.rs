//! 环形缓冲区 - 滑动窗口核心数据结构
//!
//! @yutiansut @quantaxis
//!
//! 高性能环形缓冲区，用于滑动窗口计算：
//! - O(1) 插入、过期、修订最后一个元素
//! - 增量维护 sum / sum² （不重新扫描窗口，修订从基线重算）
//! - 单调队列维护 min / max
//! - capacity = 0 表示无界窗口（全历史）

use std::collections::VecDeque;

/// f64 滑动窗口，带增量统计
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    /// 内部存储
    buffer: VecDeque<f64>,
    /// 容量（0 = 无界）
    capacity: usize,
    /// 当前和
    sum: f64,
    /// 当前平方和（用于方差）
    sum_sq: f64,
    /// 除最后一个元素外的和：修订只在此基线上加新值，多次修订不累积舍入误差
    base_sum: f64,
    base_sum_sq: f64,
    /// buffer[0] 的绝对序号
    head: u64,
    /// 单调递减队列 (绝对序号, 值)，队首为窗口最大值
    maxs: VecDeque<(u64, f64)>,
    /// 单调递增队列 (绝对序号, 值)，队首为窗口最小值
    mins: VecDeque<(u64, f64)>,
}

impl CircularBuffer {
    /// 创建指定容量的缓冲区，capacity = 0 时为无界窗口
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
            sum_sq: 0.0,
            base_sum: 0.0,
            base_sum_sq: 0.0,
            head: 0,
            maxs: VecDeque::new(),
            mins: VecDeque::new(),
        }
    }

    /// 无界窗口（不淘汰任何元素）
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// 推入新值，如果已满则淘汰最旧的值
    /// 返回被淘汰的值（如果有）
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let expired = if self.is_full() {
            self.head += 1;
            self.buffer.pop_front()
        } else {
            None
        };

        let exp = expired.unwrap_or(0.0);
        self.base_sum = self.sum - exp;
        self.base_sum_sq = self.sum_sq - exp * exp;

        self.buffer.push_back(value);
        self.sum = self.base_sum + value;
        self.sum_sq = self.base_sum_sq + value * value;

        // 过期
        while self.maxs.front().map_or(false, |&(i, _)| i < self.head) {
            self.maxs.pop_front();
        }
        while self.mins.front().map_or(false, |&(i, _)| i < self.head) {
            self.mins.pop_front();
        }

        let idx = self.last_index();
        push_monotone(&mut self.maxs, idx, value, |back, v| back <= v);
        push_monotone(&mut self.mins, idx, value, |back, v| back >= v);

        expired
    }

    /// 替换最近推入的值（上游修订当前 K 线时使用）
    /// 返回被替换的旧值；缓冲区为空时不做任何事
    pub fn replace_last(&mut self, value: f64) -> Option<f64> {
        let old = {
            let last = self.buffer.back_mut()?;
            std::mem::replace(last, value)
        };

        self.sum = self.base_sum + value;
        self.sum_sq = self.base_sum_sq + value * value;

        let idx = self.last_index();
        rebuild_tail(&mut self.maxs, &self.buffer, self.head, idx, value, |back, v| back <= v);
        rebuild_tail(&mut self.mins, &self.buffer, self.head, idx, value, |back, v| back >= v);

        Some(old)
    }

    /// 当前和
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// 当前均值，空缓冲区返回 NaN
    pub fn average(&self) -> f64 {
        if self.buffer.is_empty() {
            f64::NAN
        } else {
            self.sum / self.buffer.len() as f64
        }
    }

    /// 总体方差，空缓冲区返回 NaN
    pub fn variance(&self) -> f64 {
        if self.buffer.is_empty() {
            return f64::NAN;
        }
        let n = self.buffer.len() as f64;
        let mean = self.sum / n;
        (self.sum_sq / n - mean * mean).max(0.0)
    }

    /// 窗口最大值
    pub fn max(&self) -> Option<f64> {
        self.maxs.front().map(|&(_, v)| v)
    }

    /// 窗口最小值
    pub fn min(&self) -> Option<f64> {
        self.mins.front().map(|&(_, v)| v)
    }

    /// 元素数量
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// 是否已满（无界窗口永远不满）
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.buffer.len() >= self.capacity
    }

    pub fn is_unbounded(&self) -> bool {
        self.capacity == 0
    }

    /// 容量（0 = 无界）
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 最新值
    pub fn last(&self) -> Option<f64> {
        self.buffer.back().copied()
    }

    /// 最旧值
    pub fn oldest(&self) -> Option<f64> {
        self.buffer.front().copied()
    }

    /// 获取指定位置的值（0 = 最旧）
    pub fn get(&self, index: usize) -> Option<f64> {
        self.buffer.get(index).copied()
    }

    /// 迭代器（从旧到新）
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.buffer.iter()
    }

    pub fn values(&self) -> Vec<f64> {
        self.buffer.iter().copied().collect()
    }

    /// 清空
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.maxs.clear();
        self.mins.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
        self.base_sum = 0.0;
        self.base_sum_sq = 0.0;
        self.head = 0;
    }

    fn last_index(&self) -> u64 {
        self.head + self.buffer.len() as u64 - 1
    }
}

impl Default for CircularBuffer {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// 单调队列入队：弹出被新值支配的队尾
fn push_monotone(
    deque: &mut VecDeque<(u64, f64)>,
    idx: u64,
    value: f64,
    dominated: impl Fn(f64, f64) -> bool,
) {
    while deque.back().map_or(false, |&(_, back)| dominated(back, value)) {
        deque.pop_back();
    }
    deque.push_back((idx, value));
}

/// 修订最后一个元素后重建单调队列尾部
///
/// 最新元素一定位于队尾。移除它之后，只有位于新队尾之后、
/// 曾被旧值支配的那一段窗口需要重新入队。
fn rebuild_tail(
    deque: &mut VecDeque<(u64, f64)>,
    buffer: &VecDeque<f64>,
    head: u64,
    idx: u64,
    value: f64,
    dominated: impl Fn(f64, f64) -> bool + Copy,
) {
    if deque.back().map_or(false, |&(i, _)| i == idx) {
        deque.pop_back();
    }
    let start = deque.back().map_or(head, |&(i, _)| i + 1);
    for i in start..idx {
        let v = buffer[(i - head) as usize];
        push_monotone(deque, i, v, dominated);
    }
    push_monotone(deque, idx, value, dominated);
}
