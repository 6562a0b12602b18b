//! 指标数据流图
//!
//! @yutiansut @quantaxis
//!
//! 提供指标订阅关系的构建与驱动：
//! - IndicatorNode: 单输入指标，订阅一个上游序列
//! - FanInNode: 多输入指标，按时间戳对齐各上游的同一轮输出
//! - IndicatorGraph: 按 ID 管理源序列和节点，插入顺序即拓扑顺序
//!
//! 传播是推送式、同步的：一次源序列的 append / amend 在返回前完成整个下游级联。
//! 每个节点先参与试算 (check)，整条链路都接受后才提交，失败的调用不改变任何节点。
//! 上游的 NaN（尚不可计算）不进入下游公式状态，见 [`NanFilter`]。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::indicators::{CompositeIndicator, Indicator};
use crate::market::{Bar, BarField};
use crate::sample::{Sample, Timestamp, UpdateKind};
use crate::series::{CheckPass, Listener, Series, SeriesId, SeriesRef, SubscriptionId};
use crate::state::NanFilter;
use crate::{IndicatorError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// IndicatorNode - 单输入节点
// ═══════════════════════════════════════════════════════════════════════════

/// 单输入指标节点
///
/// 共享上游序列，独占输出序列。挂载时先回放上游已有历史，再订阅；
/// 节点被释放时自动取消订阅。
pub struct IndicatorNode {
    indicator: RefCell<Box<dyn Indicator>>,
    filter: Cell<NanFilter>,
    input: SeriesRef,
    output: SeriesRef,
    subscription: Cell<Option<SubscriptionId>>,
}

impl IndicatorNode {
    /// 挂载到上游序列，输出序列以指标名称命名
    pub fn attach(indicator: Box<dyn Indicator>, input: &SeriesRef) -> Result<Rc<Self>> {
        let name = indicator.name().to_string();
        Self::attach_as(name, indicator, input)
    }

    /// 挂载到上游序列，并指定输出序列名称
    pub fn attach_as(
        name: impl Into<String>,
        indicator: Box<dyn Indicator>,
        input: &SeriesRef,
    ) -> Result<Rc<Self>> {
        let node = Rc::new(Self {
            indicator: RefCell::new(indicator),
            filter: Cell::new(NanFilter::new()),
            input: Rc::clone(input),
            output: Series::new(name),
            subscription: Cell::new(None),
        });

        for sample in input.samples() {
            node.handle(sample, UpdateKind::Append)?;
        }

        let id = input.subscribe(&node);
        node.subscription.set(Some(id));
        log::debug!(
            "[IndicatorNode] {} attached to {} (replayed {} samples)",
            node.output.name(),
            input.name(),
            node.output.len()
        );
        Ok(node)
    }

    fn handle(&self, sample: Sample, kind: UpdateKind) -> Result<()> {
        let mut filter = self.filter.get();
        let out = match filter.admit(sample.value, kind) {
            Some(effective) => self.indicator.borrow_mut().consume(sample, effective)?,
            None => Sample::nan(sample.timestamp),
        };
        filter.record(sample.value, kind);
        self.filter.set(filter);
        // 输出序列与输入一一对应，沿用外部的更新类型
        self.output.commit(out, kind)
    }

    pub fn output(&self) -> &SeriesRef {
        &self.output
    }

    pub fn input(&self) -> &SeriesRef {
        &self.input
    }

    pub fn name(&self) -> String {
        self.indicator.borrow().name().to_string()
    }

    pub fn is_hot(&self) -> bool {
        self.indicator.borrow().is_hot()
    }

    pub fn warmup_period(&self) -> usize {
        self.indicator.borrow().warmup_period()
    }

    /// 清空指标状态和输出序列（不通知下游）
    pub fn reset(&self) {
        self.indicator.borrow_mut().reset();
        self.filter.set(NanFilter::new());
        self.output.clear();
    }
}

impl Listener for IndicatorNode {
    fn check(
        &self,
        _source: SeriesId,
        timestamp: Timestamp,
        kind: UpdateKind,
        pass: CheckPass,
    ) -> Result<()> {
        if kind.is_amendment() && self.output.is_empty() {
            return Err(IndicatorError::NoBaselineState(self.name()));
        }
        self.output.check(timestamp, kind, pass)
    }

    fn on_update(&self, _source: SeriesId, sample: Sample, kind: UpdateKind) -> Result<()> {
        self.handle(sample, kind)
    }
}

impl Drop for IndicatorNode {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.input.unsubscribe(id);
        }
    }
}

impl fmt::Debug for IndicatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicatorNode")
            .field("indicator", &self.name())
            .field("input", &self.input.name())
            .field("output", &self.output.name())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FanInNode - 多输入节点
// ═══════════════════════════════════════════════════════════════════════════

/// 当前正在收集的一轮输入
#[derive(Debug, Clone)]
struct Round {
    kind: Option<UpdateKind>,
    timestamp: Option<Timestamp>,
    slots: Vec<Option<Sample>>,
}

impl Round {
    fn new(arity: usize) -> Self {
        Self {
            kind: None,
            timestamp: None,
            slots: vec![None; arity],
        }
    }

    fn clear(&mut self) {
        self.kind = None;
        self.timestamp = None;
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// 放入来自 `source` 的输入；与本轮不一致时返回本轮的时间戳，且不修改状态
    fn fill(
        &mut self,
        inputs: &[SeriesRef],
        source: SeriesId,
        sample: Sample,
        kind: UpdateKind,
    ) -> std::result::Result<(), Timestamp> {
        if let Some(expected) = self.timestamp {
            // Append 轮次中同一输入再次到达，说明它已经越过了本轮
            let repeated = kind == UpdateKind::Append
                && self
                    .slots
                    .iter()
                    .zip(inputs)
                    .any(|(slot, input)| input.id() == source && slot.is_some());
            if expected != sample.timestamp || self.kind != Some(kind) || repeated {
                return Err(expected);
            }
        }
        self.timestamp = Some(sample.timestamp);
        self.kind = Some(kind);
        for (slot, input) in self.slots.iter_mut().zip(inputs) {
            if input.id() == source {
                *slot = Some(sample);
            }
        }
        Ok(())
    }

    /// 所有输入到齐时取出本轮并清空
    fn take_complete(&mut self) -> Option<Vec<Sample>> {
        if !self.is_complete() {
            return None;
        }
        let samples = self.slots.iter().flatten().copied().collect();
        self.clear();
        Some(samples)
    }
}

/// 多输入指标节点
///
/// 每个上游在一轮中提供一个值；所有输入到齐后合并输出。
/// 同一轮内时间戳不一致，或 Append / Amend 混杂，返回 `DesynchronizedInputs`。
/// 这一错误在试算阶段给出：触发方的序列不会被写入，本轮已收集的输入保持原样，
/// 补上缺失的输入后继续工作。
pub struct FanInNode {
    indicator: RefCell<Box<dyn CompositeIndicator>>,
    inputs: Vec<SeriesRef>,
    output: SeriesRef,
    round: RefCell<Round>,
    /// 试算中的轮次副本
    dry: RefCell<Option<(CheckPass, Round)>>,
    subscriptions: RefCell<Vec<(SeriesRef, SubscriptionId)>>,
}

impl FanInNode {
    pub fn attach(
        indicator: Box<dyn CompositeIndicator>,
        inputs: &[SeriesRef],
    ) -> Result<Rc<Self>> {
        let name = indicator.name().to_string();
        Self::attach_as(name, indicator, inputs)
    }

    pub fn attach_as(
        name: impl Into<String>,
        indicator: Box<dyn CompositeIndicator>,
        inputs: &[SeriesRef],
    ) -> Result<Rc<Self>> {
        let name = name.into();
        if inputs.is_empty() || inputs.len() != indicator.arity() {
            return Err(IndicatorError::InvalidConfiguration(format!(
                "{}: {} expects {} inputs, got {}",
                name,
                indicator.name(),
                indicator.arity(),
                inputs.len()
            )));
        }

        let history = inputs[0].len();
        if let Some(other) = inputs.iter().find(|s| s.len() != history) {
            return Err(IndicatorError::InvalidConfiguration(format!(
                "{}: inputs {} and {} have different history lengths ({} vs {})",
                name,
                inputs[0].name(),
                other.name(),
                history,
                other.len()
            )));
        }

        let node = Rc::new(Self {
            round: RefCell::new(Round::new(inputs.len())),
            dry: RefCell::new(None),
            indicator: RefCell::new(indicator),
            inputs: inputs.to_vec(),
            output: Series::new(name),
            subscriptions: RefCell::new(Vec::new()),
        });

        for i in 0..history {
            let samples: Vec<Sample> = node.inputs.iter().filter_map(|s| s.get(i)).collect();
            let out = node
                .indicator
                .borrow_mut()
                .consume(&samples, UpdateKind::Append)?;
            node.output.commit(out, UpdateKind::Append)?;
        }

        // 同一序列作为多个输入时只订阅一次，一次通知填充所有对应槽位
        let mut subscribed: Vec<SeriesId> = Vec::new();
        for input in &node.inputs {
            if subscribed.contains(&input.id()) {
                continue;
            }
            subscribed.push(input.id());
            let id = input.subscribe(&node);
            node.subscriptions.borrow_mut().push((Rc::clone(input), id));
        }

        log::debug!(
            "[FanInNode] {} attached to [{}]",
            node.output.name(),
            node.inputs
                .iter()
                .map(|s| s.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(node)
    }

    pub fn output(&self) -> &SeriesRef {
        &self.output
    }

    pub fn inputs(&self) -> &[SeriesRef] {
        &self.inputs
    }

    pub fn name(&self) -> String {
        self.indicator.borrow().name().to_string()
    }

    pub fn is_hot(&self) -> bool {
        self.indicator.borrow().is_hot()
    }

    pub fn warmup_period(&self) -> usize {
        self.indicator.borrow().warmup_period()
    }

    /// 当前轮次已到达的输入数量
    pub fn pending(&self) -> usize {
        self.round.borrow().slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn reset(&self) {
        self.indicator.borrow_mut().reset();
        self.round.borrow_mut().clear();
        self.dry.replace(None);
        self.output.clear();
    }

    fn desync(&self, expected: Timestamp, found: Timestamp) -> IndicatorError {
        IndicatorError::DesynchronizedInputs {
            node: self.output.name().to_string(),
            expected,
            found,
        }
    }
}

impl Listener for FanInNode {
    fn check(
        &self,
        source: SeriesId,
        timestamp: Timestamp,
        kind: UpdateKind,
        pass: CheckPass,
    ) -> Result<()> {
        // 同一次试算中先到的输入记在副本里，真实轮次不动
        let complete = {
            let mut dry = self.dry.borrow_mut();
            let mut round = match dry.take() {
                Some((p, round)) if p == pass => round,
                _ => self.round.borrow().clone(),
            };
            round
                .fill(&self.inputs, source, Sample::nan(timestamp), kind)
                .map_err(|expected| self.desync(expected, timestamp))?;
            let complete = round.take_complete().is_some();
            *dry = Some((pass, round));
            complete
        };
        if complete {
            self.output.check(timestamp, kind, pass)
        } else {
            Ok(())
        }
    }

    fn on_update(&self, source: SeriesId, sample: Sample, kind: UpdateKind) -> Result<()> {
        let ready = {
            let mut round = self.round.borrow_mut();
            round
                .fill(&self.inputs, source, sample, kind)
                .map_err(|expected| self.desync(expected, sample.timestamp))?;
            round.take_complete()
        };

        match ready {
            Some(samples) => {
                let out = self.indicator.borrow_mut().consume(&samples, kind)?;
                log::trace!("[FanInNode] {} {:?} {:?}", self.output.name(), kind, out);
                self.output.commit(out, kind)
            }
            None => Ok(()),
        }
    }
}

impl Drop for FanInNode {
    fn drop(&mut self) {
        for (input, id) in self.subscriptions.borrow_mut().drain(..) {
            input.unsubscribe(id);
        }
    }
}

impl fmt::Debug for FanInNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanInNode")
            .field("indicator", &self.name())
            .field("inputs", &self.inputs.len())
            .field("output", &self.output.name())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IndicatorGraph - 按 ID 管理的指标图
// ═══════════════════════════════════════════════════════════════════════════

/// 图节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// 外部行情直接写入的源序列
    Source,
    /// 单输入指标
    Single,
    /// 多输入指标
    Composite,
}

enum NodeHandle {
    Source,
    Single(Rc<IndicatorNode>),
    Composite(Rc<FanInNode>),
}

struct GraphEntry {
    series: SeriesRef,
    dependencies: Vec<String>,
    handle: NodeHandle,
}

/// 指标图
///
/// 持有所有节点（保证节点存活），只有源序列可以被外部写入。
/// 节点只能引用已存在的节点，因此插入顺序就是拓扑顺序，不会出现环。
#[derive(Default)]
pub struct IndicatorGraph {
    entries: HashMap<String, GraphEntry>,
    order: Vec<String>,
}

impl IndicatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置构建整张图
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut graph = Self::new();
        for source in &config.sources {
            graph.add_source(source.clone())?;
        }

        for ind in &config.indicators {
            let emit_nan = config.emit_nan_for(ind);
            if ind.kind.is_composite() {
                let mut warmup = 0;
                for input in &ind.inputs {
                    warmup = warmup.max(graph.warmup_period(input).ok_or_else(|| {
                        IndicatorError::InvalidConfiguration(format!(
                            "{}: unknown input {}",
                            ind.id, input
                        ))
                    })?);
                }
                let composite = ind.kind.build_composite(emit_nan, warmup)?;
                let inputs: Vec<&str> = ind.inputs.iter().map(String::as_str).collect();
                graph.add_composite(ind.id.clone(), &inputs, composite)?;
            } else {
                if ind.inputs.len() != 1 {
                    return Err(IndicatorError::InvalidConfiguration(format!(
                        "{}: expects 1 input, got {}",
                        ind.id,
                        ind.inputs.len()
                    )));
                }
                let indicator = ind.kind.build_single(emit_nan)?;
                graph.add_indicator(ind.id.clone(), &ind.inputs[0], indicator)?;
            }
        }

        log::info!(
            "[IndicatorGraph] built {} sources, {} indicators",
            config.sources.len(),
            config.indicators.len()
        );
        Ok(graph)
    }

    /// 添加源序列
    pub fn add_source(&mut self, id: impl Into<String>) -> Result<SeriesRef> {
        let id = id.into();
        self.check_new(&id)?;
        let series = Series::new(id.clone());
        self.insert(id, Rc::clone(&series), Vec::new(), NodeHandle::Source);
        Ok(series)
    }

    /// 添加单输入指标
    pub fn add_indicator(
        &mut self,
        id: impl Into<String>,
        input: &str,
        indicator: Box<dyn Indicator>,
    ) -> Result<SeriesRef> {
        let id = id.into();
        self.check_new(&id)?;
        let upstream = self.resolve(&id, input)?;
        let node = IndicatorNode::attach_as(id.clone(), indicator, &upstream)?;
        let series = Rc::clone(node.output());
        self.insert(
            id,
            Rc::clone(&series),
            vec![input.to_string()],
            NodeHandle::Single(node),
        );
        Ok(series)
    }

    /// 添加多输入指标
    pub fn add_composite(
        &mut self,
        id: impl Into<String>,
        inputs: &[&str],
        indicator: Box<dyn CompositeIndicator>,
    ) -> Result<SeriesRef> {
        let id = id.into();
        self.check_new(&id)?;
        let upstream = inputs
            .iter()
            .map(|input| self.resolve(&id, input))
            .collect::<Result<Vec<_>>>()?;
        let node = FanInNode::attach_as(id.clone(), indicator, &upstream)?;
        let series = Rc::clone(node.output());
        self.insert(
            id,
            Rc::clone(&series),
            inputs.iter().map(|s| s.to_string()).collect(),
            NodeHandle::Composite(node),
        );
        Ok(series)
    }

    /// 向源序列追加新样本
    pub fn append(&self, id: &str, sample: Sample) -> Result<()> {
        self.source(id)?.append(sample)
    }

    /// 修订源序列的最后一个样本
    pub fn amend(&self, id: &str, sample: Sample) -> Result<()> {
        self.source(id)?.amend(sample)
    }

    pub fn push(&self, id: &str, sample: Sample, kind: UpdateKind) -> Result<()> {
        self.source(id)?.push(sample, kind)
    }

    /// 把 K 线各字段写入同名源序列（如 close、hl2），未注册的字段忽略
    ///
    /// 各字段共用一次试算，任一字段被拒绝时整根 K 线都不写入。
    pub fn push_bar(&self, bar: &Bar, kind: UpdateKind) -> Result<()> {
        let targets: Vec<(&SeriesRef, Sample)> = BarField::ALL
            .iter()
            .filter_map(|field| match self.entries.get(field.as_str()) {
                Some(GraphEntry {
                    series,
                    handle: NodeHandle::Source,
                    ..
                }) => Some((series, bar.sample(*field))),
                _ => None,
            })
            .collect();

        let pass = CheckPass::next();
        for (series, sample) in &targets {
            series.check(sample.timestamp, kind, pass)?;
        }
        for (series, sample) in targets {
            series.commit(sample, kind)?;
        }
        Ok(())
    }

    pub fn series(&self, id: &str) -> Option<SeriesRef> {
        self.entries.get(id).map(|e| Rc::clone(&e.series))
    }

    /// 最新值
    pub fn last_value(&self, id: &str) -> Option<f64> {
        self.entries.get(id).and_then(|e| e.series.last_value())
    }

    pub fn node_type(&self, id: &str) -> Option<NodeType> {
        self.entries.get(id).map(|e| match e.handle {
            NodeHandle::Source => NodeType::Source,
            NodeHandle::Single(_) => NodeType::Single,
            NodeHandle::Composite(_) => NodeType::Composite,
        })
    }

    /// 源序列总是就绪
    pub fn is_hot(&self, id: &str) -> Option<bool> {
        self.entries.get(id).map(|e| match &e.handle {
            NodeHandle::Source => true,
            NodeHandle::Single(node) => node.is_hot(),
            NodeHandle::Composite(node) => node.is_hot(),
        })
    }

    /// 所有指标是否都已就绪
    pub fn all_hot(&self) -> bool {
        self.order
            .iter()
            .all(|id| self.is_hot(id).unwrap_or(false))
    }

    pub fn warmup_period(&self, id: &str) -> Option<usize> {
        self.entries.get(id).map(|e| match &e.handle {
            NodeHandle::Source => 0,
            NodeHandle::Single(node) => node.warmup_period(),
            NodeHandle::Composite(node) => node.warmup_period(),
        })
    }

    pub fn dependencies(&self, id: &str) -> Option<&[String]> {
        self.entries.get(id).map(|e| e.dependencies.as_slice())
    }

    /// 直接依赖该节点的节点
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.order
            .iter()
            .filter(|other| {
                self.entries
                    .get(other.as_str())
                    .map(|e| e.dependencies.iter().any(|d| d == id))
                    .unwrap_or(false)
            })
            .map(String::as_str)
            .collect()
    }

    /// 按插入（拓扑）顺序列出所有 ID
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn sources(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.node_type(id) == Some(NodeType::Source))
            .map(String::as_str)
            .collect()
    }

    /// 按拓扑顺序读取每个节点的最新值
    pub fn snapshot(&self) -> Vec<(String, Option<f64>)> {
        self.order
            .iter()
            .map(|id| (id.clone(), self.last_value(id)))
            .collect()
    }

    /// 清空所有序列和指标状态，图结构保留
    pub fn reset(&self) {
        for id in &self.order {
            if let Some(entry) = self.entries.get(id) {
                match &entry.handle {
                    NodeHandle::Source => entry.series.clear(),
                    NodeHandle::Single(node) => node.reset(),
                    NodeHandle::Composite(node) => node.reset(),
                }
            }
        }
        log::debug!("[IndicatorGraph] reset {} nodes", self.order.len());
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn check_new(&self, id: &str) -> Result<()> {
        if self.entries.contains_key(id) {
            return Err(IndicatorError::InvalidConfiguration(format!(
                "Node already exists: {}",
                id
            )));
        }
        Ok(())
    }

    fn resolve(&self, node: &str, input: &str) -> Result<SeriesRef> {
        self.series(input).ok_or_else(|| {
            IndicatorError::InvalidConfiguration(format!(
                "Dependency {} not found for node {}",
                input, node
            ))
        })
    }

    fn source(&self, id: &str) -> Result<&SeriesRef> {
        match self.entries.get(id) {
            Some(GraphEntry {
                series,
                handle: NodeHandle::Source,
                ..
            }) => Ok(series),
            Some(_) => Err(IndicatorError::InvalidConfiguration(format!(
                "{} is not a source and cannot be fed directly",
                id
            ))),
            None => Err(IndicatorError::InvalidConfiguration(format!(
                "Node not found: {}",
                id
            ))),
        }
    }

    fn insert(
        &mut self,
        id: String,
        series: SeriesRef,
        dependencies: Vec<String>,
        handle: NodeHandle,
    ) {
        log::debug!(
            "[IndicatorGraph] add {} <- {:?}",
            id,
            dependencies
        );
        self.order.push(id.clone());
        self.entries.insert(
            id,
            GraphEntry {
                series,
                dependencies,
                handle,
            },
        );
    }
}

impl fmt::Debug for IndicatorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndicatorGraph")
            .field("nodes", &self.order)
            .finish()
    }
}
