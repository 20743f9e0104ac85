//! Span 与事务模型
//!
//! 一个 span 是带起止时间的命名工作单元；事务是一条追踪在单个进程内的
//! 根 span。开启中的 span 由 `ActiveSpan` 句柄管理，结束后成为不可变的
//! 完成记录并交给上报器，任何 span 都不会在其所属事务之外存活。

use crate::error::LifecycleError;
use crate::reporter::SpanReporter;
use crate::trace_context::{TraceContext, TraceFlags};
use crate::trace_id::{SpanId, TraceId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// Span 的最终结局
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// 仍在进行中
    Pending,
    /// 正常完成
    Success,
    /// 以失败告终
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Pending => "pending",
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

/// Span 标签值：字符串、数字或布尔
#[derive(Clone, Debug, PartialEq)]
pub enum LabelValue {
    /// 字符串值
    String(String),
    /// 数字值
    Number(f64),
    /// 布尔值
    Bool(bool),
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::String(value.to_string())
    }
}

impl From<String> for LabelValue {
    fn from(value: String) -> Self {
        LabelValue::String(value)
    }
}

impl From<f64> for LabelValue {
    fn from(value: f64) -> Self {
        LabelValue::Number(value)
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        LabelValue::Number(value as f64)
    }
}

impl From<u64> for LabelValue {
    fn from(value: u64) -> Self {
        LabelValue::Number(value as f64)
    }
}

impl From<bool> for LabelValue {
    fn from(value: bool) -> Self {
        LabelValue::Bool(value)
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::String(v) => write!(f, "{v}"),
            LabelValue::Number(v) => write!(f, "{v}"),
            LabelValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// 一个已计时的工作单元记录
///
/// 事务即进程内的根 span（`is_transaction()` 为 true）；树中所有节点共享
/// 同一个 `trace_id`。结束前由 `ActiveSpan` 独占管理，结束后作为不可变的
/// 完成记录导出。
#[derive(Clone, Debug)]
pub struct Span {
    id: SpanId,
    trace_id: TraceId,
    parent_id: Option<SpanId>,
    name: String,
    kind: String,
    transaction: bool,
    flags: TraceFlags,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    outcome: Outcome,
    labels: HashMap<String, LabelValue>,
}

impl Span {
    fn start_now(
        name: impl Into<String>,
        kind: impl Into<String>,
        trace_id: TraceId,
        parent_id: Option<SpanId>,
        transaction: bool,
        flags: TraceFlags,
    ) -> Self {
        Self {
            id: SpanId::new(),
            trace_id,
            parent_id,
            name: name.into(),
            kind: kind.into(),
            transaction,
            flags,
            start_time: SystemTime::now(),
            end_time: None,
            outcome: Outcome::Pending,
            labels: HashMap::new(),
        }
    }

    /// 开启一个全新的根事务（生成新的 trace_id）
    pub(crate) fn new_root(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::start_now(
            name,
            kind,
            TraceId::new(),
            None,
            true,
            TraceFlags::SAMPLED,
        )
    }

    /// 开启接续远端上下文的事务
    ///
    /// trace_id 与标志位继承自令牌，父节点指向令牌中的 parent_span_id。
    pub(crate) fn new_continuing(
        name: impl Into<String>,
        kind: impl Into<String>,
        ctx: &TraceContext,
    ) -> Self {
        Self::start_now(
            name,
            kind,
            ctx.trace_id().clone(),
            Some(ctx.parent_span_id().clone()),
            true,
            ctx.flags(),
        )
    }

    /// 在开启中的父 span 下开启本地子 span
    pub(crate) fn new_child_of(
        parent: &ActiveSpan,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        let (trace_id, parent_id, flags) = {
            let state = parent.lock();
            (state.trace_id.clone(), state.id.clone(), state.flags)
        };
        Self::start_now(name, kind, trace_id, Some(parent_id), false, flags)
    }

    /// Span ID
    pub fn id(&self) -> &SpanId {
        &self.id
    }

    /// 所属追踪的ID
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// 父节点ID；全新根事务为 None
    pub fn parent_id(&self) -> Option<&SpanId> {
        self.parent_id.as_ref()
    }

    /// Span 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 类别标签（自由形式）
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// 是否为事务（本进程内的根 span）
    pub fn is_transaction(&self) -> bool {
        self.transaction
    }

    /// 追踪标志位
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// 开始时间
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// 结束时间；开启中为 None
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// 最终结局
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// 标签集合
    pub fn labels(&self) -> &HashMap<String, LabelValue> {
        &self.labels
    }

    /// 是否已结束
    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// 持续时长；尚未结束或时钟回拨时为 None
    pub fn duration(&self) -> Option<Duration> {
        self.end_time
            .and_then(|end| end.duration_since(self.start_time).ok())
    }
}

/// 开启中的 span 句柄
///
/// 可克隆（内部共享同一状态）。结束时把完成记录交给上报器；此后句柄上的
/// 修改操作一律返回 [`LifecycleError`]，重复结束不会被静默忽略。
#[derive(Clone)]
pub struct ActiveSpan {
    state: Arc<Mutex<Span>>,
    reporter: Arc<dyn SpanReporter>,
}

impl ActiveSpan {
    /// 把刚构造的 span 纳入句柄管理
    pub(crate) fn start(span: Span, reporter: Arc<dyn SpanReporter>) -> Self {
        Self {
            state: Arc::new(Mutex::new(span)),
            reporter,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Span> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Span ID
    pub fn id(&self) -> SpanId {
        self.lock().id.clone()
    }

    /// 所属追踪的ID
    pub fn trace_id(&self) -> TraceId {
        self.lock().trace_id.clone()
    }

    /// Span 名称
    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// 是否为事务
    pub fn is_transaction(&self) -> bool {
        self.lock().transaction
    }

    /// 快照当前 span 为可传播的上下文
    ///
    /// 本 span 的ID成为令牌中的 parent_span_id：下游若接续该令牌，
    /// 会精确挂到这里的交接点之下。
    pub fn context(&self) -> TraceContext {
        let state = self.lock();
        TraceContext::new(state.trace_id.clone(), state.id.clone(), state.flags)
    }

    /// 向开启中的 span 附加标签
    ///
    /// span 已结束时返回 [`LifecycleError::LabelAfterEnd`]。
    pub fn set_label(
        &self,
        key: impl Into<String>,
        value: impl Into<LabelValue>,
    ) -> Result<(), LifecycleError> {
        let key = key.into();
        let mut state = self.lock();
        if state.end_time.is_some() {
            return Err(LifecycleError::LabelAfterEnd {
                name: state.name.clone(),
                key,
            });
        }
        state.labels.insert(key, value.into());
        Ok(())
    }

    /// 结束该 span 并把完成记录交给上报器
    ///
    /// 幂等保护：重复结束返回 [`LifecycleError::AlreadyEnded`]——这说明
    /// 埋点代码存在生命周期缺陷，不应被静默吞掉。
    pub fn end(&self, outcome: Outcome) -> Result<(), LifecycleError> {
        let record = {
            let mut state = self.lock();
            if state.end_time.is_some() {
                return Err(LifecycleError::AlreadyEnded {
                    name: state.name.clone(),
                });
            }
            state.end_time = Some(SystemTime::now());
            state.outcome = outcome;
            state.clone()
        };
        self.reporter.report(&record);
        Ok(())
    }
}
