//! 进程级追踪器
//!
//! 负责开启事务与span、维护流内的当前工作单元、并为出站消息提供可传播的
//! 上下文快照。事务的结束点唯一：body 完成后按其结果确定结局——无论哪一步
//! 失败，事务都恰好结束一次，错误在记录后原样向调用方传播。

use crate::context;
use crate::reporter::{LogReporter, SpanReporter};
use crate::span::{ActiveSpan, Outcome, Span};
use crate::trace_context::TraceContext;
use std::future::Future;
use std::sync::Arc;

/// 追踪器
///
/// 内部为 Arc，克隆开销低，可在各个工作流之间自由共享。
#[derive(Clone)]
pub struct Tracer {
    reporter: Arc<dyn SpanReporter>,
}

impl Tracer {
    /// 使用指定上报器创建追踪器
    pub fn new(reporter: Arc<dyn SpanReporter>) -> Self {
        Self { reporter }
    }

    /// 使用默认的结构化日志上报器创建追踪器
    pub fn with_log_reporter() -> Self {
        Self::new(Arc::new(LogReporter))
    }

    /// 开启一个事务并在其作用域内执行 body
    ///
    /// `incoming` 为成功解码的令牌时，接续远端追踪：trace_id 与标志位取自
    /// 令牌，事务的父节点指向令牌中的 parent_span_id。为 None 时开启全新的
    /// 根事务（生成独立的 trace_id）。调用方应把无法解码的令牌折叠为 None，
    /// 绝不让坏令牌传播出坏的父链接。
    ///
    /// body 是惰性的：它在事务作用域内被轮询，其中的嵌套埋点调用都能看到
    /// 该事务。body 正常返回 → 事务以 Success 结束；返回错误 → 以 Failure
    /// 结束，错误在记录后原样向调用方传播。
    pub async fn capture_transaction<T, E, Fut>(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        incoming: Option<TraceContext>,
        body: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let span = match incoming {
            Some(ctx) => Span::new_continuing(name, kind, &ctx),
            None => Span::new_root(name, kind),
        };
        let handle = ActiveSpan::start(span, Arc::clone(&self.reporter));

        let result = context::with_span(handle.clone(), body).await;

        // 唯一的事务结束点；body 内部手动结束属于生命周期缺陷，在此显式暴露
        let outcome = if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        if let Err(err) = handle.end(outcome) {
            tracing::error!(error = %err, "transaction was already ended inside its own body");
        }

        result
    }

    /// 在当前工作单元下开启一个子 span 并执行 body
    ///
    /// 子 span 的 trace_id 与父节点直接取自当前流内最内层开启中的 span。
    /// 当前流内没有开启中的事务时退化为直通：照常执行 body，不记录任何
    /// 内容也绝不报错，因此埋点调用可以安全地留在可能脱离追踪流程运行的
    /// 代码路径上。
    pub async fn capture_span<T, E, Fut>(
        &self,
        name: impl Into<String>,
        kind: impl Into<String>,
        body: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(parent) = context::current_span() else {
            return body.await;
        };

        let span = Span::new_child_of(&parent, name, kind);
        let handle = ActiveSpan::start(span, Arc::clone(&self.reporter));

        let result = context::with_span(handle.clone(), body).await;

        let outcome = if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        if let Err(err) = handle.end(outcome) {
            tracing::error!(error = %err, "span was already ended inside its own body");
        }

        result
    }

    /// 快照当前流内最内层开启中的 span 为可传播的上下文
    ///
    /// 反映的是最内层 span 而非根事务：生产者在交接点内调用时，下游接续的
    /// 令牌会精确地穿回交接处。不在追踪作用域内时返回 None。
    pub fn current_context(&self) -> Option<TraceContext> {
        context::current_context()
    }

    /// 获取当前流内最内层开启中的 span 句柄（用于附加标签等）
    pub fn current_span(&self) -> Option<ActiveSpan> {
        context::current_span()
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::with_log_reporter()
    }
}
