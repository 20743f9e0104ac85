//! 当前工作单元的流内上下文管理
//!
//! 使用 `tokio::task_local` 按逻辑流隔离"当前span"状态：并发流之间绝不
//! 共享，嵌套作用域退出时自动恢复外层。这里绝不使用进程级可变全局量，
//! 否则并发流会互相污染各自的追踪树。

use crate::span::ActiveSpan;
use crate::trace_context::TraceContext;
use std::future::Future;
use tokio::task_local;

// 使用tokio的task_local来存储当前流内最内层开启中的span
task_local! {
    static CURRENT_SPAN: ActiveSpan;
}

/// 获取当前流内最内层开启中的 span
///
/// 不在任何追踪作用域内时返回 None，调用方应按"没有追踪上下文"处理——
/// 这不是错误。
pub(crate) fn current_span() -> Option<ActiveSpan> {
    CURRENT_SPAN.try_with(|span| span.clone()).ok()
}

/// 快照当前流内最内层开启中的 span 为可传播的上下文
///
/// 事务开启期间随时可调用；反映的是最内层 span 而非根事务，因此下游
/// 接续时会精确挂到交接点之下。不在追踪作用域内时返回 None。
pub fn current_context() -> Option<TraceContext> {
    current_span().map(|span| span.context())
}

/// 以指定 span 作为当前上下文执行异步操作
///
/// # 参数
/// * `span` - 要设为当前的 span 句柄
/// * `future` - 要执行的异步操作
///
/// # 返回
/// 异步操作的结果
pub(crate) async fn with_span<F>(span: ActiveSpan, future: F) -> F::Output
where
    F: Future,
{
    CURRENT_SPAN.scope(span, future).await
}
