//! Span 上报器：核心与日志/观测协作方之间的接缝
//!
//! 核心只依赖 `SpanReporter` 契约，不绑定任何具体 sink。默认实现把完成
//! 记录作为结构化日志事件输出；内存实现用于测试替身。

use crate::span::Span;
use std::sync::{Mutex, PoisonError};

/// 完成记录的接收方（日志/观测协作方）
pub trait SpanReporter: Send + Sync {
    /// 接收一条已结束的 span 完成记录
    fn report(&self, span: &Span);
}

/// 把完成记录作为结构化日志事件输出的默认上报器
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl SpanReporter for LogReporter {
    fn report(&self, span: &Span) {
        let duration_us = span
            .duration()
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        let parent_id = span.parent_id().map_or("", |id| id.as_str());
        if span.is_transaction() {
            tracing::info!(
                trace_id = %span.trace_id(),
                transaction_id = %span.id(),
                parent_id,
                name = %span.name(),
                kind = %span.kind(),
                outcome = %span.outcome(),
                duration_us,
                "transaction ended"
            );
        } else {
            tracing::info!(
                trace_id = %span.trace_id(),
                span_id = %span.id(),
                parent_id,
                name = %span.name(),
                kind = %span.kind(),
                outcome = %span.outcome(),
                duration_us,
                "span ended"
            );
        }
    }
}

/// 把完成记录收集到内存中的上报器
///
/// 测试用替身：用于对上报的 span 树做确定性断言。
#[derive(Debug, Default)]
pub struct MemoryReporter {
    spans: Mutex<Vec<Span>>,
}

impl MemoryReporter {
    /// 创建空的内存上报器
    pub fn new() -> Self {
        Self::default()
    }

    /// 复制出目前收集到的全部完成记录
    pub fn spans(&self) -> Vec<Span> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 取走目前收集到的全部完成记录
    pub fn take(&self) -> Vec<Span> {
        std::mem::take(&mut *self.spans.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl SpanReporter for MemoryReporter {
    fn report(&self, span: &Span) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span.clone());
    }
}
