//! 轻量级分布式追踪与跨消息队列的上下文传播
//!
//! 生产者在一次被追踪的工作周期内，把当前追踪上下文序列化进出站消息的
//! 元数据；另一个进程中的消费者从元数据中提取令牌并接续同一条逻辑追踪，
//! 即使两端没有共享内存或调用栈。核心与Web框架及具体消息中间件无关，
//! 只消费 produce/consume 契约和一个 span 上报契约。
//!
//! ## Usage
//!
//! ### 基础用法：上下文令牌的编码与解码
//! ```
//! use trace_link::TraceContext;
//!
//! let token = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
//! let ctx = TraceContext::deserialize(token).expect("valid traceparent");
//! assert_eq!(ctx.serialize(), token);
//!
//! // 无法解析的令牌等同于"没有上下文"，调用方据此退回全新的根追踪
//! assert!(TraceContext::deserialize("garbage").is_none());
//! ```
//!
//! ### 事务与span
//! ```
//! use std::sync::Arc;
//! use trace_link::{BoxError, MemoryReporter, Tracer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let reporter = Arc::new(MemoryReporter::new());
//! let tracer = Tracer::new(reporter.clone());
//!
//! let result: Result<u32, BoxError> = tracer
//!     .capture_transaction("ingest-cycle", "ingestion", None, async {
//!         tracer
//!             .capture_span("fetch", "external", async { Ok(42) })
//!             .await
//!     })
//!     .await;
//!
//! assert_eq!(result.unwrap(), 42);
//! assert_eq!(reporter.spans().len(), 2);
//! # }
//! ```
//!
//! ### 跨队列传播
//! ```no_run
//! use tokio::sync::watch;
//! use trace_link::{in_memory_queue, ConsumerWorker, ProducerWorker, Tracer};
//! # use trace_link::{BoxError, DataSink, DataSource, Transform};
//! # struct Source;
//! # impl DataSource for Source {
//! #     async fn fetch(&mut self) -> Result<Vec<u8>, BoxError> { Ok(vec![]) }
//! # }
//! # struct Pass;
//! # impl Transform for Pass {
//! #     async fn apply(&mut self, data: Vec<u8>) -> Result<Vec<u8>, BoxError> { Ok(data) }
//! # }
//! # struct Sink;
//! # impl DataSink for Sink {
//! #     async fn store(&mut self, _data: Vec<u8>) -> Result<(), BoxError> { Ok(()) }
//! # }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (queue_tx, queue_rx) = in_memory_queue("my-topic", 64);
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let mut producer = ProducerWorker::new(Tracer::default(), Source, Pass, queue_tx, "my-topic");
//! let mut consumer = ConsumerWorker::new(Tracer::default(), queue_rx, Pass, Sink);
//!
//! tokio::join!(producer.run(shutdown_rx.clone()), consumer.run(shutdown_rx));
//! # }
//! ```

mod context;
mod error;
mod integrations;
mod messaging;
mod reporter;
mod span;
mod trace_context;
mod trace_id;
mod tracer;

pub use context::current_context;
pub use error::{BoxError, LifecycleError};
pub use integrations::{
    incoming_context, ConsumerWorker, DataSink, DataSource, ProducerWorker, Transform,
};
pub use messaging::{
    in_memory_queue, ChannelConsumer, ChannelProducer, Delivery, Headers, Message,
    MessageConsumer, MessageProducer, QueueError,
};
pub use reporter::{LogReporter, MemoryReporter, SpanReporter};
pub use span::{ActiveSpan, LabelValue, Outcome, Span};
pub use trace_context::{TraceContext, TraceFlags};
pub use trace_id::{SpanId, TraceId};
pub use tracer::Tracer;

/// 消息元数据中携带追踪上下文的 header 键（不区分大小写）
pub const TRACEPARENT_HEADER: &str = "traceparent";
