//! 消费侧埋点：提取上下文、接续事务、处理消息
//!
//! 每条消息对应恰好一个事务：入站元数据中携带有效令牌时接续远端追踪，
//! 缺失或无法解析时静默退回全新的根事务。一条坏消息绝不中断消费循环。

use super::producer::Transform;
use crate::error::BoxError;
use crate::messaging::{Headers, Message, MessageConsumer, QueueError};
use crate::trace_context::TraceContext;
use crate::tracer::Tracer;
use crate::TRACEPARENT_HEADER;
use std::future::Future;
use tokio::sync::watch;

/// 默认事务名
const DEFAULT_TRANSACTION_NAME: &str = "process-message";
/// 事务类别
const TRANSACTION_KIND: &str = "messaging";
/// transform 步骤类别
const TRANSFORM_KIND: &str = "data";
/// store 步骤类别
const STORE_KIND: &str = "db";

/// 下游数据落地（真实系统中的数据库写入等）
///
/// 以策略接口的形式注入，测试可以替换为确定性的替身。
pub trait DataSink: Send {
    /// 落地一批处理完成的数据
    fn store(&mut self, data: Vec<u8>) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// 从入站消息元数据中提取追踪上下文
///
/// 按不区分大小写的 [`TRACEPARENT_HEADER`] 键查找。值缺失、不是合法
/// UTF-8 或令牌无法解析时返回 None，调用方应视作"没有入站上下文"并
/// 开启全新的根事务——绝不让坏令牌中断消费。
pub fn incoming_context(headers: &Headers) -> Option<TraceContext> {
    let raw = headers.get_str(TRACEPARENT_HEADER)?;
    let ctx = TraceContext::deserialize(raw);
    if ctx.is_none() {
        // 静默回退策略：只留一条调试级别的痕迹
        tracing::debug!(raw, "discarding unparseable traceparent header");
    }
    ctx
}

/// 消费侧工作器
///
/// 阻塞式拉取：一条消息被完整处理（包括其全部子 span）之后才拉取下一条。
pub struct ConsumerWorker<C, T, K> {
    tracer: Tracer,
    consumer: C,
    transform: T,
    sink: K,
    transaction_name: String,
}

impl<C, T, K> ConsumerWorker<C, T, K>
where
    C: MessageConsumer,
    T: Transform,
    K: DataSink,
{
    /// 创建消费侧工作器
    pub fn new(tracer: Tracer, consumer: C, transform: T, sink: K) -> Self {
        Self {
            tracer,
            consumer,
            transform,
            sink,
            transaction_name: DEFAULT_TRANSACTION_NAME.to_string(),
        }
    }

    /// 自定义事务名
    pub fn with_transaction_name(mut self, name: impl Into<String>) -> Self {
        self.transaction_name = name.into();
        self
    }

    /// 运行消费循环
    ///
    /// shutdown 信号只在消息之间被检查：正在处理的消息总是完整结束
    /// （包括结束其事务）。队列断开时循环退出；其余消费错误被记录后
    /// 继续拉取。
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) {
        tracing::info!("consumer worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.consumer.consume().await {
                Ok(message) => self.process(message).await,
                Err(QueueError::Disconnected) => {
                    tracing::info!("queue disconnected, stopping consumer");
                    break;
                }
                Err(err) => {
                    tracing::error!(error = %err, "consume failed");
                }
            }
        }

        tracing::info!("consumer worker stopped");
    }

    /// 处理单条消息（对应恰好一个事务）
    ///
    /// 处理失败把事务记为 Failure 并写日志；错误到此为止，调用方的循环
    /// 继续处理下一条消息。
    pub async fn process(&mut self, message: Message) {
        let incoming = incoming_context(&message.headers);
        let offset = message.offset;
        let payload = message.payload;

        let Self {
            tracer,
            transform,
            sink,
            transaction_name,
            ..
        } = self;
        let tracer = &*tracer;

        let result: Result<(), BoxError> = tracer
            .capture_transaction(
                transaction_name.clone(),
                TRANSACTION_KIND,
                incoming,
                async move {
                    tracing::info!(offset, "received message");
                    let data = tracer
                        .capture_span("transform", TRANSFORM_KIND, transform.apply(payload))
                        .await?;
                    tracer
                        .capture_span("store", STORE_KIND, sink.store(data))
                        .await
                },
            )
            .await;

        if let Err(err) = result {
            // 一条坏消息只影响它自己的事务
            tracing::error!(offset, error = %err, "message processing failed");
        }
    }
}
