//! 生产侧埋点：fetch → transform → enqueue 周期
//!
//! 一个事务覆盖整个周期；三个步骤各自是带固定类别标签的子 span。入队前
//! 把当前上下文序列化后作为 traceparent 元数据附加到出站消息上——注入
//! 恰好发生一次，且任何前置步骤失败都不会入队任何消息。

use crate::error::BoxError;
use crate::messaging::{Delivery, Headers, MessageProducer};
use crate::tracer::Tracer;
use crate::TRACEPARENT_HEADER;
use std::future::Future;
use tokio::sync::watch;

/// 默认事务名
const DEFAULT_TRANSACTION_NAME: &str = "ingest-cycle";
/// 事务类别
const TRANSACTION_KIND: &str = "ingestion";
/// fetch 步骤类别（上游外部调用）
const FETCH_KIND: &str = "external";
/// transform 步骤类别
const TRANSFORM_KIND: &str = "data";
/// enqueue 步骤类别
const ENQUEUE_KIND: &str = "messaging";

/// 上游数据源（真实系统中的 HTTP 拉取等）
///
/// 以策略接口的形式注入，测试可以替换为确定性的替身。
pub trait DataSource: Send {
    /// 拉取一批待发送的数据
    fn fetch(&mut self) -> impl Future<Output = Result<Vec<u8>, BoxError>> + Send;
}

/// 数据校验/变换步骤
pub trait Transform: Send {
    /// 校验并变换一批数据
    fn apply(&mut self, data: Vec<u8>) -> impl Future<Output = Result<Vec<u8>, BoxError>> + Send;
}

/// 生产侧工作器
///
/// 把一次"拉取 → 变换 → 入队"周期包裹成一个事务。
pub struct ProducerWorker<S, T, P> {
    tracer: Tracer,
    source: S,
    transform: T,
    producer: P,
    topic: String,
    transaction_name: String,
}

impl<S, T, P> ProducerWorker<S, T, P>
where
    S: DataSource,
    T: Transform,
    P: MessageProducer,
{
    /// 创建生产侧工作器
    pub fn new(
        tracer: Tracer,
        source: S,
        transform: T,
        producer: P,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            tracer,
            source,
            transform,
            producer,
            topic: topic.into(),
            transaction_name: DEFAULT_TRANSACTION_NAME.to_string(),
        }
    }

    /// 自定义事务名
    pub fn with_transaction_name(mut self, name: impl Into<String>) -> Self {
        self.transaction_name = name.into();
        self
    }

    /// 运行生产循环，直到 shutdown 信号置位
    ///
    /// 信号只在周期之间被检查：进行中的周期总是完整结束（包括结束其
    /// 事务）。单个周期的失败被记录后循环继续。
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, "producer worker started");

        while !*shutdown.borrow() {
            if let Err(err) = self.run_cycle().await {
                tracing::error!(error = %err, "producer cycle failed");
            }
        }

        tracing::info!(topic = %self.topic, "producer worker stopped");
    }

    /// 执行一次 fetch → transform → enqueue 周期
    ///
    /// fetch 或 transform 失败时事务以 Failure 结束，绝不入队消息——
    /// 残缺的负载永远不会被发送出去。
    pub async fn run_cycle(&mut self) -> Result<Delivery, BoxError> {
        let Self {
            tracer,
            source,
            transform,
            producer,
            topic,
            transaction_name,
        } = self;
        let tracer = &*tracer;

        tracer
            .capture_transaction(transaction_name.clone(), TRANSACTION_KIND, None, async move {
                let data = tracer
                    .capture_span("fetch", FETCH_KIND, source.fetch())
                    .await?;
                let data = tracer
                    .capture_span("transform", TRANSFORM_KIND, transform.apply(data))
                    .await?;
                tracer
                    .capture_span("enqueue", ENQUEUE_KIND, async move {
                        let mut headers = Headers::new();
                        // 恰好一次注入：最内层开启中的 span（本 enqueue span）
                        // 成为下游接续时的父节点
                        if let Some(ctx) = tracer.current_context() {
                            headers.insert(TRACEPARENT_HEADER, ctx.serialize().into_bytes());
                        }
                        let delivery = producer.produce(topic, data, headers).await?;
                        tracing::info!(
                            topic = %delivery.topic,
                            offset = delivery.offset,
                            "delivered message"
                        );
                        Ok(delivery)
                    })
                    .await
            })
            .await
    }
}
