//! 消息队列协作方契约与进程内通道实现
//!
//! 核心只消费 `produce(topic, payload, headers)` / `consume()` 契约；
//! 投递可靠性、重试与分区语义由真实的消息中间件负责，不在本 crate 范围内。
//! 进程内的 mpsc 通道实现作为真实中间件的替身，供测试与演示使用。

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// 消息元数据（header）集合
///
/// 键不区分大小写，值为原始字节；写入同名键时旧值被替换。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, Vec<u8>)>);

impl Headers {
    /// 创建空的 header 集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个 header；同名键（不区分大小写）被替换
    pub fn insert(&mut self, key: impl Into<String>, value: Vec<u8>) {
        let key = key.into();
        if let Some(entry) = self
            .0
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// 不区分大小写地读取 header 值
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_slice())
    }

    /// 读取并按 UTF-8 解码 header 值；值不是合法 UTF-8 时返回 None
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// header 数量
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 遍历全部键值对
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// 一条入站消息
#[derive(Clone, Debug)]
pub struct Message {
    /// 消息负载
    pub payload: Vec<u8>,
    /// 消息元数据
    pub headers: Headers,
    /// 队列内的位置
    pub offset: u64,
}

/// 出站投递结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// 投递到的主题
    pub topic: String,
    /// 投递后的位置
    pub offset: u64,
}

/// 队列传输层错误
#[derive(Debug, Error)]
pub enum QueueError {
    /// 目标队列已关闭，消息未被接收
    #[error("queue `{topic}` is closed")]
    Closed {
        /// 目标主题
        topic: String,
    },

    /// 生产端已全部断开，不会再有新消息
    #[error("queue is disconnected")]
    Disconnected,

    /// 生产者没有绑定到该主题
    #[error("unknown topic `{topic}`")]
    UnknownTopic {
        /// 请求的主题
        topic: String,
    },
}

/// 出站消息生产者契约
///
/// produce 可能失败；失败必须以错误形式暴露，生产侧埋点据此把事务记为
/// Failure。
pub trait MessageProducer: Send + Sync {
    /// 向指定主题投递一条带元数据的消息
    fn produce(
        &self,
        topic: &str,
        payload: Vec<u8>,
        headers: Headers,
    ) -> impl Future<Output = Result<Delivery, QueueError>> + Send;
}

/// 入站消息消费者契约
///
/// 阻塞式拉取，一次返回一条消息；生产端全部断开后返回
/// [`QueueError::Disconnected`]。
pub trait MessageConsumer: Send {
    /// 拉取下一条消息
    fn consume(&mut self) -> impl Future<Output = Result<Message, QueueError>> + Send;
}

/// 创建进程内消息队列（tokio mpsc 通道实现）
///
/// offset 从0开始单调递增；克隆出的多个生产者共享同一 offset 计数。
pub fn in_memory_queue(
    topic: impl Into<String>,
    capacity: usize,
) -> (ChannelProducer, ChannelConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    let producer = ChannelProducer {
        topic: topic.into(),
        tx,
        next_offset: Arc::new(AtomicU64::new(0)),
    };
    (producer, ChannelConsumer { rx })
}

/// 基于 tokio mpsc 的进程内生产者
#[derive(Clone)]
pub struct ChannelProducer {
    topic: String,
    tx: mpsc::Sender<Message>,
    next_offset: Arc<AtomicU64>,
}

impl MessageProducer for ChannelProducer {
    async fn produce(
        &self,
        topic: &str,
        payload: Vec<u8>,
        headers: Headers,
    ) -> Result<Delivery, QueueError> {
        if topic != self.topic {
            return Err(QueueError::UnknownTopic {
                topic: topic.to_string(),
            });
        }

        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed);
        let message = Message {
            payload,
            headers,
            offset,
        };
        self.tx.send(message).await.map_err(|_| QueueError::Closed {
            topic: topic.to_string(),
        })?;

        Ok(Delivery {
            topic: topic.to_string(),
            offset,
        })
    }
}

/// 基于 tokio mpsc 的进程内消费者
pub struct ChannelConsumer {
    rx: mpsc::Receiver<Message>,
}

impl MessageConsumer for ChannelConsumer {
    async fn consume(&mut self) -> Result<Message, QueueError> {
        self.rx.recv().await.ok_or(QueueError::Disconnected)
    }
}
