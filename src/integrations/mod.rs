//! 消息队列埋点集成
//!
//! 生产侧与消费侧的流水线封装：以一个事务包裹一次完整周期，各处理步骤
//! 作为带固定类别标签的子 span，并通过消息元数据完成追踪上下文的注入与
//! 提取。

mod consumer;
mod producer;

pub use consumer::{incoming_context, ConsumerWorker, DataSink};
pub use producer::{DataSource, ProducerWorker, Transform};
