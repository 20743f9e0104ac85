//! 错误类型定义
//!
//! 生命周期错误表示埋点代码自身的缺陷（例如重复结束同一个span），必须显式
//! 暴露给触发它的调用方；上游业务失败则以 `BoxError` 在流水线各步骤之间
//! 传递，只决定当次事务的结局，不会中断外层运行循环。

use thiserror::Error;

/// 流水线步骤的业务失败类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Span 生命周期错误
///
/// 与业务失败是两类事情：这类错误意味着埋点代码存在逻辑缺陷，
/// 不应被静默吞掉。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// 对已结束的 span 再次调用 end
    #[error("span `{name}` has already ended")]
    AlreadyEnded {
        /// 触发错误的 span 名称
        name: String,
    },

    /// 向已结束的 span 附加标签
    #[error("cannot attach label `{key}` to ended span `{name}`")]
    LabelAfterEnd {
        /// 触发错误的 span 名称
        name: String,
        /// 被拒绝的标签键
        key: String,
    },
}
