//! 追踪标识符：TraceId 与 SpanId
//!
//! TraceId 标识一条跨进程的完整分布式追踪，SpanId 标识进程内的单个工作单元。
//! 两者均为定长小写十六进制字符串，与 W3C TraceContext 规范对齐。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// 高性能追踪ID生成器
///
/// 使用时间戳 + 原子计数器的组合，生成符合W3C TraceContext规范的128位ID
static COUNTER: AtomicU64 = AtomicU64::new(0);

/// 机器ID，基于进程ID和启动时间戳生成，确保不同进程/实例的ID不冲突
static MACHINE_ID: LazyLock<u16> = LazyLock::new(|| {
    let pid = std::process::id();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32;
    ((pid ^ timestamp) & 0xFFFF) as u16
});

/// 高性能字节级十六进制字符验证
///
/// 使用字节比较避免Unicode处理开销
#[inline]
pub(crate) fn is_lower_hex(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .all(|&b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// 追踪ID结构体（128位，32个小写十六进制字符）
///
/// 在整条分布式追踪的所有节点间保持不变。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    /// 获取机器ID
    #[inline]
    fn get_machine_id() -> u16 {
        *MACHINE_ID
    }

    /// 生成新的追踪ID（符合 W3C TraceContext 规范）
    ///
    /// 使用时间戳+计数器+机器ID+随机数的组合，生成32字符的小写十六进制ID。
    /// 时间戳部分保证了生成的ID永远不会全为零。
    ///
    /// # 返回
    /// 新生成的追踪ID
    #[inline]
    pub fn new() -> Self {
        // 获取当前时间戳（毫秒级）
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
        let machine_id = Self::get_machine_id();

        // 构造128位ID：timestamp(48位) + machine_id(16位) + counter(32位) + random(32位)
        let random_part = fastrand::u32(..);

        let high_64 = ((timestamp & 0xFFFFFFFFFFFF) << 16) | (machine_id as u64);
        let low_64 = (counter & 0xFFFFFFFF) << 32 | (random_part as u64);

        // 转换为32字符的小写十六进制字符串
        let id = format!("{high_64:016x}{low_64:016x}");
        Self(id)
    }

    /// 从字符串创建追踪ID，并进行 W3C TraceContext 规范校验
    ///
    /// # 校验规则
    /// - 长度必须是 32 个字符
    /// - 只能包含小写十六进制字符（0-9, a-f）
    /// - 不能全为零
    ///
    /// # 返回
    /// 如果格式有效则返回Some(TraceId)，否则返回None
    #[inline]
    pub fn from_string_validated(id: &str) -> Option<Self> {
        if id.len() != 32 {
            return None;
        }

        if !is_lower_hex(id.as_bytes()) {
            return None;
        }

        // 不能全为零
        if id == "00000000000000000000000000000000" {
            return None;
        }

        Some(Self(id.to_string()))
    }

    /// 获取追踪ID字符串
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Span ID结构体（64位，16个小写十六进制字符）
///
/// 随机生成，在进程生命周期内以压倒性概率保持唯一。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanId(String);

impl SpanId {
    /// 生成新的Span ID
    ///
    /// 随机数范围从1开始，保证生成的ID永远不会全为零。
    #[inline]
    pub fn new() -> Self {
        let raw = fastrand::u64(1..);
        Self(format!("{raw:016x}"))
    }

    /// 从字符串创建Span ID，并进行格式校验
    ///
    /// # 校验规则
    /// - 长度必须是 16 个字符
    /// - 只能包含小写十六进制字符（0-9, a-f）
    /// - 不能全为零（全零的 parent id 不构成有效的接续令牌）
    #[inline]
    pub fn from_string_validated(id: &str) -> Option<Self> {
        if id.len() != 16 {
            return None;
        }

        if !is_lower_hex(id.as_bytes()) {
            return None;
        }

        if id == "0000000000000000" {
            return None;
        }

        Some(Self(id.to_string()))
    }

    /// 获取Span ID字符串
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::new()
    }
}
