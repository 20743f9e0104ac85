//! 可传播的追踪上下文及其文本编码
//!
//! `TraceContext` 是跨进程边界传递的追踪"接续令牌"，文本格式为
//! `version-traceid-parentid-flags`（2+32+16+2个十六进制字符，共55字符），
//! 与 W3C traceparent 头对齐。编解码按固定偏移进行，任何语言的接收方都
//! 应按定长字段解析，而不是单纯信任分隔符数量。

use crate::trace_id::{is_lower_hex, SpanId, TraceId};
use std::fmt;

/// 当前编码版本
const VERSION: u8 = 0x00;

/// 保留的无效版本字节
const VERSION_INVALID: u8 = 0xff;

/// 编码后的总长度：2 + 1 + 32 + 1 + 16 + 1 + 2
const ENCODED_LEN: usize = 55;

/// 追踪标志位（小型位集合）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// 采样标志：置位表示该追踪会被记录
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// 从原始字节构造标志位
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// 获取原始字节
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// 是否置位了采样标志
    #[inline]
    pub const fn is_sampled(&self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// 可传播的追踪上下文（构造后不可变）
///
/// `trace_id` 在整条分布式追踪中保持不变；`parent_span_id` 是产生该令牌的
/// 工作单元，下游以它作为父节点接续同一条逻辑追踪。
///
/// # 不变量
/// - `trace_id` 永不全为零
/// - 有效接续令牌的 `parent_span_id` 永不全为零
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext {
    version: u8,
    trace_id: TraceId,
    parent_span_id: SpanId,
    flags: TraceFlags,
}

impl TraceContext {
    /// 以当前编码版本构造追踪上下文
    pub fn new(trace_id: TraceId, parent_span_id: SpanId, flags: TraceFlags) -> Self {
        Self {
            version: VERSION,
            trace_id,
            parent_span_id,
            flags,
        }
    }

    /// 编码版本字节
    pub fn version(&self) -> u8 {
        self.version
    }

    /// 整条分布式追踪共享的追踪ID
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// 产生该令牌的工作单元ID（下游的父节点）
    pub fn parent_span_id(&self) -> &SpanId {
        &self.parent_span_id
    }

    /// 追踪标志位
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// 序列化为紧凑文本令牌
    ///
    /// 纯函数：只依赖自身字段，不读取任何全局状态。
    pub fn serialize(&self) -> String {
        format!(
            "{:02x}-{}-{}-{:02x}",
            self.version,
            self.trace_id,
            self.parent_span_id,
            self.flags.bits()
        )
    }

    /// 从文本令牌解析追踪上下文
    ///
    /// 按固定偏移解析而非按分隔符切分，以容忍未来的次要版本：除保留的
    /// 0xff 外，任何版本字节都按版本00的字段布局读取。
    ///
    /// 以下情况返回 None（绝不 panic）：
    /// - 总长度不是55
    /// - 分隔符位置不是 `-`
    /// - 任意字段包含非小写十六进制字符
    /// - 版本字节为保留值 0xff
    /// - `trace_id` 或 `parent_span_id` 全为零
    ///
    /// 调用方应把 None 与"没有上下文"同等对待，退回开启全新的根追踪。
    pub fn deserialize(s: &str) -> Option<TraceContext> {
        let bytes = s.as_bytes();
        if bytes.len() != ENCODED_LEN {
            return None;
        }

        // 多字节字符会让后续的定长切片落在字符边界之外
        if !bytes.is_ascii() {
            return None;
        }

        // 固定偏移：2/35/52 处必须是分隔符
        if bytes[2] != b'-' || bytes[35] != b'-' || bytes[52] != b'-' {
            return None;
        }

        let version = parse_hex_byte(&bytes[0..2])?;
        if version == VERSION_INVALID {
            return None;
        }

        let trace_id = TraceId::from_string_validated(&s[3..35])?;
        let parent_span_id = SpanId::from_string_validated(&s[36..52])?;
        let flags = parse_hex_byte(&bytes[53..55])?;

        Some(TraceContext {
            version,
            trace_id,
            parent_span_id,
            flags: TraceFlags::from_bits(flags),
        })
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

/// 解析两个小写十六进制字符为一个字节
#[inline]
fn parse_hex_byte(bytes: &[u8]) -> Option<u8> {
    if bytes.len() != 2 || !is_lower_hex(bytes) {
        return None;
    }
    Some((hex_val(bytes[0]) << 4) | hex_val(bytes[1]))
}

/// 单个小写十六进制字符的数值（调用前必须已通过 is_lower_hex 校验）
#[inline]
fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        _ => b - b'a' + 10,
    }
}
