//! 统一错误类型定义.
//!
//! 所有 Zhen crate 共用的错误类型, 支持跨模块传播.
//!
//! 错误分两类使用方式:
//! - 致命错误 (I/O 失败、内存耗尽、容器结构损坏): 直接通过 `?` 向上传播, 终止本次提取.
//! - 可恢复错误 (码流损坏、不支持的特性、参数集引用缺失): 由 NAL 调度器
//!   转换为错误计数, 超过预算才终止.

use thiserror::Error;

/// Zhen 框架统一错误类型
#[derive(Debug, Error)]
pub enum ZhenError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的特性 (非 IDR 切片, 未知 NAL 类型, 不支持的采样条目等)
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// 编解码器错误 (参数集引用完整性失败等)
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 容器格式错误 (MP4 box 大小/一致性违例)
    #[error("格式错误: {0}")]
    Format(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 无效数据 (损坏的码流, Exp-Golomb 溢出, RBSP 截断等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ZhenError {
    /// 是否为致命错误
    ///
    /// 致命错误终止整个提取流程; 非致命错误由调度器计入错误预算后继续.
    /// `Eof` 不算致命: 解析中途读尽只意味着当前采样截断.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::OutOfMemory(_) | Self::Format(_) | Self::Internal(_)
        )
    }
}

/// Zhen 框架统一 Result 类型
pub type ZhenResult<T> = Result<T, ZhenError>;
