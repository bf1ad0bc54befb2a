//! 编解码器标识符.
//!
//! 为容器中可能出现的每种编解码算法分配唯一标识, 与容器格式无关.
//! 缩略图提取只解码 H.264, 其余标识用于轨道识别与日志.

use std::fmt;
use zhen_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC / MPEG-4 Part 10
    H264,
    /// H.265 / HEVC
    H265,
    /// MPEG-4 Part 2 (ASP)
    Mpeg4,
    /// Motion JPEG
    Mjpeg,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC (Advanced Audio Coding)
    Aac,
    /// MP3 (MPEG Audio Layer III)
    Mp3,
    /// AC-3 (Dolby Digital)
    Ac3,
    /// Opus
    Opus,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::None => MediaType::Data,
            Self::H264 | Self::H265 | Self::Mpeg4 | Self::Mjpeg => MediaType::Video,
            Self::Aac | Self::Mp3 | Self::Ac3 | Self::Opus => MediaType::Audio,
        }
    }

    /// 获取编解码器的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Mpeg4 => "mpeg4",
            Self::Mjpeg => "mjpeg",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Ac3 => "ac3",
            Self::Opus => "opus",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
