//! 采样映射 (Sample Map).
//!
//! 一条基本流的完整编码采样索引: 每个采样记录它在文件中的
//! `(offset, size)` 字节区间、采样子类型与时间戳.
//! 由解封装器构建, 经 IDR 筛选器裁剪, 最终由位流喂入器按序读取.
//!
//! 对 AVC 轨道, 容器带内的 SPS/PPS 会以伪采样的形式放在映射最前面,
//! 保证参数集先于任何切片被解码.

use bytes::Bytes;
use zhen_core::{MediaType, Rational, ZhenResult};

use crate::codec_id::CodecId;

/// 采样子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleKind {
    /// avcC 带内 SPS 伪采样
    AvcSps,
    /// avcC 带内 PPS 伪采样
    AvcPps,
    /// IDR 关键帧采样 (同步点)
    VideoIdr,
    /// 非关键帧视频采样
    Video,
    /// 音频采样
    Audio,
    /// 其他 (字幕, 数据等)
    Other,
}

impl SampleKind {
    /// 是否为 IDR 关键帧
    pub const fn is_idr(&self) -> bool {
        matches!(self, Self::VideoIdr)
    }

    /// 是否为参数集伪采样
    pub const fn is_parameter_set(&self) -> bool {
        matches!(self, Self::AvcSps | Self::AvcPps)
    }
}

/// 单个采样的索引信息
///
/// 描述输入文件中 `[offset, offset + size)` 的一段连续字节区间.
#[derive(Debug, Clone, Copy)]
pub struct SampleInfo {
    /// 采样子类型
    pub kind: SampleKind,
    /// 文件内绝对字节偏移
    pub offset: u64,
    /// 字节大小
    pub size: u32,
    /// 显示时间戳 (以轨道 time_base 为单位)
    pub pts: i64,
    /// 解码时间戳 (以轨道 time_base 为单位)
    pub dts: i64,
}

/// 一条基本流的采样映射
///
/// 采样按解码顺序存放. 不变式:
/// - `sample_count_idr() <= sample_count()`
/// - IDR 采样的下标可以从 `kind` 恢复
/// - 偏移只在同一 chunk 内保证单调不减, 全局不保证
#[derive(Debug, Clone)]
pub struct SampleMap {
    /// 基本流类型
    pub stream_type: MediaType,
    /// 基本流编解码器
    pub stream_codec: CodecId,
    /// 采样是否与访问单元对齐 (每个采样恰好一个 AU)
    pub sample_alignment: bool,
    /// AVCC 长度前缀字节数 (来自 avcC lengthSizeMinusOne + 1)
    pub nal_length_size: usize,
    /// 轨道时间基
    pub time_base: Rational,
    /// 采样序列 (解码顺序)
    samples: Vec<SampleInfo>,
    /// IDR 采样计数
    idr_count: u32,
}

impl SampleMap {
    /// 创建空的采样映射
    pub fn new(stream_type: MediaType, stream_codec: CodecId, time_base: Rational) -> Self {
        Self {
            stream_type,
            stream_codec,
            sample_alignment: false,
            nal_length_size: 4,
            time_base,
            samples: Vec::new(),
            idr_count: 0,
        }
    }

    /// 追加一个采样, 同步维护 IDR 计数
    pub fn push(&mut self, sample: SampleInfo) {
        if sample.kind.is_idr() {
            self.idr_count += 1;
        }
        self.samples.push(sample);
    }

    /// 总采样数
    pub fn sample_count(&self) -> u32 {
        self.samples.len() as u32
    }

    /// IDR 采样数
    pub fn sample_count_idr(&self) -> u32 {
        self.idr_count
    }

    /// 获取指定下标的采样
    pub fn get(&self, index: usize) -> Option<&SampleInfo> {
        self.samples.get(index)
    }

    /// 采样迭代器 (解码顺序)
    pub fn iter(&self) -> impl Iterator<Item = &SampleInfo> {
        self.samples.iter()
    }

    /// 所有 IDR 采样的下标 (解码顺序)
    pub fn idr_indices(&self) -> Vec<usize> {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind.is_idr())
            .map(|(i, _)| i)
            .collect()
    }

    /// 是否为视频流
    pub fn is_video(&self) -> bool {
        self.stream_type == MediaType::Video
    }
}

/// 从采样映射中读出的一个采样 (元信息 + 字节负载)
#[derive(Debug, Clone)]
pub struct MappedSample {
    /// 采样子类型
    pub kind: SampleKind,
    /// 采样字节数据
    pub data: Bytes,
    /// 显示时间戳
    pub pts: i64,
    /// 解码时间戳
    pub dts: i64,
    /// 文件内绝对偏移 (诊断用)
    pub offset: u64,
}

/// 采样来源抽象
///
/// NAL 调度器通过该接口逐个拉取采样, 不直接接触文件 I/O.
/// 具体实现 (位流喂入器) 位于容器库中.
pub trait SampleSource {
    /// 读取下一个采样
    ///
    /// # 返回
    /// - `Ok(Some(sample))`: 成功读取一个采样
    /// - `Ok(None)`: 映射已走完
    /// - `Err(_)`: I/O 失败 (对整次运行致命)
    fn feed_next_sample(&mut self) -> ZhenResult<Option<MappedSample>>;
}
