//! MP4 采样表 (Sample Table) 解析与采样映射物化.
//!
//! 采样表 (stbl) 的子 box 共同构成从采样编号到文件偏移的完整映射:
//! - stsd: 采样描述 (编解码器参数, avcC)
//! - stts: 解码时间→采样编号映射 (delta 编码)
//! - ctts: 合成时间偏移 (B帧重排序)
//! - stsc: 采样→块映射 (Run-Length 编码)
//! - stsz/stz2: 每个采样的字节大小
//! - stco/co64: 每个块的文件偏移
//! - stss: 同步采样 (随机访问点) 编号, 缺失表示全部是同步点
//!
//! 物化阶段把这些表展开为一条 [`SampleMap`]: 采样 i 的块号由 stsc
//! 推出, 偏移为 `stco[块] + 块内之前采样大小之和`, 同步标志取决于
//! 1-based 编号是否出现在 stss 中. 对 AVC 轨道, avcC 的带内 SPS/PPS
//! 以伪采样形式放在映射最前.

use log::{debug, warn};
use zhen_codec::parsers::h264::parse_avcc_config;
use zhen_codec::{CodecId, SampleInfo, SampleKind, SampleMap};
use zhen_core::timestamp::NOPTS_VALUE;
use zhen_core::{MediaType, Rational, ZhenError, ZhenResult};

use crate::io::IoContext;

use super::boxes::read_fullbox_header;

/// 解码时间→采样条目 (stts)
#[derive(Debug, Clone)]
struct SttsEntry {
    /// 采样计数
    count: u32,
    /// 每采样的时间增量
    delta: u32,
}

/// 合成时间偏移条目 (ctts)
#[derive(Debug, Clone)]
struct CttsEntry {
    /// 采样计数
    count: u32,
    /// 偏移量
    offset: i32,
}

/// 采样→块条目 (stsc)
#[derive(Debug, Clone)]
struct StscEntry {
    /// 起始块号 (1-based)
    first_chunk: u32,
    /// 每块的采样数
    samples_per_chunk: u32,
}

/// AVC 带内参数集信息 (来自 avcC)
#[derive(Debug, Clone)]
pub struct AvcInbandConfig {
    /// NAL 长度前缀字节数
    pub length_size: usize,
    /// profile_idc
    pub profile_idc: u8,
    /// level_idc
    pub level_idc: u8,
    /// 带内 SPS 的 (文件绝对偏移, 大小) 列表
    pub sps_ranges: Vec<(u64, u32)>,
    /// 带内 PPS 的 (文件绝对偏移, 大小) 列表
    pub pps_ranges: Vec<(u64, u32)>,
}

/// 一条轨道的原始采样表
pub struct SampleTable {
    // === 来自 stsd ===
    /// 编解码器 ID
    pub codec_id: CodecId,
    /// 视频宽度
    pub width: u32,
    /// 视频高度
    pub height: u32,
    /// 音频采样率
    pub sample_rate: u32,
    /// 声道数
    pub channel_count: u32,
    /// 编解码器私有数据 (avcC 原始负载)
    pub extra_data: Vec<u8>,
    /// AVC 带内参数集信息
    pub avc_config: Option<AvcInbandConfig>,

    // === 必选表存在标记 ===
    has_stsd: bool,
    has_stts: bool,
    has_stsc: bool,
    has_offsets: bool,

    // === 原始表 ===
    stts_entries: Vec<SttsEntry>,
    ctts_entries: Vec<CttsEntry>,
    stsc_entries: Vec<StscEntry>,
    /// 统一采样大小 (0 表示使用逐采样大小表)
    default_sample_size: u32,
    /// 逐采样大小表
    sample_sizes: Vec<u32>,
    /// 总采样数 (来自 stsz/stz2)
    total_samples: u32,
    /// 块偏移表
    chunk_offsets: Vec<u64>,
    /// 同步采样编号 (1-based, 升序)
    sync_samples: Vec<u32>,
    /// 是否有 stss (无则所有采样都是同步点)
    has_stss: bool,
}

impl SampleTable {
    /// 创建空采样表
    pub fn new() -> Self {
        Self {
            codec_id: CodecId::None,
            width: 0,
            height: 0,
            sample_rate: 0,
            channel_count: 0,
            extra_data: Vec::new(),
            avc_config: None,
            has_stsd: false,
            has_stts: false,
            has_stsc: false,
            has_offsets: false,
            stts_entries: Vec::new(),
            ctts_entries: Vec::new(),
            stsc_entries: Vec::new(),
            default_sample_size: 0,
            sample_sizes: Vec::new(),
            total_samples: 0,
            chunk_offsets: Vec::new(),
            sync_samples: Vec::new(),
            has_stss: false,
        }
    }

    /// 总采样数
    pub fn sample_count(&self) -> u32 {
        self.total_samples
    }

    /// 获取指定采样的字节大小
    fn sample_size(&self, sample_idx: u32) -> ZhenResult<u32> {
        if self.default_sample_size > 0 {
            return Ok(self.default_sample_size);
        }
        self.sample_sizes
            .get(sample_idx as usize)
            .copied()
            .ok_or_else(|| {
                ZhenError::Format(format!(
                    "MP4: stsz 缺少采样 {} 的大小 (共 {} 条)",
                    sample_idx,
                    self.sample_sizes.len()
                ))
            })
    }

    /// 采样是否为同步点 (0-based 下标)
    fn is_sync_sample(&self, sample_idx: u32) -> bool {
        if !self.has_stss {
            return true; // 无 stss 表示所有采样都是同步点
        }
        let sample_number = sample_idx + 1; // stss 使用 1-based 编号
        self.sync_samples.binary_search(&sample_number).is_ok()
    }

    // ============================================================
    // 解析方法
    // ============================================================

    /// 解析 stsd (Sample Description Box)
    pub fn parse_stsd(&mut self, io: &mut IoContext, box_end: u64) -> ZhenResult<()> {
        let (_version, _flags) = read_fullbox_header(io)?;
        let entry_count = io.read_u32_be()?;
        self.has_stsd = true;

        if entry_count == 0 {
            return Ok(());
        }

        // 只解析第一个描述条目
        let entry_start = io.position()?;
        let entry_size = io.read_u32_be()?;
        let entry_format = io.read_tag()?;
        let entry_end = (entry_start + u64::from(entry_size)).min(box_end);

        self.codec_id = fourcc_to_codec_id(&entry_format);
        debug!(
            "MP4: stsd 条目 {}, codec={}",
            String::from_utf8_lossy(&entry_format),
            self.codec_id
        );

        // SampleEntry 公共部分: 保留字段 (6 bytes) + data_reference_index (2 bytes)
        io.skip(6)?;
        let _data_ref_idx = io.read_u16_be()?;

        match self.codec_id.media_type() {
            MediaType::Video => self.parse_video_sample_entry(io, entry_end)?,
            MediaType::Audio => self.parse_audio_sample_entry(io, entry_end)?,
            _ => {}
        }

        Ok(())
    }

    /// 解析视频采样条目 (VisualSampleEntry)
    fn parse_video_sample_entry(&mut self, io: &mut IoContext, entry_end: u64) -> ZhenResult<()> {
        io.skip(16)?; // pre_defined + reserved
        self.width = u32::from(io.read_u16_be()?);
        self.height = u32::from(io.read_u16_be()?);
        io.skip(14)?; // resolution + reserved + frame_count
        io.skip(32)?; // compressor name
        let _depth = io.read_u16_be()?;
        let _pre_defined = io.read_u16_be()?;

        // 嵌套的编解码器配置 box (avcC 等)
        self.parse_codec_config_boxes(io, entry_end)?;
        Ok(())
    }

    /// 解析音频采样条目 (AudioSampleEntry)
    fn parse_audio_sample_entry(&mut self, io: &mut IoContext, entry_end: u64) -> ZhenResult<()> {
        io.skip(8)?; // reserved
        self.channel_count = u32::from(io.read_u16_be()?);
        let _sample_size = io.read_u16_be()?;
        io.skip(4)?; // pre_defined + reserved
        let sr_fixed = io.read_u32_be()?; // 16.16 定点数
        self.sample_rate = sr_fixed >> 16;

        self.parse_codec_config_boxes(io, entry_end)?;
        Ok(())
    }

    /// 扫描采样条目内嵌套的编解码器配置 box
    fn parse_codec_config_boxes(&mut self, io: &mut IoContext, end: u64) -> ZhenResult<()> {
        while io.position()? + 8 <= end {
            let pos = io.position()?;
            let size = io.read_u32_be()?;
            let tag = io.read_tag()?;

            if size < 8 || pos + u64::from(size) > end {
                break;
            }
            let content_size = (size - 8) as usize;
            let content_pos = io.position()?;

            if &tag == b"avcC" {
                let payload = io.read_bytes(content_size)?;
                self.parse_avcc(&payload, content_pos)?;
            }

            io.seek(std::io::SeekFrom::Start(pos + u64::from(size)))?;
        }
        Ok(())
    }

    /// 解析 avcC 负载, 把带内 SPS/PPS 换算成文件绝对偏移
    fn parse_avcc(&mut self, payload: &[u8], content_pos: u64) -> ZhenResult<()> {
        let config = parse_avcc_config(payload)?;

        let to_range = |offset: usize, size: usize| (content_pos + offset as u64, size as u32);
        let sps_ranges = config
            .sps_entries
            .iter()
            .map(|e| to_range(e.offset, e.size))
            .collect();
        let pps_ranges = config
            .pps_entries
            .iter()
            .map(|e| to_range(e.offset, e.size))
            .collect();

        debug!(
            "MP4: avcC, profile={}, level={}, length_size={}, sps={}, pps={}",
            config.profile_idc,
            config.level_idc,
            config.length_size,
            config.sps_entries.len(),
            config.pps_entries.len()
        );

        self.avc_config = Some(AvcInbandConfig {
            length_size: config.length_size,
            profile_idc: config.profile_idc,
            level_idc: config.level_idc,
            sps_ranges,
            pps_ranges,
        });
        self.extra_data = payload.to_vec();
        Ok(())
    }

    /// 解析 stts (Decoding Time to Sample Box)
    pub fn parse_stts(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let (_version, _flags) = read_fullbox_header(io)?;
        let entry_count = io.read_u32_be()?;
        self.has_stts = true;

        self.stts_entries.reserve(entry_count as usize);
        for _ in 0..entry_count {
            let count = io.read_u32_be()?;
            let delta = io.read_u32_be()?;
            self.stts_entries.push(SttsEntry { count, delta });
        }
        Ok(())
    }

    /// 解析 ctts (Composition Time to Sample Box)
    pub fn parse_ctts(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let (version, _flags) = read_fullbox_header(io)?;
        let entry_count = io.read_u32_be()?;

        self.ctts_entries.reserve(entry_count as usize);
        for _ in 0..entry_count {
            let count = io.read_u32_be()?;
            let offset = if version == 0 {
                io.read_u32_be()? as i32
            } else {
                io.read_i32_be()?
            };
            self.ctts_entries.push(CttsEntry { count, offset });
        }
        Ok(())
    }

    /// 解析 stsc (Sample To Chunk Box)
    pub fn parse_stsc(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let (_version, _flags) = read_fullbox_header(io)?;
        let entry_count = io.read_u32_be()?;
        self.has_stsc = true;

        self.stsc_entries.reserve(entry_count as usize);
        for _ in 0..entry_count {
            let first_chunk = io.read_u32_be()?;
            let samples_per_chunk = io.read_u32_be()?;
            let _sample_desc_idx = io.read_u32_be()?;
            if first_chunk == 0 || samples_per_chunk == 0 {
                return Err(ZhenError::Format(format!(
                    "MP4: stsc 条目非法, first_chunk={}, samples_per_chunk={}",
                    first_chunk, samples_per_chunk
                )));
            }
            self.stsc_entries.push(StscEntry {
                first_chunk,
                samples_per_chunk,
            });
        }
        Ok(())
    }

    /// 解析 stsz (Sample Size Box)
    pub fn parse_stsz(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let (_version, _flags) = read_fullbox_header(io)?;
        self.default_sample_size = io.read_u32_be()?;
        self.total_samples = io.read_u32_be()?;

        if self.default_sample_size == 0 {
            self.sample_sizes.reserve(self.total_samples as usize);
            for _ in 0..self.total_samples {
                self.sample_sizes.push(io.read_u32_be()?);
            }
        }
        Ok(())
    }

    /// 解析 stz2 (Compact Sample Size Box)
    ///
    /// 字段宽度 4/8/16 位, 4 位时两个采样打包在一个字节里 (高半字节在前).
    pub fn parse_stz2(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let (_version, _flags) = read_fullbox_header(io)?;
        io.skip(3)?; // reserved
        let field_size = io.read_u8()?;
        self.total_samples = io.read_u32_be()?;

        self.default_sample_size = 0;
        self.sample_sizes.reserve(self.total_samples as usize);
        match field_size {
            4 => {
                let byte_count = (self.total_samples as usize).div_ceil(2);
                let packed = io.read_bytes(byte_count)?;
                for i in 0..self.total_samples as usize {
                    let byte = packed[i / 2];
                    let size = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                    self.sample_sizes.push(u32::from(size));
                }
            }
            8 => {
                for _ in 0..self.total_samples {
                    self.sample_sizes.push(u32::from(io.read_u8()?));
                }
            }
            16 => {
                for _ in 0..self.total_samples {
                    self.sample_sizes.push(u32::from(io.read_u16_be()?));
                }
            }
            other => {
                return Err(ZhenError::Format(format!(
                    "MP4: stz2 字段宽度非法, field_size={}",
                    other
                )));
            }
        }
        Ok(())
    }

    /// 解析 stco/co64 (Chunk Offset Box)
    pub fn parse_stco(&mut self, io: &mut IoContext, is_64bit: bool) -> ZhenResult<()> {
        let (_version, _flags) = read_fullbox_header(io)?;
        let entry_count = io.read_u32_be()?;
        self.has_offsets = true;

        self.chunk_offsets.reserve(entry_count as usize);
        for _ in 0..entry_count {
            let offset = if is_64bit {
                io.read_u64_be()?
            } else {
                u64::from(io.read_u32_be()?)
            };
            self.chunk_offsets.push(offset);
        }
        Ok(())
    }

    /// 解析 stss (Sync Sample Box)
    pub fn parse_stss(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let (_version, _flags) = read_fullbox_header(io)?;
        let entry_count = io.read_u32_be()?;
        self.has_stss = true;

        self.sync_samples.reserve(entry_count as usize);
        for _ in 0..entry_count {
            self.sync_samples.push(io.read_u32_be()?);
        }
        // 规范要求升序; 排序以保证 binary_search 语义
        self.sync_samples.sort_unstable();
        Ok(())
    }

    // ============================================================
    // 校验与物化
    // ============================================================

    /// 校验 stbl 内必选表都已出现
    pub fn validate_mandatory(&self) -> ZhenResult<()> {
        if !self.has_stsd {
            return Err(ZhenError::Format("MP4: 轨道缺少 stsd".into()));
        }
        if !self.has_stts {
            return Err(ZhenError::Format("MP4: 轨道缺少 stts".into()));
        }
        if !self.has_stsc {
            return Err(ZhenError::Format("MP4: 轨道缺少 stsc".into()));
        }
        if !self.has_offsets {
            return Err(ZhenError::Format("MP4: 轨道缺少 stco/co64".into()));
        }
        Ok(())
    }

    /// 把采样表物化为采样映射
    ///
    /// 每个采样的偏移/大小/时间戳/同步标志在这里展开;
    /// 采样区间必须落在某个 mdat box 内, 越界视为容器损坏.
    pub fn materialize(
        &self,
        media_type: MediaType,
        time_base: Rational,
        mdat_ranges: &[(u64, u64)],
    ) -> ZhenResult<SampleMap> {
        self.validate_mandatory()?;

        let mut map = SampleMap::new(media_type, self.codec_id, time_base);

        // 带内参数集伪采样放在最前, 保证参数集先于切片解码
        if let Some(avc) = &self.avc_config {
            map.sample_alignment = true;
            map.nal_length_size = avc.length_size;
            for &(offset, size) in &avc.sps_ranges {
                map.push(SampleInfo {
                    kind: SampleKind::AvcSps,
                    offset,
                    size,
                    pts: NOPTS_VALUE,
                    dts: NOPTS_VALUE,
                });
            }
            for &(offset, size) in &avc.pps_ranges {
                map.push(SampleInfo {
                    kind: SampleKind::AvcPps,
                    offset,
                    size,
                    pts: NOPTS_VALUE,
                    dts: NOPTS_VALUE,
                });
            }
        }

        let total = self.sample_count();
        let total_chunks = self.chunk_offsets.len() as u32;

        // stts/ctts 游标: 顺序物化时增量推进
        let mut stts_run = 0usize;
        let mut stts_used = 0u32;
        let mut dts = 0i64;
        let mut ctts_run = 0usize;
        let mut ctts_used = 0u32;

        let mut sample_idx = 0u32;
        'runs: for (run_idx, entry) in self.stsc_entries.iter().enumerate() {
            let first_chunk = entry.first_chunk - 1; // 0-based
            let next_first = self
                .stsc_entries
                .get(run_idx + 1)
                .map(|e| e.first_chunk - 1)
                .unwrap_or(total_chunks);

            for chunk in first_chunk..next_first {
                if sample_idx >= total {
                    break 'runs;
                }
                let Some(&chunk_offset) = self.chunk_offsets.get(chunk as usize) else {
                    return Err(ZhenError::Format(format!(
                        "MP4: stsc 引用不存在的块, chunk={}, 块总数={}",
                        chunk + 1,
                        total_chunks
                    )));
                };

                let mut offset = chunk_offset;
                for _ in 0..entry.samples_per_chunk {
                    if sample_idx >= total {
                        break;
                    }
                    let size = self.sample_size(sample_idx)?;

                    // 解码时间: stts delta 累加
                    let sample_dts = dts;
                    if let Some(run) = self.stts_entries.get(stts_run) {
                        dts += i64::from(run.delta);
                        stts_used += 1;
                        if stts_used >= run.count {
                            stts_run += 1;
                            stts_used = 0;
                        }
                    }

                    // 合成时间: ctts 偏移
                    let mut cts_offset = 0i32;
                    if let Some(run) = self.ctts_entries.get(ctts_run) {
                        cts_offset = run.offset;
                        ctts_used += 1;
                        if ctts_used >= run.count {
                            ctts_run += 1;
                            ctts_used = 0;
                        }
                    }
                    let pts = sample_dts + i64::from(cts_offset);

                    if !mdat_ranges.is_empty() && !region_in_mdat(offset, size, mdat_ranges) {
                        return Err(ZhenError::Format(format!(
                            "MP4: 采样 {} 区间 [{}, {}) 不在任何 mdat 内",
                            sample_idx,
                            offset,
                            offset + u64::from(size)
                        )));
                    }

                    let kind = match media_type {
                        MediaType::Video => {
                            if self.is_sync_sample(sample_idx) {
                                SampleKind::VideoIdr
                            } else {
                                SampleKind::Video
                            }
                        }
                        MediaType::Audio => SampleKind::Audio,
                        _ => SampleKind::Other,
                    };

                    map.push(SampleInfo {
                        kind,
                        offset,
                        size,
                        pts,
                        dts: sample_dts,
                    });

                    offset += u64::from(size);
                    sample_idx += 1;
                }
            }
        }

        if sample_idx < total {
            warn!(
                "MP4: stsc/stco 未覆盖全部采样, 已物化 {}/{}",
                sample_idx, total
            );
            return Err(ZhenError::Format(format!(
                "MP4: 块映射覆盖不足, 采样数={}, 已覆盖={}",
                total, sample_idx
            )));
        }

        debug!(
            "MP4: 采样映射物化完成, samples={}, idr={}",
            map.sample_count(),
            map.sample_count_idr()
        );
        Ok(map)
    }
}

impl Default for SampleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 采样区间是否完全落在某个 mdat 内
fn region_in_mdat(offset: u64, size: u32, mdat_ranges: &[(u64, u64)]) -> bool {
    let end = offset + u64::from(size);
    mdat_ranges
        .iter()
        .any(|&(start, stop)| offset >= start && end <= stop)
}

/// FourCC 到 CodecId 映射
fn fourcc_to_codec_id(fourcc: &[u8; 4]) -> CodecId {
    match fourcc {
        // 视频
        b"avc1" | b"avc3" | b"h264" => CodecId::H264,
        b"hvc1" | b"hev1" => CodecId::H265,
        b"mp4v" => CodecId::Mpeg4,
        b"mjpa" | b"mjpb" => CodecId::Mjpeg,
        // 音频
        b"mp4a" => CodecId::Aac,
        b".mp3" => CodecId::Mp3,
        b"ac-3" => CodecId::Ac3,
        b"Opus" => CodecId::Opus,
        // 未知
        _ => CodecId::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    fn memory_io(data: Vec<u8>) -> IoContext {
        IoContext::new(Box::new(MemoryBackend::from_data(data)))
    }

    fn fullbox_payload(content: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 4]; // version + flags
        data.extend_from_slice(content);
        data
    }

    #[test]
    fn test_fourcc_映射() {
        assert_eq!(fourcc_to_codec_id(b"avc1"), CodecId::H264);
        assert_eq!(fourcc_to_codec_id(b"hvc1"), CodecId::H265);
        assert_eq!(fourcc_to_codec_id(b"mp4a"), CodecId::Aac);
        assert_eq!(fourcc_to_codec_id(b"xxxx"), CodecId::None);
    }

    #[test]
    fn test_stts_解析() {
        let mut content = Vec::new();
        content.extend_from_slice(&2u32.to_be_bytes()); // entry_count
        content.extend_from_slice(&100u32.to_be_bytes());
        content.extend_from_slice(&1024u32.to_be_bytes());
        content.extend_from_slice(&50u32.to_be_bytes());
        content.extend_from_slice(&512u32.to_be_bytes());

        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        st.parse_stts(&mut io).unwrap();
        assert_eq!(st.stts_entries.len(), 2);
        assert_eq!(st.stts_entries[0].delta, 1024);
        assert!(st.has_stts);
    }

    #[test]
    fn test_stsz_逐采样大小() {
        let mut content = Vec::new();
        content.extend_from_slice(&0u32.to_be_bytes()); // default=0
        content.extend_from_slice(&3u32.to_be_bytes());
        content.extend_from_slice(&100u32.to_be_bytes());
        content.extend_from_slice(&200u32.to_be_bytes());
        content.extend_from_slice(&150u32.to_be_bytes());

        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        st.parse_stsz(&mut io).unwrap();
        assert_eq!(st.sample_count(), 3);
        assert_eq!(st.sample_size(0).unwrap(), 100);
        assert_eq!(st.sample_size(2).unwrap(), 150);
        assert!(st.sample_size(3).is_err());
    }

    #[test]
    fn test_stsz_统一大小() {
        let mut content = Vec::new();
        content.extend_from_slice(&1024u32.to_be_bytes());
        content.extend_from_slice(&500u32.to_be_bytes());

        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        st.parse_stsz(&mut io).unwrap();
        assert_eq!(st.sample_count(), 500);
        assert_eq!(st.sample_size(499).unwrap(), 1024);
    }

    #[test]
    fn test_stz2_4位打包() {
        let mut content = vec![0, 0, 0, 4]; // reserved + field_size=4
        content.extend_from_slice(&3u32.to_be_bytes());
        content.push(0x5A); // 采样 0=5, 采样 1=10
        content.push(0x70); // 采样 2=7

        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        st.parse_stz2(&mut io).unwrap();
        assert_eq!(st.sample_count(), 3);
        assert_eq!(st.sample_size(0).unwrap(), 5);
        assert_eq!(st.sample_size(1).unwrap(), 10);
        assert_eq!(st.sample_size(2).unwrap(), 7);
    }

    #[test]
    fn test_stz2_16位() {
        let mut content = vec![0, 0, 0, 16];
        content.extend_from_slice(&2u32.to_be_bytes());
        content.extend_from_slice(&300u16.to_be_bytes());
        content.extend_from_slice(&400u16.to_be_bytes());

        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        st.parse_stz2(&mut io).unwrap();
        assert_eq!(st.sample_size(0).unwrap(), 300);
        assert_eq!(st.sample_size(1).unwrap(), 400);
    }

    #[test]
    fn test_stz2_非法字段宽度拒绝() {
        let mut content = vec![0, 0, 0, 12];
        content.extend_from_slice(&1u32.to_be_bytes());
        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        assert!(st.parse_stz2(&mut io).is_err());
    }

    #[test]
    fn test_stss_解析与同步判断() {
        let mut content = Vec::new();
        content.extend_from_slice(&3u32.to_be_bytes());
        content.extend_from_slice(&1u32.to_be_bytes());
        content.extend_from_slice(&30u32.to_be_bytes());
        content.extend_from_slice(&60u32.to_be_bytes());

        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        st.parse_stss(&mut io).unwrap();
        assert!(st.is_sync_sample(0)); // 1-based 编号 1
        assert!(!st.is_sync_sample(1));
        assert!(st.is_sync_sample(29));
        assert!(st.is_sync_sample(59));
    }

    #[test]
    fn test_无stss_全部同步() {
        let st = SampleTable::new();
        assert!(st.is_sync_sample(0));
        assert!(st.is_sync_sample(100));
    }

    #[test]
    fn test_stsc_非法条目拒绝() {
        let mut content = Vec::new();
        content.extend_from_slice(&1u32.to_be_bytes());
        content.extend_from_slice(&0u32.to_be_bytes()); // first_chunk=0 非法
        content.extend_from_slice(&1u32.to_be_bytes());
        content.extend_from_slice(&1u32.to_be_bytes());

        let mut io = memory_io(fullbox_payload(&content));
        let mut st = SampleTable::new();
        assert!(st.parse_stsc(&mut io).is_err());
    }

    /// 手工构造一个可物化的采样表
    fn build_table() -> SampleTable {
        let mut st = SampleTable::new();
        st.codec_id = CodecId::H264;
        st.has_stsd = true;
        st.has_stts = true;
        st.has_stsc = true;
        st.has_offsets = true;
        // 6 个采样: 块1 两个, 块2 两个, 块3/4 各一个
        st.stsc_entries = vec![
            StscEntry {
                first_chunk: 1,
                samples_per_chunk: 2,
            },
            StscEntry {
                first_chunk: 3,
                samples_per_chunk: 1,
            },
        ];
        st.chunk_offsets = vec![1000, 2000, 3000, 4000];
        st.total_samples = 6;
        st.sample_sizes = vec![100, 50, 80, 70, 60, 90];
        st.stts_entries = vec![SttsEntry {
            count: 6,
            delta: 512,
        }];
        st.has_stss = true;
        st.sync_samples = vec![1, 5];
        st
    }

    #[test]
    fn test_物化_偏移与块映射() {
        let st = build_table();
        let map = st
            .materialize(MediaType::Video, Rational::new(1, 90000), &[])
            .unwrap();

        assert_eq!(map.sample_count(), 6);
        assert_eq!(map.sample_count_idr(), 2);

        // 块 0: 采样 0,1; 块 1: 采样 2,3; 块 2: 采样 4; 块 3: 采样 5
        assert_eq!(map.get(0).unwrap().offset, 1000);
        assert_eq!(map.get(1).unwrap().offset, 1100); // 1000 + 100
        assert_eq!(map.get(2).unwrap().offset, 2000);
        assert_eq!(map.get(3).unwrap().offset, 2080); // 2000 + 80
        assert_eq!(map.get(4).unwrap().offset, 3000);
        assert_eq!(map.get(5).unwrap().offset, 4000);

        // 同步标志: 采样 0 和 4
        assert_eq!(map.get(0).unwrap().kind, SampleKind::VideoIdr);
        assert_eq!(map.get(1).unwrap().kind, SampleKind::Video);
        assert_eq!(map.get(4).unwrap().kind, SampleKind::VideoIdr);
    }

    #[test]
    fn test_物化_时间戳累加() {
        let st = build_table();
        let map = st
            .materialize(MediaType::Video, Rational::new(1, 90000), &[])
            .unwrap();

        for i in 0..6 {
            let s = map.get(i).unwrap();
            assert_eq!(s.dts, (i as i64) * 512);
            assert_eq!(s.pts, s.dts); // 无 ctts
        }
    }

    #[test]
    fn test_物化_ctts偏移() {
        let mut st = build_table();
        st.ctts_entries = vec![
            CttsEntry {
                count: 3,
                offset: 1024,
            },
            CttsEntry {
                count: 3,
                offset: 0,
            },
        ];
        let map = st
            .materialize(MediaType::Video, Rational::new(1, 90000), &[])
            .unwrap();

        assert_eq!(map.get(0).unwrap().pts, 1024);
        assert_eq!(map.get(2).unwrap().pts, 2 * 512 + 1024);
        assert_eq!(map.get(3).unwrap().pts, 3 * 512);
    }

    #[test]
    fn test_物化_mdat越界拒绝() {
        let st = build_table();
        // mdat 只覆盖 [1000, 3000): 块 3/4 的采样越界
        let err = st
            .materialize(MediaType::Video, Rational::new(1, 90000), &[(1000, 3000)])
            .expect_err("mdat 越界应失败");
        assert!(matches!(err, ZhenError::Format(_)));
    }

    #[test]
    fn test_物化_mdat覆盖通过() {
        let st = build_table();
        let map = st
            .materialize(
                MediaType::Video,
                Rational::new(1, 90000),
                &[(1000, 2160), (3000, 4090)],
            )
            .unwrap();
        assert_eq!(map.sample_count(), 6);
    }

    #[test]
    fn test_物化_缺必选表拒绝() {
        let mut st = build_table();
        st.has_stts = false;
        assert!(
            st.materialize(MediaType::Video, Rational::new(1, 90000), &[])
                .is_err()
        );
    }

    #[test]
    fn test_物化_块覆盖不足拒绝() {
        let mut st = build_table();
        st.chunk_offsets = vec![1000]; // 只有 1 个块, 装不下 6 个采样
        assert!(
            st.materialize(MediaType::Video, Rational::new(1, 90000), &[])
                .is_err()
        );
    }
}
