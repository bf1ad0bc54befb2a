//! MP4/MOV (ISO Base Media File Format) 解封装器.
//!
//! 基于 ISO 14496-12 (ISOBMFF) 标准, 按 box 树递归下降解析,
//! 为每条轨道重建采样映射.
//!
//! # Box 树结构
//! ```text
//! ftyp                  文件类型 (必须先于 moov)
//! moov                  影片元数据 (必选)
//! ├── mvhd              影片头部 (时长, 时间刻度)
//! └── trak              轨道 (每个音/视频流一个)
//!     ├── tkhd          轨道头部 (必选)
//!     ├── edts          编辑列表
//!     └── mdia          媒体信息 (必选)
//!         ├── mdhd      媒体头部 (必选)
//!         ├── hdlr      处理器引用 (必选)
//!         └── minf
//!             ├── dinf
//!             └── stbl  采样表 (必选)
//!                 ├── stsd  采样描述 (avc1 → avcC)
//!                 ├── stts  解码时间映射
//!                 ├── ctts  合成时间偏移
//!                 ├── stsc  采样→块映射
//!                 ├── stsz / stz2  采样大小
//!                 ├── stco / co64  块偏移
//!                 └── stss  同步采样 (缺失 = 全部同步)
//! mdat                  媒体数据 (可多个, 可在 moov 之前)
//! ```
//!
//! # 失败语义
//!
//! box 大小违例终止所在容器的解析并向上传播; 缺少必选 box 的轨道
//! 被丢弃 (记录警告), 其余轨道继续; 未知 box 永远不会导致失败.

mod boxes;
mod sample_table;

pub use sample_table::{AvcInbandConfig, SampleTable};

use log::{debug, warn};
use zhen_codec::SampleMap;
use zhen_core::{MediaType, PixelFormat, Rational, ZhenError, ZhenResult};

use crate::demuxer::Demuxer;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX, SCORE_MIME};
use crate::stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};

use self::boxes::{BoxType, FtypBox, check_child_bounds, read_box_header, read_fullbox_header};

/// 解析完成、尚未物化的轨道
struct ParsedTrack {
    track_id: u32,
    handler: [u8; 4],
    media_timescale: u32,
    media_duration: u64,
    /// tkhd 中的显示尺寸 (stsd 缺失时的回退值)
    tkhd_width: u32,
    tkhd_height: u32,
    table: SampleTable,
}

/// MP4 解封装器
pub struct Mp4Demuxer {
    /// 流信息列表
    streams: Vec<Stream>,
    /// 每条流的采样映射 (take 后为 None)
    sample_maps: Vec<Option<SampleMap>>,
    /// mdat 区间列表 (内容区绝对偏移, [start, end))
    mdat_ranges: Vec<(u64, u64)>,
    /// 文件总时长 (秒)
    file_duration: Option<f64>,
}

impl Mp4Demuxer {
    /// 创建 MP4 解封装器实例
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            sample_maps: Vec::new(),
            mdat_ranges: Vec::new(),
            file_duration: None,
        }
    }

    /// 解析 moov box 内容, 收集待物化的轨道
    fn parse_moov(
        &mut self,
        io: &mut IoContext,
        moov_end: u64,
        file_size: u64,
        tracks: &mut Vec<ParsedTrack>,
    ) -> ZhenResult<()> {
        while io.position()? + 8 <= moov_end {
            let header = read_box_header(io)?;
            let box_end = check_child_bounds(&header, moov_end, file_size)?;

            match header.box_type {
                BoxType::Mvhd => {
                    self.parse_mvhd(io)?;
                }
                BoxType::Trak => match parse_trak(io, box_end, file_size) {
                    Ok(track) => tracks.push(track),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        warn!("MP4: 轨道解析失败, 丢弃该轨道, err={}", err);
                    }
                },
                other if other.is_container() => {
                    walk_children(io, box_end, file_size)?;
                }
                _ => {}
            }

            io.seek(std::io::SeekFrom::Start(box_end))?;
        }
        Ok(())
    }

    /// 解析 mvhd (Movie Header Box)
    fn parse_mvhd(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let (version, _flags) = read_fullbox_header(io)?;

        let (timescale, duration) = if version == 0 {
            io.skip(8)?; // creation + modification
            let timescale = io.read_u32_be()?;
            let duration = u64::from(io.read_u32_be()?);
            (timescale, duration)
        } else {
            io.skip(16)?; // creation + modification (64-bit)
            let timescale = io.read_u32_be()?;
            let duration = io.read_u64_be()?;
            (timescale, duration)
        };

        if timescale > 0 {
            self.file_duration = Some(duration as f64 / f64::from(timescale));
        }
        debug!("MP4: mvhd, timescale={}, duration={}", timescale, duration);
        Ok(())
    }

    /// 物化所有轨道, 生成流信息与采样映射
    fn build_streams(&mut self, tracks: Vec<ParsedTrack>) {
        for track in tracks {
            let media_type = match &track.handler {
                b"vide" => MediaType::Video,
                b"soun" => MediaType::Audio,
                _ => MediaType::Data,
            };
            let time_base = if track.media_timescale > 0 {
                Rational::new(1, track.media_timescale as i32)
            } else {
                Rational::new(1, 1000)
            };

            let map = match track
                .table
                .materialize(media_type, time_base, &self.mdat_ranges)
            {
                Ok(map) => map,
                Err(err) => {
                    warn!(
                        "MP4: 轨道 {} 采样映射物化失败, 丢弃该轨道, err={}",
                        track.track_id, err
                    );
                    continue;
                }
            };

            let stream_index = self.streams.len();
            let params = match media_type {
                MediaType::Video => StreamParams::Video(VideoStreamParams {
                    width: if track.table.width > 0 {
                        track.table.width
                    } else {
                        track.tkhd_width
                    },
                    height: if track.table.height > 0 {
                        track.table.height
                    } else {
                        track.tkhd_height
                    },
                    pixel_format: PixelFormat::Yuv420p,
                }),
                MediaType::Audio => StreamParams::Audio(AudioStreamParams {
                    sample_rate: track.table.sample_rate,
                    channel_count: track.table.channel_count,
                }),
                _ => StreamParams::Other,
            };

            debug!(
                "MP4: 轨道 #{} (id={}): {} {}, timescale={}, samples={}, idr={}",
                stream_index,
                track.track_id,
                media_type,
                track.table.codec_id,
                track.media_timescale,
                map.sample_count(),
                map.sample_count_idr(),
            );

            self.streams.push(Stream {
                index: stream_index,
                media_type,
                codec_id: track.table.codec_id,
                time_base,
                duration: track.media_duration as i64,
                nb_samples: u64::from(map.sample_count()),
                extra_data: track.table.extra_data.clone(),
                params,
            });
            self.sample_maps.push(Some(map));
        }
    }
}

impl Default for Mp4Demuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for Mp4Demuxer {
    fn name(&self) -> &str {
        "mp4"
    }

    fn open(&mut self, io: &mut IoContext) -> ZhenResult<()> {
        let file_size = io.size().unwrap_or(u64::MAX);
        let mut ftyp_seen = false;
        let mut moov_seen = false;
        let mut tracks = Vec::new();

        // 顶层 box 扫描
        loop {
            let pos = io.position()?;
            if pos + 8 > file_size {
                break;
            }

            let header = match read_box_header(io) {
                Ok(h) => h,
                Err(ZhenError::Eof) => break,
                Err(e) => return Err(e),
            };
            let box_end = header.offset_end(file_size);
            if box_end > file_size {
                return Err(ZhenError::Format(format!(
                    "MP4: 顶层 box 越过文件末尾, type={}, end={}, file_size={}",
                    header.box_type, box_end, file_size
                )));
            }
            let content_start = io.position()?;

            match header.box_type {
                BoxType::Ftyp => {
                    let ftyp = FtypBox::parse(io, header.content_size())?;
                    debug!("MP4: ftyp, major_brand={}", ftyp.major_brand_str());
                    ftyp_seen = true;
                }
                BoxType::Moov => {
                    if !ftyp_seen {
                        return Err(ZhenError::Format("MP4: moov 出现在 ftyp 之前".into()));
                    }
                    self.parse_moov(io, box_end, file_size, &mut tracks)?;
                    moov_seen = true;
                }
                BoxType::Mdat => {
                    self.mdat_ranges.push((content_start, box_end));
                }
                other if other.is_container() => {
                    walk_children(io, box_end, file_size)?;
                }
                _ => {}
            }

            io.seek(std::io::SeekFrom::Start(box_end))?;
            if box_end >= file_size {
                break;
            }
        }

        if !moov_seen {
            return Err(ZhenError::Format("MP4: 文件中没有 moov box".into()));
        }

        self.build_streams(tracks);

        if self.streams.is_empty() {
            return Err(ZhenError::Format("MP4: 文件中未找到可用轨道".into()));
        }

        debug!(
            "MP4: 打开完成, {} 条流, {} 个 mdat",
            self.streams.len(),
            self.mdat_ranges.len()
        );
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn take_sample_map(&mut self, stream_index: usize) -> ZhenResult<SampleMap> {
        self.sample_maps
            .get_mut(stream_index)
            .and_then(|slot| slot.take())
            .ok_or(ZhenError::StreamNotFound(stream_index))
    }

    fn duration(&self) -> Option<f64> {
        self.file_duration
    }
}

/// 解析 trak (Track Box)
fn parse_trak(io: &mut IoContext, trak_end: u64, file_size: u64) -> ZhenResult<ParsedTrack> {
    let mut track = ParsedTrack {
        track_id: 0,
        handler: [0u8; 4],
        media_timescale: 0,
        media_duration: 0,
        tkhd_width: 0,
        tkhd_height: 0,
        table: SampleTable::new(),
    };
    let mut seen = TrakBoxes::default();

    parse_trak_boxes(io, trak_end, file_size, &mut track, &mut seen)?;

    // 必选 box 校验: tkhd + mdhd + hdlr + stbl
    if !seen.tkhd {
        return Err(ZhenError::Format("MP4: 轨道缺少 tkhd".into()));
    }
    if !seen.mdhd {
        return Err(ZhenError::Format("MP4: 轨道缺少 mdhd".into()));
    }
    if !seen.hdlr {
        return Err(ZhenError::Format("MP4: 轨道缺少 hdlr".into()));
    }
    if !seen.stbl {
        return Err(ZhenError::Format("MP4: 轨道缺少 stbl".into()));
    }
    track.table.validate_mandatory()?;

    Ok(track)
}

/// trak 内已出现的必选 box 记录
#[derive(Default)]
struct TrakBoxes {
    tkhd: bool,
    mdhd: bool,
    hdlr: bool,
    stbl: bool,
}

/// 递归解析 trak 内部的 box
fn parse_trak_boxes(
    io: &mut IoContext,
    end: u64,
    file_size: u64,
    track: &mut ParsedTrack,
    seen: &mut TrakBoxes,
) -> ZhenResult<()> {
    while io.position()? + 8 <= end {
        let header = read_box_header(io)?;
        let box_end = check_child_bounds(&header, end, file_size)?;

        match header.box_type {
            BoxType::Tkhd => {
                parse_tkhd(io, track)?;
                seen.tkhd = true;
            }
            BoxType::Mdhd => {
                parse_mdhd(io, track)?;
                seen.mdhd = true;
            }
            BoxType::Hdlr => {
                parse_hdlr(io, &mut track.handler)?;
                seen.hdlr = true;
            }
            BoxType::Mdia | BoxType::Minf => {
                parse_trak_boxes(io, box_end, file_size, track, seen)?;
            }
            BoxType::Stbl => {
                seen.stbl = true;
                parse_trak_boxes(io, box_end, file_size, track, seen)?;
            }
            BoxType::Edts | BoxType::Dinf | BoxType::Udta => {
                walk_children(io, box_end, file_size)?;
            }
            BoxType::Stsd => track.table.parse_stsd(io, box_end)?,
            BoxType::Stts => track.table.parse_stts(io)?,
            BoxType::Ctts => track.table.parse_ctts(io)?,
            BoxType::Stsc => track.table.parse_stsc(io)?,
            BoxType::Stsz => track.table.parse_stsz(io)?,
            BoxType::Stz2 => track.table.parse_stz2(io)?,
            BoxType::Stco => track.table.parse_stco(io, false)?,
            BoxType::Co64 => track.table.parse_stco(io, true)?,
            BoxType::Stss => track.table.parse_stss(io)?,
            _ => {}
        }

        io.seek(std::io::SeekFrom::Start(box_end))?;
    }
    Ok(())
}

/// 遍历纯容器 box 的子树, 只做边界校验
///
/// edts/udta/meco 等容器里没有需要提取的数据,
/// 但大小违例仍然按容器损坏处理.
fn walk_children(io: &mut IoContext, end: u64, file_size: u64) -> ZhenResult<()> {
    while io.position()? + 8 <= end {
        let header = read_box_header(io)?;
        let box_end = check_child_bounds(&header, end, file_size)?;
        if header.box_type.is_container() {
            walk_children(io, box_end, file_size)?;
        }
        io.seek(std::io::SeekFrom::Start(box_end))?;
    }
    Ok(())
}

/// 解析 tkhd (Track Header Box)
fn parse_tkhd(io: &mut IoContext, track: &mut ParsedTrack) -> ZhenResult<()> {
    let (version, _flags) = read_fullbox_header(io)?;

    if version == 0 {
        io.skip(8)?; // creation + modification
        track.track_id = io.read_u32_be()?;
        io.skip(8)?; // reserved + duration
    } else {
        io.skip(16)?;
        track.track_id = io.read_u32_be()?;
        io.skip(12)?; // reserved + duration (64-bit)
    }

    io.skip(8)?; // reserved
    io.skip(8)?; // layer + alternate_group + volume + reserved
    io.skip(36)?; // matrix

    // 宽高 (16.16 定点数)
    track.tkhd_width = io.read_u32_be()? >> 16;
    track.tkhd_height = io.read_u32_be()? >> 16;
    Ok(())
}

/// 解析 mdhd (Media Header Box)
fn parse_mdhd(io: &mut IoContext, track: &mut ParsedTrack) -> ZhenResult<()> {
    let (version, _flags) = read_fullbox_header(io)?;

    if version == 0 {
        io.skip(8)?;
        track.media_timescale = io.read_u32_be()?;
        track.media_duration = u64::from(io.read_u32_be()?);
    } else {
        io.skip(16)?;
        track.media_timescale = io.read_u32_be()?;
        track.media_duration = io.read_u64_be()?;
    }
    Ok(())
}

/// 解析 hdlr (Handler Reference Box)
fn parse_hdlr(io: &mut IoContext, handler: &mut [u8; 4]) -> ZhenResult<()> {
    let (_version, _flags) = read_fullbox_header(io)?;
    let _pre_defined = io.read_u32_be()?;
    *handler = io.read_tag()?;
    Ok(())
}

/// MP4 格式探测器
pub struct Mp4Probe;

impl FormatProbe for Mp4Probe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        // ftyp 魔数
        if data.len() >= 8 && &data[4..8] == b"ftyp" {
            return Some(SCORE_MAX);
        }

        // 某些文件没有 ftyp, 看次级魔数
        if data.len() >= 8
            && (&data[4..8] == b"moov"
                || &data[4..8] == b"mdat"
                || &data[4..8] == b"free"
                || &data[4..8] == b"wide")
        {
            return Some(SCORE_MIME);
        }

        // 扩展名
        if let Some(name) = filename
            && let Some(ext) = name.rsplit('.').next()
        {
            let ext_lower = ext.to_lowercase();
            if matches!(
                ext_lower.as_str(),
                "mp4" | "m4a" | "m4v" | "mov" | "3gp" | "3g2"
            ) {
                return Some(SCORE_EXTENSION);
            }
        }

        None
    }

    fn name(&self) -> &str {
        "mp4"
    }
}
