//! 缩略图提取流水线.
//!
//! 把各层组件按数据流串起来:
//! 打开文件 → 探测格式 → 解封装出采样映射 → IDR 筛选 →
//! 位流喂入器驱动 NAL 调度器 → 解码图像交给写出器.

use log::{debug, info};
use zhen_codec::{
    CodecId, DecodingContext, ExtractOptions, PictureSink, SliceDecoder,
};
use zhen_core::{MediaType, Timestamp, ZhenError, ZhenResult};
use zhen_format::{Demuxer, FormatProbe, IoContext, Mp4Demuxer, Mp4Probe, SampleFeeder, idr_filtering};

/// 从视频文件提取缩略图
///
/// 像素级切片重建与图像编码分别由 `slice_decoder` 与 `sink` 完成.
///
/// # 返回
/// - `Ok(n)`: 成功写出 n 张图像 (流中 IDR 不足时 n 可小于请求数, 可为 0)
/// - `Err(_)`: 参数非法、容器损坏、错误预算耗尽或 I/O 失败
pub fn extract_thumbnails(
    path: &str,
    options: &ExtractOptions,
    sink: &mut dyn PictureSink,
    slice_decoder: &mut dyn SliceDecoder,
) -> ZhenResult<u32> {
    let mut io = IoContext::open_read(path)?;
    extract_from_io(&mut io, Some(path), options, sink, slice_decoder)
}

/// 从已打开的 I/O 上下文提取缩略图
///
/// 与 [`extract_thumbnails`] 相同, 但输入由调用方提供
/// (内存缓冲等非文件来源走这里).
pub fn extract_from_io(
    io: &mut IoContext,
    filename: Option<&str>,
    options: &ExtractOptions,
    sink: &mut dyn PictureSink,
    slice_decoder: &mut dyn SliceDecoder,
) -> ZhenResult<u32> {
    options.validate()?;

    // 格式探测
    let probe_size = io.size().unwrap_or(8192).min(8192) as usize;
    if probe_size < 8 {
        return Err(ZhenError::Format("输入太短, 不是有效的 MP4 文件".into()));
    }
    let probe_buf = io.read_bytes(probe_size)?;
    let probe = Mp4Probe;
    let Some(score) = probe.probe(&probe_buf, filename) else {
        return Err(ZhenError::Format("无法识别输入文件格式".into()));
    };
    debug!("探测: 格式={}, 置信度={}", probe.name(), score);
    io.seek(std::io::SeekFrom::Start(0))?;

    // 解封装
    let mut demuxer = Mp4Demuxer::new();
    demuxer.open(io)?;

    // 找第一条 AVC 视频轨道
    let stream = demuxer
        .streams()
        .iter()
        .find(|s| s.media_type == MediaType::Video && s.codec_id == CodecId::H264)
        .ok_or_else(|| ZhenError::Format("文件中没有 AVC 视频轨道".into()))?;
    let stream_index = stream.index;
    debug!(
        "视频轨道 #{}: duration={}",
        stream_index,
        Timestamp::new(stream.duration, stream.time_base)
    );

    let map = demuxer.take_sample_map(stream_index)?;
    info!(
        "采样映射: {} 个采样, {} 个 IDR",
        map.sample_count(),
        map.sample_count_idr()
    );

    // IDR 筛选: 消费原映射, 用返回的映射替换
    let (map, target_pictures) = idr_filtering(map, options.picture_number, options.extraction_mode);
    info!(
        "IDR 筛选: 目标 {} 张图像, 模式={:?}",
        target_pictures, options.extraction_mode
    );

    // 解码调度
    let nal_length_size = map.nal_length_size;
    let mut feeder = SampleFeeder::new(io, &map);
    let mut context = DecodingContext::new(
        &mut feeder,
        slice_decoder,
        sink,
        options.clone(),
        target_pictures,
        nal_length_size,
    );
    let produced = context.run()?;

    info!("提取完成, 共写出 {} 张图像", produced);
    Ok(produced)
}
