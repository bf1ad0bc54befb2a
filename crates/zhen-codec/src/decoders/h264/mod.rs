//! H.264 IDR 关键帧解码调度器.
//!
//! 以采样映射为驱动的解码主循环: 逐个拉取采样, 分割出 NAL 单元,
//! 按类型分发给 SPS/PPS/SEI/IDR 处理器. 参数集写入定容缓存,
//! IDR 切片经引用完整性校验后交给外部切片解码器重建像素,
//! 重建图像交给图像写出器.
//!
//! # 终止条件
//!
//! - 成功解码图像数达到目标 → 成功
//! - 采样映射走完 → 成功 (可能不足目标数量)
//! - 连续错误超过预算 (64) 或发生致命错误 → 失败
//!
//! 每成功解码一张 IDR, 错误计数清零.

pub mod cache;
pub mod quant;
pub mod slice;

pub use cache::{MAX_PPS, MAX_SPS, ParameterSetCache};
pub use quant::{NormAdjust, V4X4, V8X8};
pub use slice::{SliceDecodeRequest, SliceDecoder, SliceHeader, parse_idr_slice_header};

use log::{debug, info, warn};
use zhen_core::{ZhenError, ZhenResult};

use crate::parsers::h264::{
    NalUnit, NalUnitType, SeiPayload, parse_pps, parse_sei_rbsp, parse_sps, split_annex_b,
    split_avcc,
};
use crate::picture::{ExtractOptions, PictureSink};
use crate::sample_map::{MappedSample, SampleKind, SampleSource};

/// 错误预算: 错误计数超过该值即终止本次运行
pub const ERROR_BUDGET: u32 = 64;

/// H.264 IDR 解码上下文
///
/// 每个输入文件一个实例, 运行结束或致命错误后丢弃.
/// 单线程使用; 多文件并行提取应各自持有独立上下文.
pub struct DecodingContext<'a> {
    /// 采样来源 (位流喂入器)
    source: &'a mut dyn SampleSource,
    /// 外部切片解码器
    slice_decoder: &'a mut dyn SliceDecoder,
    /// 外部图像写出器
    sink: &'a mut dyn PictureSink,
    /// 输出配置
    options: ExtractOptions,
    /// 目标图像数量 (IDR 筛选后的最终值)
    target_pictures: u32,
    /// AVCC 长度前缀字节数
    nal_length_size: usize,
    /// 参数集缓存
    cache: ParameterSetCache,
    /// 反量化归一化表
    norm_adjust: NormAdjust,
    /// 最近一次解析的 SEI payload 列表
    active_sei: Vec<SeiPayload>,
    /// 最近一次解析的切片头
    active_slice: Option<SliceHeader>,
    /// 当前是否正在处理 IDR 图像
    idr_pic_flag: bool,
    /// 主循环运行标志
    running: bool,
    /// 成功解码的 IDR 计数
    idr_counter: u32,
    /// 成功解码的图像总数
    frame_counter: u32,
    /// 错误计数 (IDR 解码成功时清零)
    error_counter: u32,
}

impl<'a> DecodingContext<'a> {
    /// 创建解码上下文
    ///
    /// `target_pictures` 是 IDR 筛选之后的最终目标数量, 可以为 0.
    pub fn new(
        source: &'a mut dyn SampleSource,
        slice_decoder: &'a mut dyn SliceDecoder,
        sink: &'a mut dyn PictureSink,
        options: ExtractOptions,
        target_pictures: u32,
        nal_length_size: usize,
    ) -> Self {
        Self {
            source,
            slice_decoder,
            sink,
            options,
            target_pictures,
            nal_length_size,
            cache: ParameterSetCache::new(),
            norm_adjust: NormAdjust::compute(),
            active_sei: Vec::new(),
            active_slice: None,
            idr_pic_flag: false,
            running: false,
            idr_counter: 0,
            frame_counter: 0,
            error_counter: 0,
        }
    }

    /// 成功解码的 IDR 数量
    pub fn idr_counter(&self) -> u32 {
        self.idr_counter
    }

    /// 成功解码的图像总数
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// 当前错误计数
    pub fn error_counter(&self) -> u32 {
        self.error_counter
    }

    /// 最近一次解析的 SEI payload 列表
    pub fn active_sei(&self) -> &[SeiPayload] {
        &self.active_sei
    }

    /// 最近一次成功解码的切片头
    pub fn active_slice(&self) -> Option<&SliceHeader> {
        self.active_slice.as_ref()
    }

    /// 当前是否正在处理 IDR 图像
    pub fn idr_pic_flag(&self) -> bool {
        self.idr_pic_flag
    }

    /// 运行解码主循环
    ///
    /// # 返回
    /// - `Ok(n)`: 成功解码 n 张图像 (映射中 IDR 不足时 n 可小于目标)
    /// - `Err(_)`: 错误预算耗尽或发生致命错误
    pub fn run(&mut self) -> ZhenResult<u32> {
        self.running = true;

        while self.running {
            if self.idr_counter >= self.target_pictures {
                debug!(
                    "H264: 已解码 {} 张 IDR, 达到目标数量, 解码结束",
                    self.idr_counter
                );
                self.running = false;
                break;
            }

            let sample = match self.source.feed_next_sample() {
                Ok(Some(sample)) => sample,
                Ok(None) => {
                    debug!(
                        "H264: 采样映射走完, 已解码 {}/{} 张图像",
                        self.idr_counter, self.target_pictures
                    );
                    self.running = false;
                    break;
                }
                Err(err) if err.is_fatal() => {
                    warn!("H264: 读取采样失败, 解码中止, err={}", err);
                    return Err(err);
                }
                Err(err) => {
                    warn!("H264: 采样截断, 跳过, err={}", err);
                    self.count_error();
                    continue;
                }
            };

            self.dispatch_sample(&sample)?;

            if self.error_counter > ERROR_BUDGET {
                warn!(
                    "H264: 错误预算耗尽, error_counter={}, 解码中止",
                    self.error_counter
                );
                self.running = false;
                return Err(ZhenError::Codec(format!(
                    "H264: NAL 解码错误超出预算, error_counter={}",
                    self.error_counter
                )));
            }
        }

        info!(
            "H264: 解码结束, idr={}, frame={}, error={}",
            self.idr_counter, self.frame_counter, self.error_counter
        );
        Ok(self.idr_counter)
    }

    /// 分发一个采样
    fn dispatch_sample(&mut self, sample: &MappedSample) -> ZhenResult<()> {
        match sample.kind {
            SampleKind::AvcSps | SampleKind::AvcPps => match NalUnit::parse(&sample.data) {
                Ok(nalu) => {
                    self.dispatch_nal(&nalu, sample)?;
                }
                Err(err) => {
                    warn!("H264: 参数集伪采样头部非法, err={}", err);
                    self.count_error();
                }
            },
            SampleKind::VideoIdr | SampleKind::Video => {
                let mut nalus = split_avcc(&sample.data, self.nal_length_size);
                if nalus.is_empty() {
                    nalus = split_annex_b(&sample.data);
                }
                if nalus.is_empty() {
                    warn!(
                        "H264: 采样中没有有效 NAL 单元, offset={}, size={}",
                        sample.offset,
                        sample.data.len()
                    );
                    self.count_error();
                    return Ok(());
                }
                for nalu in &nalus {
                    let picture_decoded = self.dispatch_nal(nalu, sample)?;
                    if picture_decoded {
                        // 一个采样一个访问单元: 图像完成后剩余 NAL 不再处理
                        break;
                    }
                }
            }
            SampleKind::Audio | SampleKind::Other => {
                warn!("H264: 采样类型不可解码, kind={:?}", sample.kind);
                self.count_error();
            }
        }
        Ok(())
    }

    /// 分发单个 NAL 单元, 返回是否成功解码出一张图像
    fn dispatch_nal(&mut self, nalu: &NalUnit, sample: &MappedSample) -> ZhenResult<bool> {
        match nalu.nal_type {
            NalUnitType::Sps => {
                let result = self.handle_sps(nalu);
                self.absorb("SPS 解码", result)?;
            }
            NalUnitType::Pps => {
                let result = self.handle_pps(nalu);
                self.absorb("PPS 解码", result)?;
            }
            NalUnitType::Sei => {
                let result = self.handle_sei(nalu);
                self.absorb("SEI 解码", result)?;
            }
            NalUnitType::SliceIdr => {
                return self.handle_idr(nalu, sample);
            }
            NalUnitType::Slice => {
                // 仅支持 IDR 切片解码, 非 IDR 切片直接跳过
                debug!("H264: 跳过非 IDR 切片, offset={}", sample.offset);
            }
            other => {
                warn!("H264: 不支持的 NAL 类型, type={}", other);
                self.count_error();
            }
        }
        Ok(false)
    }

    /// 处理 SPS NAL 单元
    fn handle_sps(&mut self, nalu: &NalUnit) -> ZhenResult<()> {
        let rbsp = nalu.rbsp();
        let sps = parse_sps(&rbsp)?;
        debug!(
            "H264: SPS id={}, {}x{}, profile={}, level={}",
            sps.sps_id, sps.width, sps.height, sps.profile_idc, sps.level_idc
        );
        self.cache.put_sps(sps)
    }

    /// 处理 PPS NAL 单元
    fn handle_pps(&mut self, nalu: &NalUnit) -> ZhenResult<()> {
        let rbsp = nalu.rbsp();
        let pps = parse_pps(&rbsp)?;
        debug!(
            "H264: PPS id={}, sps={}, entropy={}, qp={}",
            pps.pps_id,
            pps.sps_id,
            if pps.entropy_coding_mode == 1 {
                "CABAC"
            } else {
                "CAVLC"
            },
            pps.pic_init_qp
        );
        self.cache.put_pps(pps)
    }

    /// 处理 SEI NAL 单元, 解析结果保留在上下文中
    fn handle_sei(&mut self, nalu: &NalUnit) -> ZhenResult<()> {
        let rbsp = nalu.rbsp();
        let payloads = parse_sei_rbsp(&rbsp)?;
        debug!("H264: SEI, {} 个 payload", payloads.len());
        self.active_sei = payloads;
        Ok(())
    }

    /// 处理 IDR 切片 NAL 单元
    fn handle_idr(&mut self, nalu: &NalUnit, sample: &MappedSample) -> ZhenResult<bool> {
        self.idr_pic_flag = true;
        let result = self.decode_idr(nalu, sample);
        self.idr_pic_flag = false;

        match result {
            Ok(()) => {
                self.error_counter = 0;
                self.idr_counter += 1;
                self.frame_counter += 1;
                info!(
                    "H264: IDR #{}/{} 解码完成, pts={}",
                    self.idr_counter, self.target_pictures, sample.pts
                );
                Ok(true)
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!("H264: IDR 切片解码失败, 跳过, err={}", err);
                self.count_error();
                Ok(false)
            }
        }
    }

    /// IDR 切片解码: 切片头解析 → 引用完整性校验 → 外部解码 → 写出
    fn decode_idr(&mut self, nalu: &NalUnit, sample: &MappedSample) -> ZhenResult<()> {
        let rbsp = nalu.rbsp();
        let header = slice::parse_idr_slice_header(&rbsp, &self.cache)?;
        debug!(
            "H264: IDR 切片, frame_num={}, pps_id={}, qp={}",
            header.frame_num, header.pps_id, header.slice_qp
        );

        let (sps, pps) = self.cache.resolve(header.pps_id)?;
        let request = SliceDecodeRequest {
            sps,
            pps,
            header: &header,
            rbsp: &rbsp,
            norm_adjust: &self.norm_adjust,
            pts: sample.pts,
        };
        let picture = self.slice_decoder.decode_idr(&request)?;

        self.sink.write_picture(
            &picture,
            self.options.picture_format,
            self.options.picture_quality,
            &self.options.output_directory,
        )?;

        self.active_slice = Some(header);
        Ok(())
    }

    /// 把处理器的非致命错误计入预算, 致命错误向上传播
    fn absorb(&mut self, what: &str, result: ZhenResult<()>) -> ZhenResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!("H264: {} 失败, err={}", what, err);
                self.count_error();
                Ok(())
            }
        }
    }

    fn count_error(&mut self) {
        self.error_counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picture::{ExtractionMode, Picture, PictureFormat};
    use crate::sample_map::MappedSample;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use zhen_core::PixelFormat;

    // ============================================================
    // 模拟协作者
    // ============================================================

    /// 内存采样来源
    struct VecSource {
        samples: VecDeque<MappedSample>,
    }

    impl VecSource {
        fn new(samples: Vec<MappedSample>) -> Self {
            Self {
                samples: samples.into(),
            }
        }
    }

    impl SampleSource for VecSource {
        fn feed_next_sample(&mut self) -> ZhenResult<Option<MappedSample>> {
            Ok(self.samples.pop_front())
        }
    }

    /// 恒定输出灰色图像的切片解码器
    struct GraySliceDecoder {
        calls: u32,
    }

    impl SliceDecoder for GraySliceDecoder {
        fn decode_idr(&mut self, request: &SliceDecodeRequest<'_>) -> ZhenResult<Picture> {
            self.calls += 1;
            // 归一化表必须已经初始化
            assert_eq!(request.norm_adjust.adjust_4x4[0][0][0], 10);
            let mut pic = Picture::new(request.sps.width, request.sps.height, PixelFormat::Yuv420p);
            pic.pts = request.pts;
            for plane in &mut pic.data {
                plane.fill(128);
            }
            Ok(pic)
        }
    }

    /// 收集写出调用的图像写出器
    struct CollectSink {
        written: Vec<(u32, u32, i64)>,
    }

    impl PictureSink for CollectSink {
        fn write_picture(
            &mut self,
            picture: &Picture,
            _format: PictureFormat,
            _quality: u8,
            _output_directory: &str,
        ) -> ZhenResult<()> {
            self.written.push((picture.width, picture.height, picture.pts));
            Ok(())
        }
    }

    fn options() -> ExtractOptions {
        ExtractOptions {
            picture_format: PictureFormat::Png,
            picture_quality: 75,
            picture_number: 3,
            extraction_mode: ExtractionMode::Ordered,
            output_directory: "/tmp/zhen".into(),
        }
    }

    // ============================================================
    // 码流构造辅助
    // ============================================================

    fn push_u8(bits: &mut Vec<bool>, v: u8) {
        for i in (0..8).rev() {
            bits.push(((v >> i) & 1) != 0);
        }
    }

    fn write_bits(bits: &mut Vec<bool>, value: u32, n: usize) {
        for i in (0..n).rev() {
            bits.push(((value >> i) & 1) == 1);
        }
    }

    fn write_ue(bits: &mut Vec<bool>, val: u32) {
        let code = val + 1;
        let n = 32 - code.leading_zeros();
        for _ in 0..n - 1 {
            bits.push(false);
        }
        for i in (0..n).rev() {
            bits.push(((code >> i) & 1) == 1);
        }
    }

    fn write_se(bits: &mut Vec<bool>, val: i32) {
        let code = if val <= 0 {
            (-val as u32) * 2
        } else {
            (val as u32) * 2 - 1
        };
        write_ue(bits, code);
    }

    fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in bits.chunks(8) {
            let mut b = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    b |= 1 << (7 - i);
                }
            }
            out.push(b);
        }
        out
    }

    /// SPS NAL (含 0x67 头部字节), Baseline 64x64
    fn sps_nal() -> Vec<u8> {
        let mut bits = Vec::new();
        push_u8(&mut bits, 66);
        push_u8(&mut bits, 0);
        push_u8(&mut bits, 30);
        write_ue(&mut bits, 0); // sps_id
        write_ue(&mut bits, 0); // log2_max_frame_num_minus4
        write_ue(&mut bits, 0); // poc_type
        write_ue(&mut bits, 0); // log2_max_poc_lsb_minus4
        write_ue(&mut bits, 1); // max_num_ref_frames
        bits.push(false);
        write_ue(&mut bits, 3); // 4 MB 宽
        write_ue(&mut bits, 3);
        bits.push(true);
        bits.push(false);
        bits.push(false);
        bits.push(false);
        let mut nal = vec![0x67];
        nal.extend_from_slice(&bits_to_bytes(&bits));
        nal
    }

    /// PPS NAL (含 0x68 头部字节)
    fn pps_nal(pps_id: u32) -> Vec<u8> {
        let mut bits = Vec::new();
        write_ue(&mut bits, pps_id);
        write_ue(&mut bits, 0); // sps_id
        bits.push(false);
        bits.push(false);
        write_ue(&mut bits, 0);
        write_ue(&mut bits, 0);
        write_ue(&mut bits, 0);
        bits.push(false);
        write_bits(&mut bits, 0, 2);
        write_se(&mut bits, 0);
        write_se(&mut bits, 0);
        write_se(&mut bits, 0);
        bits.push(false);
        bits.push(false);
        bits.push(false);
        bits.push(true);
        while !bits.len().is_multiple_of(8) {
            bits.push(false);
        }
        let mut nal = vec![0x68];
        nal.extend_from_slice(&bits_to_bytes(&bits));
        nal
    }

    /// IDR 切片 NAL (含 0x65 头部字节)
    fn idr_nal(pps_id: u32, frame_num: u32) -> Vec<u8> {
        let mut bits = Vec::new();
        write_ue(&mut bits, 0); // first_mb_in_slice
        write_ue(&mut bits, 7); // slice_type=7 (I)
        write_ue(&mut bits, pps_id);
        write_bits(&mut bits, frame_num, 4);
        write_ue(&mut bits, 1); // idr_pic_id
        write_bits(&mut bits, 0, 4); // poc_lsb
        bits.push(false);
        bits.push(false);
        write_se(&mut bits, 0); // slice_qp_delta
        write_bits(&mut bits, 0xAB, 8); // 宏块数据占位
        let mut nal = vec![0x65];
        nal.extend_from_slice(&bits_to_bytes(&bits));
        nal
    }

    /// 给 NAL 加 4 字节 AVCC 长度前缀
    fn avcc_wrap(nal: &[u8]) -> Vec<u8> {
        let mut out = (nal.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(nal);
        out
    }

    fn param_sample(kind: SampleKind, nal: Vec<u8>) -> MappedSample {
        MappedSample {
            kind,
            data: Bytes::from(nal),
            pts: 0,
            dts: 0,
            offset: 0,
        }
    }

    fn idr_sample(pps_id: u32, frame_num: u32, pts: i64) -> MappedSample {
        MappedSample {
            kind: SampleKind::VideoIdr,
            data: Bytes::from(avcc_wrap(&idr_nal(pps_id, frame_num))),
            pts,
            dts: pts,
            offset: 0,
        }
    }

    fn baseline_samples() -> Vec<MappedSample> {
        vec![
            param_sample(SampleKind::AvcSps, sps_nal()),
            param_sample(SampleKind::AvcPps, pps_nal(0)),
        ]
    }

    // ============================================================
    // 调度器测试
    // ============================================================

    #[test]
    fn test_s2_精确数量提取() {
        let mut samples = baseline_samples();
        samples.push(idr_sample(0, 0, 0));
        samples.push(idr_sample(0, 0, 512));
        samples.push(idr_sample(0, 0, 1024));

        let mut source = VecSource::new(samples);
        let mut decoder = GraySliceDecoder { calls: 0 };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 3, 4);

        let n = ctx.run().unwrap();
        assert_eq!(n, 3);
        assert_eq!(ctx.idr_counter(), 3);
        assert_eq!(ctx.frame_counter(), 3);
        assert_eq!(ctx.error_counter(), 0);
        assert_eq!(decoder.calls, 3);
        assert_eq!(sink.written.len(), 3);
        assert_eq!(sink.written[2], (64, 64, 1024));
    }

    #[test]
    fn test_目标为零时立即成功() {
        let mut source = VecSource::new(vec![]);
        let mut decoder = GraySliceDecoder { calls: 0 };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 0, 4);

        assert_eq!(ctx.run().unwrap(), 0);
        assert_eq!(decoder.calls, 0);
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_映射走完时部分成功() {
        let mut samples = baseline_samples();
        samples.push(idr_sample(0, 0, 0));

        let mut source = VecSource::new(samples);
        let mut decoder = GraySliceDecoder { calls: 0 };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 5, 4);

        // 只有 1 个 IDR, 目标 5 → 解码 1 张后映射走完
        assert_eq!(ctx.run().unwrap(), 1);
    }

    #[test]
    fn test_s5_错误预算耗尽() {
        // 70 个只含垃圾字节的视频采样: 每个计 1 次错误, 第 65 个触发中止
        let samples: Vec<MappedSample> = (0..70)
            .map(|i| MappedSample {
                kind: SampleKind::Video,
                data: Bytes::from_static(&[0xFF, 0xFF, 0xFF]),
                pts: i,
                dts: i,
                offset: 0,
            })
            .collect();

        let mut source = VecSource::new(samples);
        let mut decoder = GraySliceDecoder { calls: 0 };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 3, 4);

        let err = ctx.run().expect_err("错误预算耗尽应失败");
        assert!(format!("{err}").contains("预算"));
        assert_eq!(ctx.error_counter(), ERROR_BUDGET + 1);
        assert_eq!(decoder.calls, 0);
    }

    #[test]
    fn test_s6_悬空pps跳过后继续() {
        let mut samples = baseline_samples();
        samples.push(idr_sample(2, 0, 0)); // PPS[2] 不存在 → 跳过
        samples.push(idr_sample(0, 0, 512)); // 正常解码

        let mut source = VecSource::new(samples);
        let mut decoder = GraySliceDecoder { calls: 0 };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 1, 4);

        assert_eq!(ctx.run().unwrap(), 1);
        // 成功解码后错误计数清零
        assert_eq!(ctx.error_counter(), 0);
        assert_eq!(sink.written.len(), 1);
        assert_eq!(sink.written[0].2, 512);
        // 成功解码的切片头保留在上下文中
        let header = ctx.active_slice().expect("应保留切片头");
        assert_eq!(header.pps_id, 0);
        assert!(!ctx.idr_pic_flag()); // 解码结束后标志已清除
    }

    #[test]
    fn test_非idr切片跳过不计错() {
        let mut samples = baseline_samples();
        // 非 IDR 切片 (type=1): 只跳过, 不计入错误预算
        samples.push(MappedSample {
            kind: SampleKind::Video,
            data: Bytes::from(avcc_wrap(&[0x41, 0x9A, 0x01, 0x02])),
            pts: 0,
            dts: 0,
            offset: 0,
        });
        samples.push(idr_sample(0, 1, 512));

        let mut source = VecSource::new(samples);
        let mut decoder = GraySliceDecoder { calls: 0 };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 1, 4);

        assert_eq!(ctx.run().unwrap(), 1);
        assert_eq!(ctx.error_counter(), 0);
    }

    #[test]
    fn test_sei_保留在上下文() {
        let mut samples = baseline_samples();
        // SEI NAL: user_data_unregistered
        let mut sei_rbsp = vec![0x05, 20];
        sei_rbsp.extend_from_slice(&[0xBB; 16]);
        sei_rbsp.extend_from_slice(b"zhen");
        sei_rbsp.push(0x80);
        let mut sei_nal = vec![0x06];
        sei_nal.extend_from_slice(&sei_rbsp);
        samples.push(MappedSample {
            kind: SampleKind::Video,
            data: Bytes::from(avcc_wrap(&sei_nal)),
            pts: 0,
            dts: 0,
            offset: 0,
        });
        samples.push(idr_sample(0, 0, 0));

        let mut source = VecSource::new(samples);
        let mut decoder = GraySliceDecoder { calls: 0 };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 1, 4);

        assert_eq!(ctx.run().unwrap(), 1);
        assert_eq!(ctx.active_sei().len(), 1);
        assert_eq!(ctx.active_sei()[0].payload_type, 5);
    }

    #[test]
    fn test_idr解码失败计错后继续() {
        /// 前 N 次失败的切片解码器
        struct FlakyDecoder {
            failures_left: u32,
            calls: u32,
        }
        impl SliceDecoder for FlakyDecoder {
            fn decode_idr(&mut self, request: &SliceDecodeRequest<'_>) -> ZhenResult<Picture> {
                self.calls += 1;
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    return Err(ZhenError::InvalidData("模拟宏块重建失败".into()));
                }
                Ok(Picture::new(
                    request.sps.width,
                    request.sps.height,
                    PixelFormat::Yuv420p,
                ))
            }
        }

        let mut samples = baseline_samples();
        samples.push(idr_sample(0, 0, 0));
        samples.push(idr_sample(0, 0, 512));

        let mut source = VecSource::new(samples);
        let mut decoder = FlakyDecoder {
            failures_left: 1,
            calls: 0,
        };
        let mut sink = CollectSink {
            written: Vec::new(),
        };
        let mut ctx = DecodingContext::new(&mut source, &mut decoder, &mut sink, options(), 1, 4);

        assert_eq!(ctx.run().unwrap(), 1);
        assert_eq!(decoder.calls, 2);
        assert_eq!(sink.written.len(), 1);
    }
}
