//! IDR 切片头解析与切片解码交接.
//!
//! 调度器只解析到 slice header (含 slice_qp), 像素级的宏块重建
//! 由外部 `SliceDecoder` 协作者完成, 交接时附带已校验的
//! SPS/PPS、切片头、RBSP 与反量化归一化表.

use zhen_core::bitreader::BitReader;
use zhen_core::mathutil::clip3;
use zhen_core::{ZhenError, ZhenResult};

use crate::parsers::h264::{Pps, Sps, read_se, read_ue};
use crate::picture::Picture;

use super::cache::ParameterSetCache;
use super::quant::NormAdjust;

/// 解析后的 IDR 切片头
#[derive(Debug, Clone)]
pub struct SliceHeader {
    /// first_mb_in_slice
    pub first_mb_in_slice: u32,
    /// slice_type 原始值 (IDR 只接受 I 类切片: 2 或 7)
    pub slice_type: u32,
    /// 引用的 PPS ID
    pub pps_id: u32,
    /// frame_num
    pub frame_num: u32,
    /// idr_pic_id
    pub idr_pic_id: u32,
    /// pic_order_cnt_lsb (仅 poc_type==0)
    pub pic_order_cnt_lsb: Option<u32>,
    /// dec_ref_pic_marking: no_output_of_prior_pics_flag
    pub no_output_of_prior_pics: bool,
    /// dec_ref_pic_marking: long_term_reference_flag
    pub long_term_reference: bool,
    /// 切片量化参数 (pic_init_qp + slice_qp_delta, 0-51)
    pub slice_qp: i32,
    /// 去块滤波控制 (disable_deblocking_filter_idc)
    pub disable_deblocking_filter_idc: u32,
    /// 切片头之后第一个宏块数据的位偏移
    pub data_bit_offset: usize,
}

/// 解析 IDR 切片头
///
/// 解析过程即引用完整性校验: `pps_id → PPS → SPS` 任一环节缺失
/// 返回 `Codec` 错误, 语法非法返回 `InvalidData`, 非 I 切片返回
/// `Unsupported`. 三者都由调度器计入错误预算后跳过当前切片.
pub fn parse_idr_slice_header(rbsp: &[u8], cache: &ParameterSetCache) -> ZhenResult<SliceHeader> {
    if rbsp.is_empty() {
        return Err(ZhenError::InvalidData("H264: 切片 RBSP 为空".into()));
    }

    let mut br = BitReader::new(rbsp);

    let first_mb_in_slice = read_ue(&mut br)?;
    let slice_type = read_ue(&mut br)?;
    if slice_type > 9 {
        return Err(ZhenError::InvalidData(format!(
            "H264: slice_type 非法, value={}",
            slice_type
        )));
    }
    // IDR 图像只允许 I 类切片 (2/7) 与 SI 类 (4/9); 本解码器只处理 I 类
    if slice_type % 5 != 2 {
        return Err(ZhenError::Unsupported(format!(
            "H264: IDR 中出现非 I 切片, slice_type={}",
            slice_type
        )));
    }

    let pps_id = read_ue(&mut br)?;
    let (sps, pps) = cache.resolve(pps_id)?;

    if sps.separate_colour_plane {
        let _colour_plane_id = br.read_bits(2)?;
    }

    let frame_num = br.read_bits(sps.log2_max_frame_num)?;
    if !sps.frame_mbs_only {
        let field_pic_flag = br.read_bit()?;
        if field_pic_flag == 1 {
            return Err(ZhenError::Unsupported(
                "H264: 暂不支持场编码切片 (field_pic_flag=1)".into(),
            ));
        }
    }

    // IdrPicFlag == 1
    let idr_pic_id = read_ue(&mut br)?;
    if idr_pic_id > 65535 {
        return Err(ZhenError::InvalidData(format!(
            "H264: idr_pic_id 超出范围, value={}",
            idr_pic_id
        )));
    }

    let mut pic_order_cnt_lsb = None;
    match sps.poc_type {
        0 => {
            pic_order_cnt_lsb = Some(br.read_bits(sps.log2_max_poc_lsb)?);
            if pps.pic_order_present {
                let _delta_pic_order_cnt_bottom = read_se(&mut br)?;
            }
        }
        1 if !sps.delta_pic_order_always_zero => {
            let _delta_poc_0 = read_se(&mut br)?;
            if pps.pic_order_present {
                let _delta_poc_1 = read_se(&mut br)?;
            }
        }
        _ => {}
    }

    if pps.redundant_pic_cnt_present {
        let _redundant_pic_cnt = read_ue(&mut br)?;
    }

    // I 切片无参考图像列表重排; nal_ref_idc != 0 时有 dec_ref_pic_marking,
    // IDR 形式固定为两个标志位
    let no_output_of_prior_pics = br.read_bit()? == 1;
    let long_term_reference = br.read_bit()? == 1;

    // I 切片无 cabac_init_idc
    let slice_qp_delta = read_se(&mut br)?;
    let slice_qp = pps.pic_init_qp + slice_qp_delta;
    if slice_qp != clip3(0, 51, slice_qp) {
        return Err(ZhenError::InvalidData(format!(
            "H264: slice_qp 超出范围, slice_qp={}",
            slice_qp
        )));
    }

    let mut disable_deblocking_filter_idc = 0;
    if pps.deblocking_filter_control {
        disable_deblocking_filter_idc = read_ue(&mut br)?;
        if disable_deblocking_filter_idc > 2 {
            return Err(ZhenError::InvalidData(format!(
                "H264: disable_deblocking_filter_idc 非法, value={}",
                disable_deblocking_filter_idc
            )));
        }
        if disable_deblocking_filter_idc != 1 {
            let _alpha_c0_offset_div2 = read_se(&mut br)?;
            let _beta_offset_div2 = read_se(&mut br)?;
        }
    }

    Ok(SliceHeader {
        first_mb_in_slice,
        slice_type,
        pps_id,
        frame_num,
        idr_pic_id,
        pic_order_cnt_lsb,
        no_output_of_prior_pics,
        long_term_reference,
        slice_qp,
        disable_deblocking_filter_idc,
        data_bit_offset: br.bits_read(),
    })
}

/// 切片解码交接上下文
///
/// 调度器在引用完整性校验通过后构造, 交给外部切片解码器.
pub struct SliceDecodeRequest<'a> {
    /// 生效的 SPS
    pub sps: &'a Sps,
    /// 生效的 PPS
    pub pps: &'a Pps,
    /// 已解析的切片头
    pub header: &'a SliceHeader,
    /// 切片 RBSP (含切片头, 防竞争字节已移除)
    pub rbsp: &'a [u8],
    /// 反量化归一化表
    pub norm_adjust: &'a NormAdjust,
    /// 采样显示时间戳
    pub pts: i64,
}

/// 切片解码器接口 (外部协作者)
///
/// 宏块级像素重建不属于本库范围, 由实现方完成.
pub trait SliceDecoder {
    /// 解码一个 IDR 切片, 返回重建图像
    fn decode_idr(&mut self, request: &SliceDecodeRequest<'_>) -> ZhenResult<Picture>;
}
